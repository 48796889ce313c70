//! Credential verifier CLI
//!
//! Examples:
//!   verifier --g1 srs/g1.json --g2 srs/g2.json issued/EMBEDDED_C-7.R.pdf
//!   verifier --ledger-dir ledger --g1 srs/g1.json --g2 srs/g2.json \
//!       issued/EMBEDDED_C-7.R.pdf issued/EMBEDDED_C-7.TRANSCRIPT.pdf
//!
//! Each artifact is read together with its `<file>.meta.json` sidecar. The
//! process exits with status 1 when the submission is rejected, including an
//! incomplete appendix set.

#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use veccert::embed::{EmbedError, SubmittedFile};
use veccert::record;
use veccert::{verify_submission, Config, DirectoryLedger, Submission, VerificationReport};

#[derive(Parser)]
#[command(name = "verifier")]
#[command(
    about = "Verify an issued credential against its published batch commitment",
    long_about = None
)]
struct Cli {
    /// Directory ledger root
    #[arg(long, env = "VECCERT_LEDGER_DIR")]
    ledger_dir: Option<PathBuf>,

    /// JSON config file
    #[arg(long, env = "VECCERT_CONFIG")]
    config: Option<PathBuf>,

    /// Ceremony G1 powers
    #[arg(long, env = "VECCERT_SRS_G1")]
    g1: Option<PathBuf>,

    /// Ceremony G2 powers
    #[arg(long, env = "VECCERT_SRS_G2")]
    g2: Option<PathBuf>,

    /// Main credential artifact
    main: PathBuf,

    /// Appendix artifacts
    appendices: Vec<PathBuf>,
}

fn read_submitted(path: &Path) -> Result<SubmittedFile> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?
        .to_string();
    let (_, kind) = record::split_file_name(&file_name)
        .ok_or_else(|| anyhow!("{file_name} is not named <id>.<KIND>.<ext>"))?;
    let kind = kind.to_string();
    let content = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let meta_path = PathBuf::from(format!("{}.meta.json", path.display()));
    let metadata = fs::read_to_string(&meta_path)
        .with_context(|| format!("reading {}", meta_path.display()))?;
    Ok(SubmittedFile {
        file_name,
        kind,
        content,
        metadata,
    })
}

fn run(cfg: &Config, submission: &Submission) -> veccert::Result<VerificationReport> {
    let vk = cfg.load_srs()?.verifier_key();
    let ledger = DirectoryLedger::open(&cfg.ledger_dir)?;
    Ok(verify_submission(&vk, &ledger, submission)?)
}

fn verdict(passed: bool) -> &'static str {
    if passed {
        "ok"
    } else {
        "FAILED"
    }
}

fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut cfg = Config::load_or_default(cli.config.as_deref())?;
    if cli.g1.is_some() {
        cfg.srs.g1_path = cli.g1;
    }
    if cli.g2.is_some() {
        cfg.srs.g2_path = cli.g2;
    }
    if let Some(dir) = cli.ledger_dir {
        cfg.ledger_dir = dir;
    }
    // Verification only needs [1]G1 and the two G2 powers.
    cfg.srs.depth = 1;
    cfg.validate()?;

    let appendices = cli
        .appendices
        .iter()
        .map(|p| read_submitted(p))
        .collect::<Result<_>>()?;
    let submission = Submission {
        main: read_submitted(&cli.main)?,
        appendices,
    };

    let report = match run(&cfg, &submission) {
        Ok(r) => r,
        Err(veccert::Error::Embed(e @ EmbedError::IncompleteAppendixSet { .. })) => {
            println!("REJECTED: {e}");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("verifying submission"),
    };

    println!("credential {} (batch {})", report.id, report.commit_address);
    println!("  challenge: {}", verdict(report.challenge_passed));
    for leaf in &report.leaves {
        println!("  {}: {}", leaf.file_name, verdict(leaf.passed));
    }
    if report.accepted() {
        println!("ACCEPTED");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("REJECTED");
        Ok(ExitCode::FAILURE)
    }
}
