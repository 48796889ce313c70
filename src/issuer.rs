//! Batch issuer CLI
//!
//! Examples:
//!   issuer dev-srs --depth 1024 --out srs/
//!   issuer build --cred-dir creds/ --out issued/ --g1 srs/g1.json --g2 srs/g2.json
//!   issuer build --cred-dir creds/ --out issued/ --dev-srs 256
//!
//! Credential directories hold files named `<id>.<KIND>.<ext>`; `KIND = R`
//! marks the main credential, any other kind is an appendix of the same id.
//! For every input file the issuer writes `EMBEDDED_<file>` (unchanged bytes)
//! and `EMBEDDED_<file>.meta.json` (the embedded leaf metadata), and
//! publishes the batch record into the directory ledger.
//!
//! Every flag can also come from a `VECCERT_*` environment variable or from
//! the `--config` JSON file; flags win over the file.

#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

use veccert::record::{self, Salt, EMBEDDED_PREFIX};
use veccert::{Config, DirectoryLedger, Issuer, Srs};

#[derive(Parser)]
#[command(name = "issuer")]
#[command(
    about = "Issue a batch of credentials under one KZG vector commitment",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash, commit, prove and embed a directory of credentials
    Build {
        /// Directory of `<id>.<KIND>.<ext>` files
        #[arg(long, env = "VECCERT_CRED_DIR")]
        cred_dir: PathBuf,

        /// Output directory for embedded artifacts
        #[arg(long, short = 'o', env = "VECCERT_OUT_DIR")]
        out: PathBuf,

        /// JSON config file
        #[arg(long, env = "VECCERT_CONFIG")]
        config: Option<PathBuf>,

        /// Ceremony G1 powers
        #[arg(long, env = "VECCERT_SRS_G1")]
        g1: Option<PathBuf>,

        /// Ceremony G2 powers
        #[arg(long, env = "VECCERT_SRS_G2")]
        g2: Option<PathBuf>,

        /// G1 powers to load
        #[arg(long, env = "VECCERT_SRS_DEPTH")]
        depth: Option<usize>,

        /// Use a throwaway SRS of this depth instead of ceremony files (testing only)
        #[arg(long, conflicts_with_all = ["g1", "g2"])]
        dev_srs: Option<usize>,

        /// Directory ledger root
        #[arg(long, env = "VECCERT_LEDGER_DIR")]
        ledger_dir: Option<PathBuf>,

        /// Number of proof chunks
        #[arg(long, env = "VECCERT_CHUNKS")]
        chunks: Option<usize>,

        /// Abort when no chunk completes within this many seconds
        #[arg(long, env = "VECCERT_CHUNK_DEADLINE_SECS")]
        chunk_deadline_secs: Option<u64>,
    },

    /// Write an insecure development SRS in ceremony format
    DevSrs {
        /// Number of G1 powers
        #[arg(long, default_value = "1024")]
        depth: usize,

        /// Output directory (`g1.json`, `g2.json`)
        #[arg(long, short = 'o', default_value = "srs")]
        out: PathBuf,

        /// RNG seed (random when omitted)
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match Cli::parse().command {
        Commands::Build {
            cred_dir,
            out,
            config,
            g1,
            g2,
            depth,
            dev_srs,
            ledger_dir,
            chunks,
            chunk_deadline_secs,
        } => {
            let mut cfg = Config::load_or_default(config.as_deref())?;
            if g1.is_some() {
                cfg.srs.g1_path = g1;
            }
            if g2.is_some() {
                cfg.srs.g2_path = g2;
            }
            if let Some(d) = depth.or(dev_srs) {
                cfg.srs.depth = d;
            }
            if let Some(dir) = ledger_dir {
                cfg.ledger_dir = dir;
            }
            if chunks.is_some() {
                cfg.scheduler.chunk_count = chunks;
            }
            if let Some(secs) = chunk_deadline_secs {
                cfg.scheduler.chunk_deadline = Some(Duration::from_secs(secs));
            }
            cfg.validate()?;

            let srs = match dev_srs {
                Some(d) => {
                    tracing::warn!(depth = d, "using an insecure development SRS");
                    Srs::insecure_setup(d, &mut rand::thread_rng())?
                }
                None => cfg.load_srs().context("loading SRS")?,
            };
            build(&cfg, Arc::new(srs), &cred_dir, &out)
        }
        Commands::DevSrs { depth, out, seed } => {
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            };
            let srs = Srs::insecure_setup(depth, &mut rng)?;
            fs::create_dir_all(&out)?;
            let g1 = File::create(out.join("g1.json"))?;
            let g2 = File::create(out.join("g2.json"))?;
            srs.write_ceremony(g1, g2)?;
            info!(depth, out = %out.display(), "wrote development SRS");
            Ok(())
        }
    }
}

fn build(cfg: &Config, srs: Arc<Srs>, cred_dir: &Path, out: &Path) -> Result<()> {
    let groups = record::load_groups(cred_dir)?;
    info!(groups = groups.len(), "loaded credential groups");

    let issuer = Issuer::new(srs, cfg.scheduler.clone());
    let ledger = DirectoryLedger::open(&cfg.ledger_dir)?;
    let salt = Salt::generate(&mut rand::thread_rng());
    let issued = issuer.publish_batch(&ledger, groups, salt, |p| {
        info!(
            completed = p.completed,
            total = p.total,
            leaves = p.leaves_done,
            "proof chunk done"
        );
    })?;

    fs::create_dir_all(out)?;
    for art in &issued.artifacts {
        let target = out.join(format!("{EMBEDDED_PREFIX}{}", art.file_name));
        fs::write(&target, &art.content)
            .with_context(|| format!("writing {}", target.display()))?;
        let meta = out.join(format!("{EMBEDDED_PREFIX}{}.meta.json", art.file_name));
        fs::write(&meta, serde_json::to_vec_pretty(&art.metadata)?)?;
    }
    println!(
        "batch published at {} ({} leaves)",
        issued.commit_address,
        issued.batch.leaves.len()
    );
    Ok(())
}
