#![allow(dead_code)]

use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng};
use veccert::embed::{EmbeddedArtifact, PublishedCredentials, SubmittedFile};
use veccert::record::{CredentialGroup, Document, Salt, MAIN_KIND};
use veccert::{BatchBuild, Issuer, Ledger, SchedulerConfig, Srs, Submission};

pub const SRS_SEED: u64 = 0x5eed;

/// Deterministic development SRS shared by the flow tests.
pub fn srs(depth: usize) -> Arc<Srs> {
    let mut rng = StdRng::seed_from_u64(SRS_SEED);
    Arc::new(Srs::insecure_setup(depth, &mut rng).unwrap())
}

pub fn salt(seed: u64) -> Salt {
    Salt::generate(&mut StdRng::seed_from_u64(seed))
}

pub fn issuer(srs: Arc<Srs>, chunks: usize) -> Issuer {
    let config = SchedulerConfig {
        chunk_count: Some(chunks),
        ..Default::default()
    };
    Issuer::new(srs, config)
}

/// A credential with one appendix per entry of `appendices`.
pub fn group(id: &str, appendices: &[&str]) -> CredentialGroup {
    let diploma = format!("%PDF diploma for {id}").into_bytes();
    CredentialGroup {
        id: id.to_string(),
        main: Document::new(format!("{id}.{MAIN_KIND}.pdf"), MAIN_KIND, diploma),
        appendices: appendices
            .iter()
            .map(|k| {
                let body = format!("%PDF {k} for {id}").into_bytes();
                Document::new(format!("{id}.{k}.pdf"), *k, body)
            })
            .collect(),
    }
}

/// Three credentials, six leaves: `A` with two appendices, `B` alone, `C` with one.
pub fn class_of_three() -> Vec<CredentialGroup> {
    vec![
        group("A", &["TRANSCRIPT", "THESIS"]),
        group("B", &[]),
        group("C", &["TRANSCRIPT"]),
    ]
}

pub fn build(
    srs: Arc<Srs>,
    groups: Vec<CredentialGroup>,
    chunks: usize,
    salt_seed: u64,
) -> BatchBuild {
    issuer(srs, chunks)
        .build_with_salt(groups, salt(salt_seed), |_| {})
        .unwrap()
}

/// Build [`class_of_three`] and publish it on `ledger`.
pub fn publish<L: Ledger + ?Sized>(
    srs: Arc<Srs>,
    ledger: &L,
    salt_seed: u64,
) -> PublishedCredentials {
    issuer(srs, 2)
        .publish_batch(ledger, class_of_three(), salt(salt_seed), |_| {})
        .unwrap()
}

/// Main artifact of `id` plus every artifact that follows it up to the next main.
pub fn submission_for(artifacts: &[EmbeddedArtifact], id: &str) -> Submission {
    let start = artifacts
        .iter()
        .position(|a| a.kind == MAIN_KIND && a.file_name.starts_with(&format!("{id}.")))
        .unwrap();
    let main = artifacts[start].to_submitted().unwrap();
    let appendices: Vec<SubmittedFile> = artifacts[start + 1..]
        .iter()
        .take_while(|a| a.kind != MAIN_KIND)
        .map(|a| a.to_submitted().unwrap())
        .collect();
    Submission { main, appendices }
}
