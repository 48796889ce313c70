//! Public surface & core types
//!
//! `veccert` issues and verifies integrity proofs for a batch of credential
//! documents with a single KZG vector commitment on BN254. Every document is
//! hashed with a per-batch salt into one field element (a *leaf*); the leaves
//! are interpolated over `x = 0..N-1`, committed once, and opened once per
//! leaf. A verifier holding one document checks its leaf against the public
//! commitment without seeing any other document.
//!
//! ## Issuance order (public contract)
//!
//! 1. Hash each record: `SHA-224(id ∥ kind ∥ content ∥ salt)`.
//! 2. Interpolate the leaf values into `P` with `P(i) = leaf_i`.
//! 3. Commit `C = [P(τ)]G1`.
//! 4. Derive the challenge point `z = H(C)` and open `P` at `z`.
//! 5. Open `P` at every leaf index in parallel; sort by index.
//! 6. Publish `{ C, challenge }`; embed `{ index, proof }` into each artifact.
//!
//! ## Verification order
//!
//! 1. Decode embedded metadata; check the appendix set is complete.
//! 2. Fetch `{ C, challenge }` from the ledger.
//! 3. Re-derive `z` from `C` and check the challenge opening.
//! 4. Recompute each leaf value from the presented bytes and check its opening.
//!
//! Both pairing checks use the same equation as the ledger contract
//! ([`contract::verify_params`]), so on- and off-ledger verdicts agree.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Field arithmetic and coefficient-form polynomials (interpolation, division).
pub mod field;
/// Structured reference string loading and validation.
pub mod srs;
/// KZG commitment, opening and pairing verification.
pub mod pcs;
/// Opening quotient `(P - P(z)) / (X - z)` with remainder check.
pub mod quotient;
/// Fiat–Shamir transcript (domain-separated hashing, hash→field).
pub mod transcript;
/// Challenge point derivation and opening.
pub mod challenge;
/// Contiguous chunk partitioning of the leaf set.
pub mod partition;
/// Thread-pool scheduler producing one proof per leaf.
pub mod scheduler;
/// Ledger-facing verification call.
pub mod contract;
/// Published batch records and ledger backends.
pub mod ledger;
/// Credential records, salts and leaf hashes.
pub mod record;
/// Issuance and verification of embedded artifacts.
pub mod embed;
/// Runtime configuration.
pub mod config;

pub use challenge::Challenge;
pub use config::Config;
pub use embed::{
    verify_submission, BatchBuild, EmbeddedArtifact, EmbeddedMetadata, Issuer, PublishedCredentials,
    Submission, VerificationReport,
};
pub use ledger::{DirectoryLedger, InMemoryLedger, Ledger, PublishedBatch};
pub use pcs::Commitment;
pub use scheduler::{Leaf, ProofScheduler, SchedulerConfig};
pub use srs::{Srs, VerifierKey};

/// Scalar field used across the crate (BN254).
pub type F = ark_bn254::Fr;

/// Any error the crate can return.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Field or polynomial arithmetic.
    #[error(transparent)]
    Field(#[from] field::FieldError),
    /// Trusted setup.
    #[error(transparent)]
    Srs(#[from] srs::SrsError),
    /// Commitment or opening.
    #[error(transparent)]
    Pcs(#[from] pcs::PcsError),
    /// Parallel proving.
    #[error(transparent)]
    Scheduler(#[from] scheduler::SchedulerError),
    /// Contract call arguments.
    #[error(transparent)]
    Contract(#[from] contract::ContractError),
    /// Ledger access.
    #[error(transparent)]
    Ledger(#[from] ledger::LedgerError),
    /// Record handling.
    #[error(transparent)]
    Record(#[from] record::RecordError),
    /// Issuance or artifact verification.
    #[error(transparent)]
    Embed(#[from] embed::EmbedError),
    /// Configuration.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// Crate result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
