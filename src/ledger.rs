//! Public batch records
//!
//! Each issued batch publishes one record: its commitment and the opened
//! challenge. The record is written once and read by every later verifier.
//! The store itself is an external collaborator behind [`Ledger`]; two
//! implementations ship here: an append-only in-memory ledger for tests and
//! a directory of JSON files for the command-line tools.
//!
//! A record's address is `0x` followed by the first 20 bytes of the BLAKE3
//! digest of its JSON encoding, so republishing the same record is a no-op.

#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::challenge::Challenge;
use crate::contract::{ContractError, VerifierContractParams};

/// Length of an address in bytes.
pub const ADDRESS_BYTES: usize = 20;

/// Errors from publishing or fetching batch records.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// No record under this address.
    #[error("no batch published at {0}")]
    NotFound(String),
    /// Address is not `0x` + 40 hex digits.
    #[error("invalid commit address {0:?}")]
    InvalidAddress(String),
    /// The stored record does not decode into curve points and scalars.
    #[error("malformed batch record: {0}")]
    Malformed(#[from] ContractError),
    /// Store lock poisoned by a panicking writer.
    #[error("ledger store poisoned")]
    Poisoned,
    /// Record (de)serialization failure.
    #[error("ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Filesystem failure.
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Challenge part of a published batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeParams {
    /// Challenge point.
    pub index: String,
    /// `P(index)`.
    pub value: String,
    /// Opening proof `[x, y]`.
    pub proof: [String; 2],
}

/// Record written once per batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedBatch {
    /// Batch commitment `[x, y]`.
    pub commitment: [String; 2],
    /// Opened challenge.
    pub challenge: ChallengeParams,
}

impl From<&Challenge> for PublishedBatch {
    fn from(ch: &Challenge) -> Self {
        let p = VerifierContractParams::new(&ch.commitment, &ch.proof, ch.index, ch.value);
        Self {
            commitment: p.commitment,
            challenge: ChallengeParams {
                index: p.index,
                value: p.value,
                proof: p.proof,
            },
        }
    }
}

impl PublishedBatch {
    /// Contract arguments for checking the challenge.
    pub fn challenge_params(&self) -> VerifierContractParams {
        VerifierContractParams {
            commitment: self.commitment.clone(),
            proof: self.challenge.proof.clone(),
            index: self.challenge.index.clone(),
            value: self.challenge.value.clone(),
        }
    }

    /// Decode into a typed [`Challenge`].
    pub fn challenge(&self) -> Result<Challenge, LedgerError> {
        let (commitment, proof, index, value) = self.challenge_params().decode()?;
        Ok(Challenge {
            index,
            value,
            proof,
            commitment,
        })
    }

    /// Content address of this record.
    pub fn address(&self) -> Result<String, LedgerError> {
        let bytes = serde_json::to_vec(self)?;
        let digest = blake3::hash(&bytes);
        let hex: String = digest.as_bytes()[..ADDRESS_BYTES]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        Ok(format!("0x{hex}"))
    }
}

/// Write-once public store of batch records.
pub trait Ledger {
    /// Store `batch` and return its commit address.
    fn publish(&self, batch: &PublishedBatch) -> Result<String, LedgerError>;
    /// Read the record at `address`.
    fn fetch(&self, address: &str) -> Result<PublishedBatch, LedgerError>;
}

fn check_address(address: &str) -> Result<(), LedgerError> {
    let ok = address.strip_prefix("0x").is_some_and(|h| {
        h.len() == 2 * ADDRESS_BYTES && h.bytes().all(|b| b.is_ascii_hexdigit())
    });
    if ok {
        Ok(())
    } else {
        Err(LedgerError::InvalidAddress(address.to_string()))
    }
}

/// One published record and the address it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Commit address.
    pub address: String,
    /// Stored record.
    pub batch: PublishedBatch,
}

/// Process-local, append-only ledger. Entries keep publication order.
#[derive(Debug)]
pub struct InMemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every entry in publication order.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = self.entries.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(entries.clone())
    }

    /// Overwrite a record in place (tests use this to simulate a tampered store).
    pub fn replace(&self, address: &str, batch: PublishedBatch) -> Result<(), LedgerError> {
        let mut entries = self.entries.lock().map_err(|_| LedgerError::Poisoned)?;
        match entries.iter_mut().find(|e| e.address == address) {
            Some(entry) => entry.batch = batch,
            None => entries.push(LedgerEntry {
                address: address.to_string(),
                batch,
            }),
        }
        Ok(())
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger for InMemoryLedger {
    fn publish(&self, batch: &PublishedBatch) -> Result<String, LedgerError> {
        let address = batch.address()?;
        let mut entries = self.entries.lock().map_err(|_| LedgerError::Poisoned)?;
        if !entries.iter().any(|e| e.address == address) {
            entries.push(LedgerEntry {
                address: address.clone(),
                batch: batch.clone(),
            });
        }
        debug!(%address, entries = entries.len(), "published batch (memory)");
        Ok(address)
    }

    fn fetch(&self, address: &str) -> Result<PublishedBatch, LedgerError> {
        check_address(address)?;
        let entries = self.entries.lock().map_err(|_| LedgerError::Poisoned)?;
        entries
            .iter()
            .find(|e| e.address == address)
            .map(|e| e.batch.clone())
            .ok_or_else(|| LedgerError::NotFound(address.to_string()))
    }
}

/// One JSON file per batch under a directory.
#[derive(Debug, Clone)]
pub struct DirectoryLedger {
    root: PathBuf,
}

impl DirectoryLedger {
    /// Open (creating if needed) a directory ledger.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, address: &str) -> PathBuf {
        self.root.join(format!("{address}.json"))
    }
}

impl Ledger for DirectoryLedger {
    fn publish(&self, batch: &PublishedBatch) -> Result<String, LedgerError> {
        let address = batch.address()?;
        let path = self.path_for(&address);
        if !path.exists() {
            fs::write(&path, serde_json::to_vec_pretty(batch)?)?;
        }
        info!(%address, path = %path.display(), "published batch");
        Ok(address)
    }

    fn fetch(&self, address: &str) -> Result<PublishedBatch, LedgerError> {
        check_address(address)?;
        let path = self.path_for(address);
        if !path.exists() {
            return Err(LedgerError::NotFound(address.to_string()));
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge;
    use crate::field::Polynomial;
    use crate::pcs;
    use crate::srs::Srs;
    use crate::F;
    use rand::{rngs::StdRng, SeedableRng};

    fn batch(leaves: &[u64]) -> (Srs, PublishedBatch) {
        let srs = Srs::insecure_setup(4, &mut StdRng::seed_from_u64(51)).unwrap();
        let values: Vec<F> = leaves.iter().map(|&v| F::from(v)).collect();
        let poly = Polynomial::interpolate(&values).unwrap();
        let c = pcs::commit(&srs, poly.coeffs()).unwrap();
        let ch = challenge::build_challenge(&srs, &poly, &c).unwrap();
        (srs, PublishedBatch::from(&ch))
    }

    #[test]
    fn memory_publish_fetch() {
        let (srs, b) = batch(&[1, 2, 4]);
        let ledger = InMemoryLedger::new();
        let addr = ledger.publish(&b).unwrap();
        assert_eq!(addr.len(), 2 + 2 * ADDRESS_BYTES);
        assert_eq!(ledger.publish(&b).unwrap(), addr);
        assert_eq!(ledger.entries().unwrap().len(), 1);

        let got = ledger.fetch(&addr).unwrap();
        assert_eq!(got, b);
        let vk = srs.verifier_key();
        assert!(challenge::verify_challenge(&vk, &got.challenge().unwrap()));
    }

    #[test]
    fn entries_keep_publication_order() {
        let ledger = InMemoryLedger::default();
        assert!(ledger.entries().unwrap().is_empty());
        let (_, first) = batch(&[1, 2, 4]);
        let (_, second) = batch(&[3, 5]);
        let a = ledger.publish(&first).unwrap();
        let b = ledger.publish(&second).unwrap();
        ledger.publish(&first).unwrap();

        let entries = ledger.entries().unwrap();
        let addresses: Vec<&str> = entries.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(addresses, vec![a.as_str(), b.as_str()]);
        assert_eq!(entries[1].batch, second);
    }

    #[test]
    fn unknown_and_invalid_addresses() {
        let ledger = InMemoryLedger::new();
        let missing = format!("0x{}", "ab".repeat(ADDRESS_BYTES));
        assert!(matches!(ledger.fetch(&missing), Err(LedgerError::NotFound(_))));
        assert!(matches!(
            ledger.fetch("../etc/passwd"),
            Err(LedgerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn directory_round_trip() {
        let (_, b) = batch(&[1, 2, 4]);
        let dir = std::env::temp_dir().join(format!("veccert-ledger-{}", std::process::id()));
        let ledger = DirectoryLedger::open(&dir).unwrap();
        let addr = ledger.publish(&b).unwrap();
        assert_eq!(ledger.fetch(&addr).unwrap(), b);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn garbage_record_is_malformed() {
        let (_, mut b) = batch(&[1, 2, 4]);
        b.commitment = ["0x1".into(), "0x3".into()];
        assert!(matches!(b.challenge(), Err(LedgerError::Malformed(_))));
    }
}
