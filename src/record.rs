//! Credential records and their salted hashes
//!
//! Every document in a batch becomes one leaf whose value is
//! `SHA-224(id ∥ kind ∥ content ∥ salt)` read as a big-endian integer. The
//! digest is 224 bits, so the value is always below the BN254 scalar modulus
//! and needs no reduction. `salt` enters the hash as its 32-character hex
//! text, exactly as it is stored in the artifact metadata.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ark_ff::PrimeField;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};
use tracing::debug;

use crate::F;

/// Kind tag of the main credential document.
pub const MAIN_KIND: &str = "R";

/// Salt length in bytes.
pub const SALT_BYTES: usize = 16;

/// Prefix of issued artifact copies.
pub const EMBEDDED_PREFIX: &str = "EMBEDDED_";

/// Split `<id>.<KIND>.<ext>` (optionally prefixed with [`EMBEDDED_PREFIX`])
/// into `(id, kind)`. Names with any other shape are not credential files.
pub fn split_file_name(name: &str) -> Option<(&str, &str)> {
    let name = name.strip_prefix(EMBEDDED_PREFIX).unwrap_or(name);
    let mut parts = name.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(id), Some(kind), Some(ext), None)
            if !id.is_empty() && !kind.is_empty() && !ext.is_empty() =>
        {
            Some((id, kind))
        }
        _ => None,
    }
}

/// Errors from record handling.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Salt text is not 32 hex characters.
    #[error("invalid salt {0:?}: expected 32 hex characters")]
    InvalidSalt(String),
    /// A credential directory entry could not be read.
    #[error("reading {}: {source}", .path.display())]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The input already holds issued copies.
    #[error("{0} is already an embedded credential; refusing to re-issue")]
    AlreadyEmbedded(String),
    /// Two main documents share one id.
    #[error("credential {0} has more than one main (R) document")]
    DuplicateMain(String),
    /// Appendices without their main document.
    #[error("credential {0} has appendices but no main (R) document")]
    MissingMain(String),
}

/// Per-batch random salt.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Salt([u8; SALT_BYTES]);

impl Salt {
    /// Fresh salt from `rng`.
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut b = [0u8; SALT_BYTES];
        rng.fill_bytes(&mut b);
        Self(b)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_BYTES] {
        &self.0
    }

    /// Lowercase hex text (the form that is hashed and stored).
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse the 32-character hex form. Only hex digits are accepted.
    pub fn from_hex(s: &str) -> Result<Self, RecordError> {
        let bad = || RecordError::InvalidSalt(s.to_string());
        if s.len() != 2 * SALT_BYTES || !s.bytes().all(|c| c.is_ascii_hexdigit()) {
            return Err(bad());
        }
        let mut b = [0u8; SALT_BYTES];
        for (i, out) in b.iter_mut().enumerate() {
            *out = u8::from_str_radix(&s[2 * i..2 * i + 2], 16).map_err(|_| bad())?;
        }
        Ok(Self(b))
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({})", self.to_hex())
    }
}

impl TryFrom<String> for Salt {
    type Error = RecordError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<Salt> for String {
    fn from(s: Salt) -> Self {
        s.to_hex()
    }
}

/// Leaf value of one document.
pub fn record_hash(id: &str, kind: &str, content: &[u8], salt: &Salt) -> F {
    let mut h = Sha224::new();
    h.update(id.as_bytes());
    h.update(kind.as_bytes());
    h.update(content);
    h.update(salt.to_hex().as_bytes());
    F::from_be_bytes_mod_order(&h.finalize())
}

/// One document of a credential group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name, for reporting.
    pub name: String,
    /// Kind tag: [`MAIN_KIND`] for the credential, the appendix name otherwise.
    pub kind: String,
    /// Raw bytes.
    pub content: Vec<u8>,
}

impl Document {
    /// New document.
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            content: content.into(),
        }
    }

    /// Salted leaf value of this document under credential `id`.
    pub fn hash(&self, id: &str, salt: &Salt) -> F {
        record_hash(id, &self.kind, &self.content, salt)
    }
}

/// A credential and the appendices that must accompany it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialGroup {
    /// Caller-supplied identifier, stable between issuance and verification.
    pub id: String,
    /// Main credential document (kind [`MAIN_KIND`]).
    pub main: Document,
    /// Appendices in file order.
    pub appendices: Vec<Document>,
}

impl CredentialGroup {
    /// Number of leaves this group contributes.
    pub fn leaf_count(&self) -> usize {
        1 + self.appendices.len()
    }
}

/// Read a credential directory into groups ordered by id.
///
/// Files are visited in name order; anything not shaped `<id>.<KIND>.<ext>`
/// is skipped. A directory that already holds `EMBEDDED_` copies is refused.
pub fn load_groups(dir: &Path) -> Result<Vec<CredentialGroup>, RecordError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| RecordError::Io { path, source }
    };
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if let (true, Ok(name)) = (is_file, entry.file_name().into_string()) {
            names.push(name);
        }
    }
    names.sort();

    let mut by_id: BTreeMap<String, (Option<Document>, Vec<Document>)> = BTreeMap::new();
    for name in names {
        if name.starts_with(EMBEDDED_PREFIX) {
            return Err(RecordError::AlreadyEmbedded(name));
        }
        let Some((id, kind)) = split_file_name(&name) else {
            debug!(%name, "skipping file without <id>.<KIND>.<ext> shape");
            continue;
        };
        let (id, kind) = (id.to_string(), kind.to_string());
        let path = dir.join(&name);
        let content = fs::read(&path).map_err(io_err(path.as_path()))?;
        let doc = Document::new(name, kind.clone(), content);
        let entry = by_id.entry(id.clone()).or_default();
        if kind == MAIN_KIND {
            if entry.0.replace(doc).is_some() {
                return Err(RecordError::DuplicateMain(id));
            }
        } else {
            entry.1.push(doc);
        }
    }

    by_id
        .into_iter()
        .map(|(id, (main, appendices))| match main {
            Some(main) => Ok(CredentialGroup {
                id,
                main,
                appendices,
            }),
            None => Err(RecordError::MissingMain(id)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field;
    use rand::{rngs::StdRng, SeedableRng};

    fn cred_dir(tag: &str, files: &[&str]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("veccert-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        for name in files {
            fs::write(dir.join(name), format!("body of {name}")).unwrap();
        }
        dir
    }

    #[test]
    fn hash_matches_manual_sha224() {
        let salt = Salt::from_hex("00112233445566778899aabbccddeeff").unwrap();
        let got = record_hash("C-001", "R", b"%PDF-1.7", &salt);
        let digest = Sha224::digest(b"C-001R%PDF-1.700112233445566778899aabbccddeeff");
        let expected = num_bigint::BigUint::from_bytes_be(&digest);
        assert_eq!(field::to_biguint(&got), expected);
        assert!(expected < field::modulus::<F>());
    }

    #[test]
    fn every_input_changes_the_hash() {
        let s1 = Salt::generate(&mut StdRng::seed_from_u64(1));
        let s2 = Salt::generate(&mut StdRng::seed_from_u64(2));
        let base = record_hash("id", "R", b"content", &s1);
        assert_ne!(base, record_hash("id2", "R", b"content", &s1));
        assert_ne!(base, record_hash("id", "TRANSCRIPT", b"content", &s1));
        assert_ne!(base, record_hash("id", "R", b"content!", &s1));
        assert_ne!(base, record_hash("id", "R", b"content", &s2));
        assert_eq!(base, record_hash("id", "R", b"content", &s1));
    }

    #[test]
    fn file_name_shapes() {
        assert_eq!(split_file_name("C-7.R.pdf"), Some(("C-7", "R")));
        assert_eq!(
            split_file_name("EMBEDDED_C-7.TRANSCRIPT.pdf"),
            Some(("C-7", "TRANSCRIPT"))
        );
        assert_eq!(split_file_name("C-7.pdf"), None);
        assert_eq!(split_file_name("C-7.R.pdf.meta.json"), None);
        assert_eq!(split_file_name(".R.pdf"), None);
    }

    #[test]
    fn salt_text_form() {
        let s = Salt::generate(&mut StdRng::seed_from_u64(3));
        assert_eq!(s.to_hex().len(), 32);
        assert_eq!(Salt::from_hex(&s.to_hex()).unwrap(), s);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, format!("\"{s}\""));
        assert_eq!(serde_json::from_str::<Salt>(&json).unwrap(), s);
        assert!(Salt::from_hex("xyz").is_err());
        assert!(serde_json::from_str::<Salt>("\"0011\"").is_err());
    }

    #[test]
    fn salt_rejects_signs_and_non_hex() {
        let signed = "+a".repeat(SALT_BYTES);
        assert_eq!(signed.len(), 2 * SALT_BYTES);
        assert!(matches!(
            Salt::from_hex(&signed),
            Err(RecordError::InvalidSalt(_))
        ));
        assert!(Salt::from_hex(&"-1".repeat(SALT_BYTES)).is_err());
        assert!(Salt::from_hex(&"0g".repeat(SALT_BYTES)).is_err());
        assert!(serde_json::from_str::<Salt>(&format!("\"{signed}\"")).is_err());
        let upper = Salt::from_hex(&"AB".repeat(SALT_BYTES)).unwrap();
        assert_eq!(upper.as_bytes(), &[0xab; SALT_BYTES]);
    }

    #[test]
    fn directory_groups_by_id() {
        let dir = cred_dir(
            "groups",
            &["B.R.pdf", "A.T2.pdf", "A.R.pdf", "A.T1.pdf", "notes.txt"],
        );
        let groups = load_groups(&dir).unwrap();
        let _ = fs::remove_dir_all(&dir);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, "A");
        assert_eq!(groups[0].main.name, "A.R.pdf");
        assert_eq!(groups[0].main.content, b"body of A.R.pdf");
        let kinds: Vec<&str> = groups[0].appendices.iter().map(|d| d.kind.as_str()).collect();
        assert_eq!(kinds, vec!["T1", "T2"]);
        assert_eq!(groups[1].id, "B");
        assert!(groups[1].appendices.is_empty());
    }

    #[test]
    fn directory_without_main_is_rejected() {
        let dir = cred_dir("nomain", &["A.R.pdf", "B.T1.pdf"]);
        let err = load_groups(&dir).unwrap_err();
        let _ = fs::remove_dir_all(&dir);
        assert!(matches!(err, RecordError::MissingMain(ref id) if id == "B"), "{err}");
    }

    #[test]
    fn directory_with_two_mains_is_rejected() {
        let dir = cred_dir("twomains", &["A.R.pdf", "A.R.png"]);
        let err = load_groups(&dir).unwrap_err();
        let _ = fs::remove_dir_all(&dir);
        assert!(matches!(err, RecordError::DuplicateMain(ref id) if id == "A"), "{err}");
    }

    #[test]
    fn embedded_copies_are_not_reissued() {
        let dir = cred_dir("reissue", &["A.R.pdf", "EMBEDDED_A.R.pdf"]);
        let err = load_groups(&dir).unwrap_err();
        let _ = fs::remove_dir_all(&dir);
        assert!(matches!(err, RecordError::AlreadyEmbedded(_)), "{err}");
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = std::env::temp_dir().join(format!("veccert-absent-{}", std::process::id()));
        let err = load_groups(&dir).unwrap_err();
        assert!(matches!(err, RecordError::Io { ref path, .. } if path == &dir), "{err}");
    }
}
