//! Proof embedding: issuance and verification of credential artifacts
//!
//! Issuance takes credential groups, hashes every document with one fresh
//! batch salt, lays the hashes out as consecutive leaves (each group's main
//! document, then its appendices in file order), commits once, opens the
//! challenge and every leaf, and finally writes a metadata record into each
//! artifact. The metadata carries the leaf's index and proof but never its
//! value: a verifier recomputes the value from the presented bytes.
//!
//! Verification checks, in order:
//! 1. all metadata decodes into the expected tagged shapes,
//! 2. the submitted appendices cover every required name and hash
//!    ([`EmbedError::IncompleteAppendixSet`] otherwise, before any pairing),
//! 3. the published challenge opens against the published commitment,
//! 4. every submitted leaf opens at its stored index to its recomputed hash.

#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::sync::Arc;

use ark_bn254::G1Affine;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::challenge::{self, Challenge};
use crate::field::{self, FieldError, Polynomial};
use crate::ledger::{Ledger, LedgerError, PublishedBatch};
use crate::pcs::{self, Commitment, PcsError};
use crate::record::{self, CredentialGroup, Salt, MAIN_KIND};
use crate::scheduler::{
    ChunkProgress, Leaf, PendingLeaf, ProofScheduler, SchedulerConfig, SchedulerError,
};
use crate::srs::{Srs, VerifierKey};
use crate::F;

/// Errors from batch construction and artifact verification.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Fewer than two leaves: a batch needs at least a line to commit to.
    #[error("batch has {leaves} leaves; at least 2 are required")]
    EmptyBatch {
        /// Leaf count.
        leaves: usize,
    },
    /// More leaves than the SRS can commit to.
    #[error("batch has {leaves} leaves but the SRS depth is {depth}")]
    BatchTooLarge {
        /// Leaf count.
        leaves: usize,
        /// SRS depth.
        depth: usize,
    },
    /// A group lists the same appendix kind twice, or uses the main kind for an appendix.
    #[error("credential {id} has a conflicting appendix kind {kind:?}")]
    DuplicateAppendix {
        /// Credential id.
        id: String,
        /// Repeated kind.
        kind: String,
    },
    /// Embedded metadata is missing, mistyped or undecodable.
    #[error("malformed embedded metadata in {file}: {reason}")]
    MalformedMetadata {
        /// Artifact name.
        file: String,
        /// What was wrong.
        reason: String,
    },
    /// The submission lacks appendices the main credential requires.
    #[error(
        "incomplete appendix set: {found}/{required} supplied, \
         missing names [{}], missing hashes [{}]",
        .missing_names.join(", "),
        .missing_hashes.join(", ")
    )]
    IncompleteAppendixSet {
        /// Required names not supplied.
        missing_names: Vec<String>,
        /// Required hashes not matched by any supplied appendix.
        missing_hashes: Vec<String>,
        /// Required appendix count.
        required: usize,
        /// Supplied appendix count.
        found: usize,
    },
    /// Commitment or opening failure.
    #[error(transparent)]
    Pcs(#[from] PcsError),
    /// Interpolation failure.
    #[error(transparent)]
    Field(#[from] FieldError),
    /// Parallel proving failed; no partial output is kept.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// Batch record could not be fetched or decoded.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

// ------------------------- Metadata -------------------------

/// Leaf reference stored in an artifact. `value` stays blank at issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafStub {
    /// Domain index, hex.
    pub index: String,
    /// Always empty when written; ignored when read.
    #[serde(default)]
    pub value: String,
    /// Opening proof `[x, y]`.
    pub proof: [String; 2],
}

impl LeafStub {
    fn from_leaf(leaf: &Leaf) -> Self {
        Self {
            index: field::to_hex(&F::from(leaf.index)),
            value: String::new(),
            proof: pcs::point_to_hex(&leaf.proof),
        }
    }

    fn decode(&self, file: &str) -> Result<(F, G1Affine), EmbedError> {
        let malformed = |reason: String| EmbedError::MalformedMetadata {
            file: file.to_string(),
            reason,
        };
        let index = field::parse_field_element(&self.index)
            .map_err(|e| malformed(format!("leaf index: {e}")))?;
        let proof = pcs::point_from_hex(&self.proof)
            .map_err(|e| malformed(format!("leaf proof: {e}")))?;
        Ok((index, proof))
    }
}

/// Metadata record embedded in an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum EmbeddedMetadata {
    /// Main credential.
    Main {
        /// Credential id.
        id: String,
        /// Batch salt.
        salt: Salt,
        /// Ledger address of the batch record.
        commit_address: String,
        /// Appendix kinds that must accompany this credential.
        appendix_names: Vec<String>,
        /// Their leaf values, hex.
        appendix_hashes: Vec<String>,
        /// This document's leaf.
        leaf: LeafStub,
    },
    /// Appendix document.
    Appendix {
        /// This document's leaf.
        leaf: LeafStub,
    },
}

/// An issued document with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedArtifact {
    /// Original file name.
    pub file_name: String,
    /// Kind tag.
    pub kind: String,
    /// Unmodified content.
    pub content: Vec<u8>,
    /// Metadata to embed.
    pub metadata: EmbeddedMetadata,
}

impl EmbeddedArtifact {
    /// Metadata as compact JSON.
    pub fn metadata_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.metadata)
    }

    /// This artifact as a verifier would receive it.
    pub fn to_submitted(&self) -> Result<SubmittedFile, serde_json::Error> {
        Ok(SubmittedFile {
            file_name: self.file_name.clone(),
            kind: self.kind.clone(),
            content: self.content.clone(),
            metadata: self.metadata_json()?,
        })
    }
}

// ------------------------- Issuance -------------------------

struct GroupLayout {
    main: Leaf,
    appendices: Vec<Leaf>,
}

/// Output of one issuance run.
pub struct BatchBuild {
    /// Batch salt.
    pub salt: Salt,
    /// Batch commitment.
    pub commitment: Commitment,
    /// Opened challenge.
    pub challenge: Challenge,
    /// Every leaf, sorted by index.
    pub leaves: Vec<Leaf>,
    groups: Vec<CredentialGroup>,
    layout: Vec<GroupLayout>,
}

impl BatchBuild {
    /// Record to publish on the ledger.
    pub fn published(&self) -> PublishedBatch {
        PublishedBatch::from(&self.challenge)
    }

    /// Attach metadata to every document; `commit_address` is where
    /// [`BatchBuild::published`] was stored.
    pub fn embed(&self, commit_address: &str) -> Vec<EmbeddedArtifact> {
        let mut out = Vec::with_capacity(self.leaves.len());
        for (group, layout) in self.groups.iter().zip(&self.layout) {
            out.push(EmbeddedArtifact {
                file_name: group.main.name.clone(),
                kind: group.main.kind.clone(),
                content: group.main.content.clone(),
                metadata: EmbeddedMetadata::Main {
                    id: group.id.clone(),
                    salt: self.salt,
                    commit_address: commit_address.to_string(),
                    appendix_names: group.appendices.iter().map(|d| d.kind.clone()).collect(),
                    appendix_hashes: layout
                        .appendices
                        .iter()
                        .map(|l| field::to_hex(&l.value))
                        .collect(),
                    leaf: LeafStub::from_leaf(&layout.main),
                },
            });
            for (doc, leaf) in group.appendices.iter().zip(&layout.appendices) {
                out.push(EmbeddedArtifact {
                    file_name: doc.name.clone(),
                    kind: doc.kind.clone(),
                    content: doc.content.clone(),
                    metadata: EmbeddedMetadata::Appendix {
                        leaf: LeafStub::from_leaf(leaf),
                    },
                });
            }
        }
        out
    }
}

/// A batch that has been built, published and embedded.
pub struct PublishedCredentials {
    /// Ledger address of the batch record.
    pub commit_address: String,
    /// The batch itself.
    pub batch: BatchBuild,
    /// Every document with its metadata, in leaf order.
    pub artifacts: Vec<EmbeddedArtifact>,
}

/// Batch issuer bound to one SRS.
pub struct Issuer {
    srs: Arc<Srs>,
    scheduler: ProofScheduler,
}

impl Issuer {
    /// New issuer.
    pub fn new(srs: Arc<Srs>, config: SchedulerConfig) -> Self {
        let scheduler = ProofScheduler::new(srs.clone(), config);
        Self { srs, scheduler }
    }

    /// Build a batch with a fresh random salt.
    pub fn build(&self, groups: Vec<CredentialGroup>) -> Result<BatchBuild, EmbedError> {
        let salt = Salt::generate(&mut rand::thread_rng());
        self.build_with_salt(groups, salt, |_| {})
    }

    /// Build a batch under `salt`, reporting proof progress per chunk.
    #[instrument(level = "info", skip_all, fields(groups = groups.len()))]
    pub fn build_with_salt(
        &self,
        groups: Vec<CredentialGroup>,
        salt: Salt,
        progress: impl FnMut(ChunkProgress),
    ) -> Result<BatchBuild, EmbedError> {
        let n: usize = groups.iter().map(CredentialGroup::leaf_count).sum();
        if n < 2 {
            return Err(EmbedError::EmptyBatch { leaves: n });
        }
        if n > self.srs.depth() {
            return Err(EmbedError::BatchTooLarge {
                leaves: n,
                depth: self.srs.depth(),
            });
        }
        for g in &groups {
            let mut kinds = HashSet::new();
            let conflict = g
                .appendices
                .iter()
                .find(|d| d.kind == MAIN_KIND || !kinds.insert(d.kind.as_str()));
            if let Some(d) = conflict {
                return Err(EmbedError::DuplicateAppendix {
                    id: g.id.clone(),
                    kind: d.kind.clone(),
                });
            }
        }

        let mut pending = Vec::with_capacity(n);
        for g in &groups {
            pending.push(g.main.hash(&g.id, &salt));
            pending.extend(g.appendices.iter().map(|d| d.hash(&g.id, &salt)));
        }
        let pending: Vec<PendingLeaf> = pending
            .into_iter()
            .enumerate()
            .map(|(i, value)| PendingLeaf {
                index: i as u64,
                value,
            })
            .collect();

        let values: Vec<F> = pending.iter().map(|l| l.value).collect();
        let poly = Arc::new(Polynomial::interpolate(&values)?);
        let commitment = pcs::commit(&self.srs, poly.coeffs())?;
        let challenge = challenge::build_challenge(&self.srs, &poly, &commitment)?;
        let leaves = self
            .scheduler
            .build_proofs(poly, commitment, pending, progress)?;

        let mut layout = Vec::with_capacity(groups.len());
        let mut cursor = leaves.iter();
        for g in &groups {
            let main = *cursor.next().ok_or(EmbedError::EmptyBatch {
                leaves: leaves.len(),
            })?;
            let appendices: Vec<Leaf> = cursor
                .by_ref()
                .take(g.appendices.len())
                .copied()
                .collect();
            layout.push(GroupLayout { main, appendices });
        }

        info!(leaves = n, commitment = ?commitment.to_ledger(), "batch built");
        Ok(BatchBuild {
            salt,
            commitment,
            challenge,
            leaves,
            groups,
            layout,
        })
    }

    /// Build a batch under `salt`, publish its record on `ledger` and embed
    /// the resulting address into every artifact.
    pub fn publish_batch<L: Ledger + ?Sized>(
        &self,
        ledger: &L,
        groups: Vec<CredentialGroup>,
        salt: Salt,
        progress: impl FnMut(ChunkProgress),
    ) -> crate::Result<PublishedCredentials> {
        let batch = self.build_with_salt(groups, salt, progress)?;
        let commit_address = ledger.publish(&batch.published())?;
        let artifacts = batch.embed(&commit_address);
        info!(%commit_address, artifacts = artifacts.len(), "batch published");
        Ok(PublishedCredentials {
            commit_address,
            batch,
            artifacts,
        })
    }
}

// ------------------------- Verification -------------------------

/// An artifact as presented to the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedFile {
    /// File name, for reporting.
    pub file_name: String,
    /// Kind tag (from the file name).
    pub kind: String,
    /// Document bytes.
    pub content: Vec<u8>,
    /// Raw metadata JSON.
    pub metadata: String,
}

/// A main credential and the appendices presented with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Main credential.
    pub main: SubmittedFile,
    /// Appendices.
    pub appendices: Vec<SubmittedFile>,
}

/// Outcome for one leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCheck {
    /// File name.
    pub file_name: String,
    /// Stored index.
    pub index: F,
    /// Recomputed value.
    pub value: F,
    /// Pairing check result.
    pub passed: bool,
}

/// Outcome of verifying one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// Credential id.
    pub id: String,
    /// Ledger address consulted.
    pub commit_address: String,
    /// Whether the published challenge opened.
    pub challenge_passed: bool,
    /// One entry per submitted document, main first.
    pub leaves: Vec<LeafCheck>,
}

impl VerificationReport {
    /// True when the challenge and every leaf passed.
    pub fn accepted(&self) -> bool {
        self.challenge_passed && !self.leaves.is_empty() && self.leaves.iter().all(|l| l.passed)
    }
}

fn parse_metadata(file: &SubmittedFile) -> Result<EmbeddedMetadata, EmbedError> {
    serde_json::from_str(&file.metadata).map_err(|e| EmbedError::MalformedMetadata {
        file: file.file_name.clone(),
        reason: e.to_string(),
    })
}

/// Check that the supplied appendices satisfy the main credential's requirements.
pub fn check_appendix_set(
    required_names: &[String],
    required_hashes: &[String],
    supplied: &[(String, F)],
) -> Result<(), EmbedError> {
    let names: HashSet<&str> = supplied.iter().map(|(k, _)| k.as_str()).collect();
    let hashes: HashSet<F> = supplied.iter().map(|(_, h)| *h).collect();

    let missing_names: Vec<String> = required_names
        .iter()
        .filter(|n| !names.contains(n.as_str()))
        .cloned()
        .collect();
    let missing_hashes: Vec<String> = required_hashes
        .iter()
        .filter(|h| field::parse_field_element::<F>(h).map_or(true, |v| !hashes.contains(&v)))
        .cloned()
        .collect();

    if !missing_names.is_empty()
        || !missing_hashes.is_empty()
        || required_names.len() != supplied.len()
    {
        return Err(EmbedError::IncompleteAppendixSet {
            missing_names,
            missing_hashes,
            required: required_names.len(),
            found: supplied.len(),
        });
    }
    Ok(())
}

/// Verify a submitted credential against the batch record on `ledger`.
#[instrument(level = "info", skip_all, fields(file = %submission.main.file_name))]
pub fn verify_submission<L: Ledger + ?Sized>(
    vk: &VerifierKey,
    ledger: &L,
    submission: &Submission,
) -> Result<VerificationReport, EmbedError> {
    let main = &submission.main;
    let (id, salt, commit_address, appendix_names, appendix_hashes, main_leaf) =
        match parse_metadata(main)? {
            EmbeddedMetadata::Main {
                id,
                salt,
                commit_address,
                appendix_names,
                appendix_hashes,
                leaf,
            } => (id, salt, commit_address, appendix_names, appendix_hashes, leaf),
            EmbeddedMetadata::Appendix { .. } => {
                return Err(EmbedError::MalformedMetadata {
                    file: main.file_name.clone(),
                    reason: "expected main credential metadata, found appendix".into(),
                })
            }
        };

    // (file, stub, recomputed value)
    let mut entries = Vec::with_capacity(1 + submission.appendices.len());
    entries.push((main, main_leaf, recompute(&id, MAIN_KIND, main, &salt)));
    let mut supplied = Vec::with_capacity(submission.appendices.len());
    for file in &submission.appendices {
        let leaf = match parse_metadata(file)? {
            EmbeddedMetadata::Appendix { leaf } => leaf,
            EmbeddedMetadata::Main { .. } => {
                return Err(EmbedError::MalformedMetadata {
                    file: file.file_name.clone(),
                    reason: "expected appendix metadata, found a main credential".into(),
                })
            }
        };
        let value = recompute(&id, &file.kind, file, &salt);
        supplied.push((file.kind.clone(), value));
        entries.push((file, leaf, value));
    }

    let decoded = entries
        .into_iter()
        .map(|(file, stub, value)| {
            stub.decode(&file.file_name)
                .map(|(index, proof)| (file, index, proof, value))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let Err(e) = check_appendix_set(&appendix_names, &appendix_hashes, &supplied) {
        warn!(error = %e, "rejecting submission before any pairing check");
        return Err(e);
    }

    let batch = ledger.fetch(&commit_address)?;
    let challenge = batch.challenge()?;
    let challenge_passed = challenge::verify_challenge(vk, &challenge);

    let leaves: Vec<LeafCheck> = decoded
        .into_iter()
        .map(|(file, index, proof, value)| {
            let passed = pcs::verify(vk, &challenge.commitment, &proof, index, value);
            if !passed {
                warn!(file = %file.file_name, "leaf proof rejected");
            }
            LeafCheck {
                file_name: file.file_name.clone(),
                index,
                value,
                passed,
            }
        })
        .collect();

    let report = VerificationReport {
        id,
        commit_address,
        challenge_passed,
        leaves,
    };
    info!(accepted = report.accepted(), "verification finished");
    Ok(report)
}

fn recompute(id: &str, kind: &str, file: &SubmittedFile, salt: &Salt) -> F {
    record::record_hash(id, kind, &file.content, salt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::record::Document;
    use rand::{rngs::StdRng, SeedableRng};

    fn issuer() -> Issuer {
        let srs = Srs::insecure_setup(16, &mut StdRng::seed_from_u64(61)).unwrap();
        let config = SchedulerConfig {
            chunk_count: Some(3),
            ..Default::default()
        };
        Issuer::new(Arc::new(srs), config)
    }

    fn group(id: &str, appendices: &[&str]) -> CredentialGroup {
        let main_body = format!("credential {id}").into_bytes();
        CredentialGroup {
            id: id.into(),
            main: Document::new(format!("{id}.R.pdf"), MAIN_KIND, main_body),
            appendices: appendices
                .iter()
                .map(|k| {
                    let body = format!("{k} of {id}").into_bytes();
                    Document::new(format!("{id}.{k}.pdf"), *k, body)
                })
                .collect(),
        }
    }

    #[test]
    fn leaves_are_laid_out_group_by_group() {
        let salt = Salt::generate(&mut StdRng::seed_from_u64(62));
        let groups = vec![group("A", &["T1", "T2"]), group("B", &[])];
        let build = issuer().build_with_salt(groups, salt, |_| {}).unwrap();
        let indices: Vec<u64> = build.leaves.iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(build.leaves[3].value, group("B", &[]).main.hash("B", &salt));

        let arts = build.embed("0xabc");
        assert_eq!(arts.len(), 4);
        match &arts[0].metadata {
            EmbeddedMetadata::Main {
                appendix_names,
                leaf,
                ..
            } => {
                assert_eq!(appendix_names, &vec!["T1".to_string(), "T2".to_string()]);
                assert_eq!(leaf.index, "0x0");
                assert!(leaf.value.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            &arts[2].metadata,
            EmbeddedMetadata::Appendix { leaf } if leaf.index == "0x2"
        ));
    }

    #[test]
    fn batch_size_limits() {
        let i = issuer();
        assert!(matches!(
            i.build(vec![group("A", &[])]),
            Err(EmbedError::EmptyBatch { leaves: 1 })
        ));
        let big: Vec<_> = (0..17).map(|k| group(&k.to_string(), &[])).collect();
        assert!(matches!(
            i.build(big),
            Err(EmbedError::BatchTooLarge {
                leaves: 17,
                depth: 16
            })
        ));
        assert!(matches!(
            i.build(vec![group("A", &["X", "X"])]),
            Err(EmbedError::DuplicateAppendix { .. })
        ));
    }

    #[test]
    fn metadata_is_tagged_json() {
        let build = issuer().build(vec![group("A", &["T"])]).unwrap();
        let arts = build.embed("0x00");
        let json: serde_json::Value =
            serde_json::from_str(&arts[1].metadata_json().unwrap()).unwrap();
        assert_eq!(json["component"], "appendix");
        let main_without_id = r#"{"component":"main","leaf":{}}"#;
        assert!(serde_json::from_str::<EmbeddedMetadata>(main_without_id).is_err());
    }

    #[test]
    fn missing_appendix_fails_before_ledger_lookup() {
        let groups = vec![group("A", &["T1", "T2"]), group("B", &[])];
        let build = issuer().build(groups).unwrap();
        // Nothing was published: reaching the ledger would be a NotFound error.
        let ledger = InMemoryLedger::new();
        let arts = build.embed("0x0000000000000000000000000000000000000000");
        let sub = Submission {
            main: arts[0].to_submitted().unwrap(),
            appendices: vec![arts[1].to_submitted().unwrap()],
        };
        let vk = Srs::insecure_setup(2, &mut StdRng::seed_from_u64(63))
            .unwrap()
            .verifier_key();
        match verify_submission(&vk, &ledger, &sub).unwrap_err() {
            EmbedError::IncompleteAppendixSet {
                missing_names,
                required,
                found,
                ..
            } => {
                assert_eq!(missing_names, vec!["T2".to_string()]);
                assert_eq!((required, found), (2, 1));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn publish_batch_records_one_entry() {
        let ledger = InMemoryLedger::new();
        let salt = Salt::generate(&mut StdRng::seed_from_u64(64));
        let groups = vec![group("A", &["T"]), group("B", &[])];
        let issued = issuer()
            .publish_batch(&ledger, groups, salt, |_| {})
            .unwrap();

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, issued.commit_address);
        assert_eq!(entries[0].batch, issued.batch.published());
        assert_eq!(issued.artifacts.len(), 3);
        assert!(issued.artifacts.iter().all(|a| match &a.metadata {
            EmbeddedMetadata::Main { commit_address, .. } => {
                commit_address == &issued.commit_address
            }
            EmbeddedMetadata::Appendix { .. } => true,
        }));
    }

    #[test]
    fn publish_batch_leaves_ledger_untouched_on_failure() {
        let ledger = InMemoryLedger::new();
        let salt = Salt::generate(&mut StdRng::seed_from_u64(65));
        let err = issuer()
            .publish_batch(&ledger, vec![group("A", &[])], salt, |_| {})
            .err()
            .unwrap();
        assert!(matches!(
            err,
            crate::Error::Embed(EmbedError::EmptyBatch { leaves: 1 })
        ));
        assert!(ledger.entries().unwrap().is_empty());
    }

    #[test]
    fn appendix_set_rules() {
        let v = F::from(7u64);
        let names = vec!["T".to_string()];
        let hashes = vec![field::to_hex(&v)];
        let other = F::from(8u64);
        assert!(check_appendix_set(&names, &hashes, &[("T".into(), v)]).is_ok());
        assert!(check_appendix_set(&names, &hashes, &[("T".into(), other)]).is_err());
        let extra = [("T".into(), v), ("U".into(), F::from(1u64))];
        assert!(check_appendix_set(&names, &hashes, &extra).is_err());
        assert!(check_appendix_set(&[], &[], &[]).is_ok());
    }
}
