//! Structured reference string (powers of τ on BN254)
//!
//! The SRS is loaded once from a trusted-setup ceremony artifact and then only
//! read. It is an explicit value: callers wrap it in an `Arc` and hand it to
//! the commitment engine, the opening generator and the scheduler workers, so
//! there is no global state and no lock.
//!
//! Ceremony format (JSON, each integer decimal or `0x` hex):
//! ```text
//!   G1: [[x, y], ...]                    powers [τ^i]G1
//!   G2: [[x_c0, x_c1, y_c0, y_c1], ...]  powers [τ^i]G2 (Fq2 coordinates)
//! ```
//!
//! Integrity rules: every point must lie on the curve and in the prime-order
//! subgroup, `g1[0]` and `g2[0]` must be the canonical generators. Any
//! violation is [`SrsError::Integrity`]: the artifact is corrupt or swapped
//! and nothing may be committed with it.

#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use ark_bn254::{Fq, Fq2, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_ec::{AffineRepr, CurveGroup, Group};
use ark_ff::{PrimeField, UniformRand};
use ark_serialize::CanonicalSerialize;
use blake3::Hasher;
use rand::RngCore;
use tracing::{info, instrument};

use crate::field::{self, FieldError};

/// Largest number of G1 powers the ceremony artifact provides.
pub const MAX_DEPTH: usize = 65_536;

/// Number of G2 powers needed for opening verification (`[1]G2`, `[τ]G2`).
pub const G2_POWERS: usize = 2;

/// Errors raised while loading or validating an SRS.
#[derive(Debug, thiserror::Error)]
pub enum SrsError {
    /// Requested depth outside `1..=MAX_DEPTH`.
    #[error("SRS depth {depth} outside 1..={max}")]
    InvalidDepth {
        /// Requested depth.
        depth: usize,
        /// Upper bound.
        max: usize,
    },
    /// The ceremony data is corrupt, truncated or does not match the generators.
    #[error("SRS integrity check failed: {0}")]
    Integrity(String),
    /// A coordinate could not be parsed or is not a canonical base-field element.
    #[error("SRS coordinate error at {group} index {index}: {source}")]
    Coordinate {
        /// "G1" or "G2".
        group: &'static str,
        /// Point index in the file.
        index: usize,
        /// Underlying parse error.
        #[source]
        source: FieldError,
    },
    /// Ceremony JSON could not be decoded.
    #[error("SRS decode error: {0}")]
    Decode(#[from] serde_json::Error),
    /// Ceremony file could not be read or written.
    #[error("SRS I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Powers of a secret τ in both BN254 groups.
#[derive(Clone, Debug)]
pub struct Srs {
    g1: Vec<G1Affine>,
    g2: Vec<G2Affine>,
}

/// The part of the SRS a verifier needs: `[1]G1`, `[1]G2` and `[τ]G2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifierKey {
    /// `[1]G1`
    pub g1: G1Affine,
    /// `[1]G2`
    pub g2: G2Affine,
    /// `[τ]G2`
    pub tau_g2: G2Affine,
}

fn check_depth(depth: usize) -> Result<(), SrsError> {
    if depth == 0 || depth > MAX_DEPTH {
        return Err(SrsError::InvalidDepth {
            depth,
            max: MAX_DEPTH,
        });
    }
    Ok(())
}

fn parse_fq(group: &'static str, index: usize, s: &str) -> Result<Fq, SrsError> {
    field::parse_field_element::<Fq>(s).map_err(|source| SrsError::Coordinate {
        group,
        index,
        source,
    })
}

fn g1_from_strings(index: usize, xy: &[String; 2]) -> Result<G1Affine, SrsError> {
    let x = parse_fq("G1", index, &xy[0])?;
    let y = parse_fq("G1", index, &xy[1])?;
    let p = G1Affine::new_unchecked(x, y);
    if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(SrsError::Integrity(format!("G1 point {index} is not on the curve")));
    }
    Ok(p)
}

fn g2_from_strings(index: usize, q: &[String; 4]) -> Result<G2Affine, SrsError> {
    let x = Fq2::new(parse_fq("G2", index, &q[0])?, parse_fq("G2", index, &q[1])?);
    let y = Fq2::new(parse_fq("G2", index, &q[2])?, parse_fq("G2", index, &q[3])?);
    let p = G2Affine::new_unchecked(x, y);
    if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(SrsError::Integrity(format!(
            "G2 point {index} is not on the curve or outside the prime-order subgroup"
        )));
    }
    Ok(p)
}

fn fq_dec(x: &Fq) -> String {
    field::to_biguint(x).to_string()
}

fn g2_strings(p: &G2Affine) -> [String; 4] {
    [
        fq_dec(&p.x.c0),
        fq_dec(&p.x.c1),
        fq_dec(&p.y.c0),
        fq_dec(&p.y.c1),
    ]
}

impl Srs {
    /// Load `depth` G1 powers and the first two G2 powers from ceremony JSON.
    #[instrument(level = "info", skip_all, fields(depth = depth))]
    pub fn load(
        depth: usize,
        g1_reader: impl Read,
        g2_reader: impl Read,
    ) -> Result<Self, SrsError> {
        check_depth(depth)?;

        let raw_g1: Vec<[String; 2]> = serde_json::from_reader(g1_reader)?;
        let raw_g2: Vec<[String; 4]> = serde_json::from_reader(g2_reader)?;
        if raw_g1.len() < depth {
            return Err(SrsError::Integrity(format!(
                "ceremony provides {} G1 powers, {} requested",
                raw_g1.len(),
                depth
            )));
        }
        if raw_g2.len() < G2_POWERS {
            return Err(SrsError::Integrity(format!(
                "ceremony provides {} G2 powers, {} required",
                raw_g2.len(),
                G2_POWERS
            )));
        }

        let g1 = raw_g1
            .iter()
            .take(depth)
            .enumerate()
            .map(|(i, xy)| g1_from_strings(i, xy))
            .collect::<Result<Vec<_>, _>>()?;
        let g2 = raw_g2
            .iter()
            .take(G2_POWERS)
            .enumerate()
            .map(|(i, q)| g2_from_strings(i, q))
            .collect::<Result<Vec<_>, _>>()?;

        let srs = Self::from_points(g1, g2)?;
        info!(depth = srs.depth(), digest = %srs.digest_hex(), "loaded SRS");
        Ok(srs)
    }

    /// [`Srs::load`] from two files on disk.
    pub fn from_paths(depth: usize, g1_path: &Path, g2_path: &Path) -> Result<Self, SrsError> {
        let g1 = BufReader::new(File::open(g1_path)?);
        let g2 = BufReader::new(File::open(g2_path)?);
        Self::load(depth, g1, g2)
    }

    /// Build an SRS from already-decoded points, running the generator checks.
    pub fn from_points(g1: Vec<G1Affine>, g2: Vec<G2Affine>) -> Result<Self, SrsError> {
        check_depth(g1.len())?;
        if g2.len() < G2_POWERS {
            return Err(SrsError::Integrity("fewer than two G2 powers".into()));
        }
        if g2[0] != G2Affine::generator() {
            return Err(SrsError::Integrity(
                "G2 basis is not the generator (ceremony file corrupt or swapped)".into(),
            ));
        }
        if g1[0] != G1Affine::generator() {
            let msg = "G1 basis does not start at the generator";
            return Err(SrsError::Integrity(msg.into()));
        }
        Ok(Self { g1, g2 })
    }

    /// Fresh SRS from a locally sampled τ. The secret is dropped on return;
    /// use only for development and tests, never for real issuance.
    pub fn insecure_setup<R: RngCore>(depth: usize, rng: &mut R) -> Result<Self, SrsError> {
        check_depth(depth)?;
        let tau = Fr::rand(rng);
        Self::insecure_from_tau(depth, tau)
    }

    fn insecure_from_tau(depth: usize, tau: Fr) -> Result<Self, SrsError> {
        let g1_gen = G1Projective::generator();
        let g2_gen = G2Projective::generator();

        let mut powers = Vec::with_capacity(depth);
        let mut cur = Fr::from(1u64);
        for _ in 0..depth {
            powers.push(g1_gen.mul_bigint(cur.into_bigint()));
            cur *= tau;
        }
        let g1 = G1Projective::normalize_batch(&powers);
        let g2 = vec![
            g2_gen.into_affine(),
            g2_gen.mul_bigint(tau.into_bigint()).into_affine(),
        ];
        Self::from_points(g1, g2)
    }

    /// Write the SRS in ceremony JSON (decimal coordinates).
    pub fn write_ceremony(
        &self,
        g1_writer: impl Write,
        g2_writer: impl Write,
    ) -> Result<(), SrsError> {
        let g1: Vec<[String; 2]> = self
            .g1
            .iter()
            .map(|p| [fq_dec(&p.x), fq_dec(&p.y)])
            .collect();
        let g2: Vec<[String; 4]> = self.g2.iter().map(g2_strings).collect();
        serde_json::to_writer(g1_writer, &g1)?;
        serde_json::to_writer(g2_writer, &g2)?;
        Ok(())
    }

    /// Number of G1 powers (maximum committable coefficient count).
    pub fn depth(&self) -> usize {
        self.g1.len()
    }

    /// G1 powers `[τ^0]G1 .. [τ^{depth-1}]G1`.
    pub fn g1_powers(&self) -> &[G1Affine] {
        &self.g1
    }

    /// Verification material.
    pub fn verifier_key(&self) -> VerifierKey {
        VerifierKey {
            g1: self.g1[0],
            g2: self.g2[0],
            tau_g2: self.g2[1],
        }
    }

    /// BLAKE3 digest over the compressed points, for operator-facing logs.
    pub fn digest(&self) -> [u8; 32] {
        let mut h = Hasher::new();
        h.update(b"veccert.srs.v1");
        h.update(&(self.g1.len() as u64).to_be_bytes());
        let mut buf = Vec::with_capacity(64);
        for p in &self.g1 {
            buf.clear();
            if p.serialize_compressed(&mut buf).is_ok() {
                h.update(&buf);
            }
        }
        for p in &self.g2 {
            buf.clear();
            if p.serialize_compressed(&mut buf).is_ok() {
                h.update(&buf);
            }
        }
        *h.finalize().as_bytes()
    }

    fn digest_hex(&self) -> String {
        self.digest().iter().take(8).map(|b| format!("{b:02x}")).collect()
    }
}

impl VerifierKey {
    /// True when `[τ]G2` is the identity, which would make every opening verify.
    pub fn is_degenerate(&self) -> bool {
        self.tau_g2.infinity
    }
}
