//! Public spot-check challenge
//!
//! Once per batch the issuer opens the committed polynomial at a point that
//! nobody could predict before the commitment existed. The point is a pure
//! hash of the commitment: no nonce and no leaf sample, so every verifier can
//! re-derive it from the published commitment alone and reject a challenge
//! whose index was picked by hand.

#![forbid(unsafe_code)]

use ark_bn254::G1Affine;
use ark_ec::AffineRepr;
use tracing::{instrument, warn};

use crate::field::{self, Polynomial};
use crate::pcs::{self, Commitment, PcsError};
use crate::srs::{Srs, VerifierKey};
use crate::transcript::Transcript;
use crate::F;

/// Opening of the batch polynomial at the derived challenge point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge {
    /// Derived evaluation point; generally outside `0..N`.
    pub index: F,
    /// `P(index)`.
    pub value: F,
    /// Opening proof at `index`.
    pub proof: G1Affine,
    /// The commitment the challenge was derived from.
    pub commitment: Commitment,
}

/// Hash the commitment into a field element.
pub fn derive_challenge(commitment: &Commitment) -> F {
    let mut t = Transcript::new("veccert.challenge");
    t.absorb_commitment("commitment", commitment);
    match commitment.0.xy() {
        Some((x, y)) => {
            t.absorb_field("x", x);
            t.absorb_field("y", y);
        }
        None => t.absorb_bytes("identity", &[]),
    }
    t.challenge_f("index")
}

/// Derive the challenge point for `commitment` and open `poly` there.
#[instrument(level = "info", skip_all)]
pub fn build_challenge(
    srs: &Srs,
    poly: &Polynomial<F>,
    commitment: &Commitment,
) -> Result<Challenge, PcsError> {
    let index = derive_challenge(commitment);
    let opening = pcs::open(srs, poly, index)?;
    Ok(Challenge {
        index,
        value: opening.value,
        proof: opening.proof,
        commitment: *commitment,
    })
}

/// Re-derive the index from the commitment and check the opening.
pub fn verify_challenge(vk: &VerifierKey, challenge: &Challenge) -> bool {
    if derive_challenge(&challenge.commitment) != challenge.index {
        warn!(
            index = %field::to_hex(&challenge.index),
            "challenge index is not bound to the commitment"
        );
        return false;
    }
    let ok = pcs::verify(
        vk,
        &challenge.commitment,
        &challenge.proof,
        challenge.index,
        challenge.value,
    );
    if !ok {
        warn!("challenge opening failed the pairing check");
    }
    ok
}
