//! Ledger-facing verification call
//!
//! The trust-anchoring contract exposes one pure function taking four
//! string-encoded arguments and returning a boolean. This module is the
//! off-ledger twin of that function: same argument encoding, same pairing
//! equation as [`pcs::verify`], so the two accept exactly the same inputs.
//!
//! Malformed arguments (unparsable integers, values `>= p`, points off the
//! curve) are errors. A well-formed tuple that does not open is `Ok(false)`.

#![forbid(unsafe_code)]

use ark_bn254::G1Affine;
use serde::{Deserialize, Serialize};

use crate::field::{self, FieldError};
use crate::pcs::{self, Commitment, PcsError};
use crate::srs::VerifierKey;
use crate::F;

/// Errors for malformed contract arguments.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// `commitment` or `proof` is not a G1 point.
    #[error("{arg}: {source}")]
    Point {
        /// Argument name.
        arg: &'static str,
        /// Decoding failure.
        #[source]
        source: PcsError,
    },
    /// `index` or `value` is not a field element.
    #[error("{arg}: {source}")]
    Scalar {
        /// Argument name.
        arg: &'static str,
        /// Parsing failure.
        #[source]
        source: FieldError,
    },
}

/// Arguments of the contract's `verify` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierContractParams {
    /// Commitment `[x, y]`.
    pub commitment: [String; 2],
    /// Opening proof `[x, y]`.
    pub proof: [String; 2],
    /// Evaluation point.
    pub index: String,
    /// Claimed value.
    pub value: String,
}

impl VerifierContractParams {
    /// Encode a verification tuple the way the issuer publishes it.
    pub fn new(commitment: &Commitment, proof: &G1Affine, index: F, value: F) -> Self {
        Self {
            commitment: commitment.to_ledger(),
            proof: pcs::point_to_hex(proof),
            index: field::to_hex(&index),
            value: field::to_hex(&value),
        }
    }

    /// Decode into typed values.
    pub fn decode(&self) -> Result<(Commitment, G1Affine, F, F), ContractError> {
        let point = |arg| move |source| ContractError::Point { arg, source };
        let scalar = |arg| move |source| ContractError::Scalar { arg, source };
        let commitment = Commitment::from_ledger(&self.commitment).map_err(point("commitment"))?;
        let proof = pcs::point_from_hex(&self.proof).map_err(point("proof"))?;
        let index = field::parse_field_element(&self.index).map_err(scalar("index"))?;
        let value = field::parse_field_element(&self.value).map_err(scalar("value"))?;
        Ok((commitment, proof, index, value))
    }
}

/// Run the contract's verification equation.
pub fn verify_params(
    vk: &VerifierKey,
    params: &VerifierContractParams,
) -> Result<bool, ContractError> {
    let (commitment, proof, index, value) = params.decode()?;
    Ok(pcs::verify(vk, &commitment, &proof, index, value))
}
