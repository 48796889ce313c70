//! Polynomial Commitment Scheme: KZG on BN254
//!
//! One commitment per batch, one single-point opening per leaf.
//!
//! - [`commit`]: `C = Σ c_i · [τ^i]G1`, a variable-base MSM over the SRS.
//! - [`open`]: `(value, [Q(τ)]G1)` with `Q = (P - P(z)) / (X - z)`.
//! - [`verify`]: the pairing check
//!   `e(z·W + C - v·[1]G1, [1]G2) == e(W, [τ]G2)`,
//!   which is `e(C - v·G1, G2) == e(W, [τ - z]G2)` rearranged so that the
//!   ledger contract can evaluate it with one G1 MSM and two pairings.
//!
//! Points cross the ledger boundary as `[x, y]` pairs of `0x` hex strings;
//! the identity is `[0x0, 0x0]`.

#![forbid(unsafe_code)]

use ark_bn254::{Bn254, Fq, G1Affine, G1Projective};
use ark_ec::{pairing::Pairing, AffineRepr, CurveGroup, VariableBaseMSM};
use ark_ff::{One, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use num_bigint::{BigInt, Sign};
use tracing::{instrument, trace};

use crate::field::{self, FieldError, Polynomial};
use crate::quotient;
use crate::srs::{Srs, VerifierKey};
use crate::F;

/// Errors from commitment and opening.
#[derive(Debug, thiserror::Error)]
pub enum PcsError {
    /// More coefficients than SRS powers.
    #[error("polynomial has {len} coefficients but the SRS only has {depth} powers")]
    DegreeTooLarge {
        /// Coefficient count.
        len: usize,
        /// SRS depth.
        depth: usize,
    },
    /// A scalar handed to the commitment engine is negative or not below `p`.
    #[error("scalar {value} at position {position} is outside [0, p)")]
    ScalarOutOfRange {
        /// Position in the coefficient vector.
        position: usize,
        /// Offending value (decimal).
        value: String,
    },
    /// The quotient division left a remainder.
    #[error("opening at {point} leaves non-zero remainder {remainder}")]
    InvalidOpeningPoint {
        /// Evaluation point (hex).
        point: String,
        /// Constant remainder (hex).
        remainder: String,
    },
    /// A freshly built proof did not pass the pairing check.
    #[error("proof at {point} failed verification against the batch commitment")]
    ProofRejected {
        /// Evaluation point (hex).
        point: String,
    },
    /// A ledger-form point is not a valid G1 element.
    #[error("malformed G1 point: {0}")]
    MalformedPoint(String),
    /// Field arithmetic failure.
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Commitment to one batch polynomial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct Commitment(pub G1Affine);

/// Single-point KZG opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpeningProof {
    /// Evaluation point `z`.
    pub point: F,
    /// `P(z)`.
    pub value: F,
    /// `[Q(τ)]G1`.
    pub proof: G1Affine,
}

impl Commitment {
    /// Ledger form `[x, y]`.
    pub fn to_ledger(&self) -> [String; 2] {
        point_to_hex(&self.0)
    }

    /// Parse the ledger form, checking the point is on the curve.
    pub fn from_ledger(xy: &[String; 2]) -> Result<Self, PcsError> {
        point_from_hex(xy).map(Self)
    }
}

/// `[x, y]` as `0x` hex; the identity encodes as `[0x0, 0x0]`.
pub fn point_to_hex(p: &G1Affine) -> [String; 2] {
    match p.xy() {
        Some((x, y)) => [field::to_hex(x), field::to_hex(y)],
        None => ["0x0".to_string(), "0x0".to_string()],
    }
}

/// Inverse of [`point_to_hex`]. Accepts decimal as well as hex coordinates.
pub fn point_from_hex(xy: &[String; 2]) -> Result<G1Affine, PcsError> {
    let x: Fq = field::parse_field_element(&xy[0])?;
    let y: Fq = field::parse_field_element(&xy[1])?;
    if x.is_zero() && y.is_zero() {
        return Ok(G1Affine::identity());
    }
    let p = G1Affine::new_unchecked(x, y);
    if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        let msg = format!("({}, {}) is not on BN254 G1", xy[0], xy[1]);
        return Err(PcsError::MalformedPoint(msg));
    }
    Ok(p)
}

/// `Σ coeffs[i] · srs.g1[i]`.
#[instrument(level = "debug", skip_all, fields(len = coeffs.len()))]
pub fn commit(srs: &Srs, coeffs: &[F]) -> Result<Commitment, PcsError> {
    let powers = srs.g1_powers();
    if coeffs.len() > powers.len() {
        return Err(PcsError::DegreeTooLarge {
            len: coeffs.len(),
            depth: powers.len(),
        });
    }
    for (position, c) in coeffs.iter().enumerate() {
        field::ensure_canonical(c).map_err(|_| PcsError::ScalarOutOfRange {
            position,
            value: field::to_biguint(c).to_string(),
        })?;
    }
    let bases = &powers[..coeffs.len()];
    let acc = G1Projective::msm(bases, coeffs).map_err(|n| PcsError::DegreeTooLarge {
        len: n,
        depth: bases.len(),
    })?;
    Ok(Commitment(acc.into_affine()))
}

/// [`commit`] over arbitrary integers, rejecting anything outside `[0, p)`
/// instead of reducing it.
pub fn commit_integers(srs: &Srs, values: &[BigInt]) -> Result<Commitment, PcsError> {
    let coeffs = values
        .iter()
        .enumerate()
        .map(|(position, v)| {
            let out_of_range = || PcsError::ScalarOutOfRange {
                position,
                value: v.to_string(),
            };
            if v.sign() == Sign::Minus {
                return Err(out_of_range());
            }
            field::from_biguint_checked::<F>(v.magnitude()).map_err(|_| out_of_range())
        })
        .collect::<Result<Vec<_>, _>>()?;
    commit(srs, &coeffs)
}

/// Open `poly` at `point`.
pub fn open(srs: &Srs, poly: &Polynomial<F>, point: F) -> Result<OpeningProof, PcsError> {
    let (value, q) = quotient::build_quotient(poly, point)?;
    let proof = commit(srs, q.coeffs())?.0;
    trace!(point = %field::to_hex(&point), "opened");
    Ok(OpeningProof {
        point,
        value,
        proof,
    })
}

/// Proof that `poly(point) == value`; fails with
/// [`PcsError::InvalidOpeningPoint`] when the leaf value does not lie on `poly`.
pub fn open_leaf(
    srs: &Srs,
    poly: &Polynomial<F>,
    point: F,
    value: F,
) -> Result<G1Affine, PcsError> {
    let q = quotient::divide_out(poly, point, value)?;
    Ok(commit(srs, q.coeffs())?.0)
}

/// Check that `proof` opens `commitment` to `value` at `index`.
///
/// Returns `false` on any mismatch; never errors.
pub fn verify(
    vk: &VerifierKey,
    commitment: &Commitment,
    proof: &G1Affine,
    index: F,
    value: F,
) -> bool {
    if vk.is_degenerate() {
        return false;
    }
    // z·W + C - v·G1
    let lhs = proof.into_group() * index + commitment.0.into_group() - vk.g1.into_group() * value;
    let lhs = lhs.into_affine();
    let neg_w = -*proof;

    let mlo = Bn254::multi_miller_loop([lhs, neg_w], [vk.g2, vk.tau_g2]);
    Bn254::final_exponentiation(mlo).map(|fe| fe.0.is_one()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::UniformRand;
    use rand::{rngs::StdRng, SeedableRng};

    fn setup(depth: usize, seed: u64) -> Srs {
        Srs::insecure_setup(depth, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn five_nine_line_opens_at_both_leaves() {
        let srs = setup(4, 7);
        let vk = srs.verifier_key();
        let values = [F::from(5u64), F::from(9u64)];
        let poly = Polynomial::interpolate(&values).unwrap();
        assert_eq!(poly.degree(), Some(1));
        let c = commit(&srs, poly.coeffs()).unwrap();

        for (i, &y) in values.iter().enumerate() {
            let o = open(&srs, &poly, F::from(i as u64)).unwrap();
            assert_eq!(o.value, y);
            assert!(verify(&vk, &c, &o.proof, o.point, y));
        }
        let o0 = open(&srs, &poly, F::from(0u64)).unwrap();
        assert!(!verify(&vk, &c, &o0.proof, F::from(0u64), F::from(6u64)));
    }

    #[test]
    fn random_point_opening_verifies() {
        let mut rng = StdRng::seed_from_u64(8);
        let srs = setup(16, 9);
        let values: Vec<F> = (0..16).map(|_| F::rand(&mut rng)).collect();
        let poly = Polynomial::interpolate(&values).unwrap();
        let c = commit(&srs, poly.coeffs()).unwrap();
        let z = F::rand(&mut rng);
        let o = open(&srs, &poly, z).unwrap();
        assert!(verify(&srs.verifier_key(), &c, &o.proof, z, o.value));
        assert!(!verify(&srs.verifier_key(), &c, &o.proof, z + F::one(), o.value));
    }

    #[test]
    fn commit_matches_naive_sum_and_is_deterministic() {
        let srs = setup(3, 10);
        let coeffs = [F::from(3u64), F::from(0u64), F::from(11u64)];
        let g = srs.g1_powers();
        let naive = (g[0] * coeffs[0] + g[2] * coeffs[2]).into_affine();
        assert_eq!(commit(&srs, &coeffs).unwrap().0, naive);
        assert_eq!(commit(&srs, &coeffs).unwrap(), commit(&srs, &coeffs).unwrap());
    }

    #[test]
    fn too_many_coefficients() {
        let srs = setup(2, 12);
        let err = commit(&srs, &[F::one(); 3]).unwrap_err();
        assert!(matches!(err, PcsError::DegreeTooLarge { len: 3, depth: 2 }));
    }

    #[test]
    fn integer_boundary_rejects_negative_and_oversized() {
        let srs = setup(2, 13);
        let p = BigInt::from_biguint(Sign::Plus, field::modulus::<F>());
        assert!(matches!(
            commit_integers(&srs, &[BigInt::from(1), BigInt::from(-1)]),
            Err(PcsError::ScalarOutOfRange { position: 1, .. })
        ));
        assert!(matches!(
            commit_integers(&srs, &[p.clone()]),
            Err(PcsError::ScalarOutOfRange { position: 0, .. })
        ));
        let ok = commit_integers(&srs, &[p - 1, BigInt::from(2)]).unwrap();
        assert_eq!(ok, commit(&srs, &[-F::one(), F::from(2u64)]).unwrap());
    }

    #[test]
    fn ledger_point_form() {
        let srs = setup(2, 14);
        let c = Commitment(srs.g1_powers()[1]);
        assert_eq!(Commitment::from_ledger(&c.to_ledger()).unwrap(), c);
        assert_eq!(
            point_to_hex(&G1Affine::generator()),
            ["0x1".to_string(), "0x2".to_string()]
        );
        let identity = point_from_hex(&["0x0".into(), "0x0".into()]).unwrap();
        assert_eq!(identity, G1Affine::identity());
        assert!(matches!(
            point_from_hex(&["1".into(), "3".into()]),
            Err(PcsError::MalformedPoint(_))
        ));
    }
}
