//! Opening quotient builder
//!
//! For a polynomial `P` and a point `z` the opening witness is
//! `Q(X) = (P(X) - P(z)) / (X - z)`. The division is performed as general
//! long division and the remainder is checked: a non-zero remainder means the
//! claimed value is not `P(z)`, which only happens through a hashing or
//! indexing bug upstream. That case fails fast instead of producing a proof.

#![forbid(unsafe_code)]

use ark_ff::PrimeField;

use crate::field::{self, Polynomial};
use crate::pcs::PcsError;

/// Return `(P(z), Q)` with `P(X) - P(z) = Q(X) · (X - z)`.
pub fn build_quotient<F: PrimeField>(
    poly: &Polynomial<F>,
    point: F,
) -> Result<(F, Polynomial<F>), PcsError> {
    let value = poly.evaluate(point);
    divide_out(poly, point, value).map(|q| (value, q))
}

/// Divide `P(X) - value` by `X - point`, failing when `value != P(point)`.
pub fn divide_out<F: PrimeField>(
    poly: &Polynomial<F>,
    point: F,
    value: F,
) -> Result<Polynomial<F>, PcsError> {
    let numerator = poly.sub_constant(value);
    let divisor = Polynomial::from_coefficients(vec![-point, F::one()]);
    let (quotient, remainder) = numerator.divide(&divisor)?;
    if !remainder.is_zero() {
        return Err(PcsError::InvalidOpeningPoint {
            point: field::to_hex(&point),
            remainder: field::to_hex(&remainder.evaluate(F::zero())),
        });
    }
    Ok(quotient)
}
