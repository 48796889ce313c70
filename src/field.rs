//! Field arithmetic over the interpolation domain `x = 0..N-1`
//!
//! Coefficient-form polynomials over any arkworks [`PrimeField`]: Lagrange
//! interpolation through consecutive integer nodes, Horner evaluation and
//! exact long division (used for opening quotients). The issuance pipeline
//! instantiates `F = ark_bn254::Fr`; the generic form keeps the algebra
//! testable over small primes.
//!
//! Invariants honored here:
//! - Every coefficient handed out is canonical (`< p`). A non-canonical value
//!   is reported as [`FieldError::CoefficientOverflow`] and never wrapped.
//! - Interpolation is pure: identical values in identical order always give
//!   identical coefficients.
//! - Integers crossing a string boundary (ledger params, embedded metadata)
//!   are parsed as decimal or `0x` hex and rejected when `>= p`.

#![forbid(unsafe_code)]

use ark_ff::{batch_inversion, BigInteger, PrimeField};
use num_bigint::BigUint;

/// Errors raised by field and polynomial arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// A value is not reduced below the field modulus.
    #[error("coefficient overflow: {value} is not below the field modulus")]
    CoefficientOverflow {
        /// Offending value rendered as hex.
        value: String,
    },
    /// A string could not be parsed as a decimal or `0x` hex integer.
    #[error("cannot parse integer from {input:?}")]
    Parse {
        /// Raw input.
        input: String,
    },
    /// The nodes `0..N-1` are not distinct in this field.
    #[error("interpolation domain of size {n} does not fit in the field")]
    DomainTooLarge {
        /// Requested domain size.
        n: usize,
    },
    /// Division by the zero polynomial.
    #[error("division by the zero polynomial")]
    DivisionByZero,
}

// ------------------------- Integer boundary -------------------------

/// Parse a decimal or `0x`-prefixed hex string into an unsigned big integer.
pub fn parse_biguint(input: &str) -> Result<BigUint, FieldError> {
    let s = input.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) if !hex.is_empty() => BigUint::parse_bytes(hex.as_bytes(), 16),
        Some(_) => None,
        None if !s.is_empty() => BigUint::parse_bytes(s.as_bytes(), 10),
        None => None,
    };
    parsed.ok_or_else(|| FieldError::Parse {
        input: input.to_string(),
    })
}

/// The field modulus `p` as a big integer.
pub fn modulus<F: PrimeField>() -> BigUint {
    BigUint::from_bytes_le(&F::MODULUS.to_bytes_le())
}

/// Convert a big integer into `F`, failing instead of reducing when `v >= p`.
pub fn from_biguint_checked<F: PrimeField>(v: &BigUint) -> Result<F, FieldError> {
    if *v >= modulus::<F>() {
        return Err(FieldError::CoefficientOverflow {
            value: format!("0x{v:x}"),
        });
    }
    Ok(F::from_le_bytes_mod_order(&v.to_bytes_le()))
}

/// Parse a field element from its decimal or hex string form.
pub fn parse_field_element<F: PrimeField>(input: &str) -> Result<F, FieldError> {
    from_biguint_checked(&parse_biguint(input)?)
}

/// Canonical integer value of a field element.
pub fn to_biguint<F: PrimeField>(x: &F) -> BigUint {
    BigUint::from_bytes_le(&x.into_bigint().to_bytes_le())
}

/// `0x`-prefixed lowercase hex rendering (no leading zeros), as the ledger expects.
pub fn to_hex<F: PrimeField>(x: &F) -> String {
    format!("0x{:x}", to_biguint(x))
}

/// Check that `x` is stored in canonical form (`< p`).
#[inline]
pub fn ensure_canonical<F: PrimeField>(x: &F) -> Result<(), FieldError> {
    let repr = x.into_bigint();
    if repr >= F::MODULUS {
        return Err(FieldError::CoefficientOverflow {
            value: format!("0x{:x}", to_biguint(x)),
        });
    }
    Ok(())
}

// ------------------------- Polynomials -------------------------

/// Polynomial in coefficient form, lowest degree first.
///
/// For a batch of `N` leaves the interpolated polynomial has `N` coefficients
/// (degree at most `N - 1`). Trailing zero coefficients are kept so that the
/// coefficient count always matches the batch size.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Polynomial<F: PrimeField> {
    coeffs: Vec<F>,
}

impl<F: PrimeField> Polynomial<F> {
    /// Wrap a coefficient vector (low to high).
    pub fn from_coefficients(coeffs: Vec<F>) -> Self {
        Self { coeffs }
    }

    /// The zero polynomial.
    pub fn zero() -> Self {
        Self { coeffs: Vec::new() }
    }

    /// Coefficients, low to high.
    pub fn coeffs(&self) -> &[F] {
        &self.coeffs
    }

    /// Number of stored coefficients (including trailing zeros).
    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    /// True when no coefficients are stored.
    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// True for the zero polynomial.
    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|c| c.is_zero())
    }

    /// Actual degree, `None` for the zero polynomial.
    pub fn degree(&self) -> Option<usize> {
        self.coeffs.iter().rposition(|c| !c.is_zero())
    }

    /// Evaluate at `x` with Horner's rule (high to low).
    pub fn evaluate(&self, x: F) -> F {
        let mut acc = F::zero();
        for &a in self.coeffs.iter().rev() {
            acc = acc * x + a;
        }
        acc
    }

    /// `P(x) - c`.
    pub fn sub_constant(&self, c: F) -> Self {
        let mut coeffs = self.coeffs.clone();
        match coeffs.first_mut() {
            Some(a0) => *a0 -= c,
            None => coeffs.push(-c),
        }
        Self { coeffs }
    }

    /// Assert every coefficient is canonical.
    pub fn check_canonical(&self) -> Result<(), FieldError> {
        self.coeffs.iter().try_for_each(ensure_canonical)
    }

    /// Interpolate the unique polynomial of degree `< N` with `P(i) = values[i]`
    /// for `i = 0..N-1`.
    ///
    /// Uses the master polynomial `M(X) = Π_j (X - j)` and the closed-form
    /// barycentric weights of consecutive integer nodes,
    /// `w_i = 1 / (i! · (N-1-i)! · (-1)^{N-1-i})`, so each basis polynomial is
    /// one synthetic division of `M`. Cost is `O(N^2)` field operations.
    pub fn interpolate(values: &[F]) -> Result<Self, FieldError> {
        let n = values.len();
        if n == 0 {
            return Ok(Self::zero());
        }
        if BigUint::from(n) > modulus::<F>() {
            return Err(FieldError::DomainTooLarge { n });
        }
        values.iter().try_for_each(ensure_canonical)?;

        // M(X) = Π_{j=0}^{N-1} (X - j), N + 1 coefficients.
        let mut master = Vec::with_capacity(n + 1);
        master.push(F::one());
        for j in 0..n {
            let xj = F::from(j as u64);
            master.push(F::zero());
            for k in (0..master.len()).rev() {
                let lower = if k > 0 { master[k - 1] } else { F::zero() };
                master[k] = lower - xj * master[k];
            }
        }

        // factorials 0!..(N-1)!
        let mut fact = Vec::with_capacity(n);
        fact.push(F::one());
        for k in 1..n {
            let prev = fact[k - 1];
            fact.push(prev * F::from(k as u64));
        }
        let mut weights: Vec<F> = (0..n)
            .map(|i| {
                let d = fact[i] * fact[n - 1 - i];
                if (n - 1 - i) % 2 == 1 {
                    -d
                } else {
                    d
                }
            })
            .collect();
        batch_inversion(&mut weights);

        let mut out = vec![F::zero(); n];
        let mut basis = vec![F::zero(); n];
        for (i, (&y, &w)) in values.iter().zip(weights.iter()).enumerate() {
            if y.is_zero() {
                continue;
            }
            // basis = M(X) / (X - i), synthetic division high → low.
            let xi = F::from(i as u64);
            basis[n - 1] = master[n];
            for k in (1..n).rev() {
                basis[k - 1] = master[k] + xi * basis[k];
            }
            let scale = y * w;
            for (o, b) in out.iter_mut().zip(basis.iter()) {
                *o += scale * b;
            }
        }

        let poly = Self { coeffs: out };
        poly.check_canonical()?;
        Ok(poly)
    }

    /// Long division: returns `(quotient, remainder)` with
    /// `self = quotient · divisor + remainder` and `deg(remainder) < deg(divisor)`.
    pub fn divide(&self, divisor: &Self) -> Result<(Self, Self), FieldError> {
        let d = divisor.degree().ok_or(FieldError::DivisionByZero)?;
        let lead_inv = divisor.coeffs[d].inverse().ok_or(FieldError::DivisionByZero)?;

        let mut rem: Vec<F> = match self.degree() {
            Some(deg) => self.coeffs[..=deg].to_vec(),
            None => return Ok((Self::zero(), Self::zero())),
        };
        if rem.len() <= d {
            return Ok((Self::zero(), Self { coeffs: rem }));
        }

        let mut quot = vec![F::zero(); rem.len() - d];
        for k in (0..quot.len()).rev() {
            let coef = rem[k + d] * lead_inv;
            quot[k] = coef;
            if coef.is_zero() {
                continue;
            }
            for (j, &b) in divisor.coeffs[..=d].iter().enumerate() {
                rem[k + j] -= coef * b;
            }
        }
        rem.truncate(d);
        while rem.last().is_some_and(|c| c.is_zero()) {
            rem.pop();
        }

        let quotient = Self { coeffs: quot };
        let remainder = Self { coeffs: rem };
        quotient.check_canonical()?;
        remainder.check_canonical()?;
        Ok((quotient, remainder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;
    use ark_ff::fields::{Fp64, MontBackend, MontConfig};
    use ark_std::UniformRand;
    use rand::{rngs::StdRng, SeedableRng};

    #[derive(MontConfig)]
    #[modulus = "101"]
    #[generator = "2"]
    pub struct SmallConfig;
    type Small = Fp64<MontBackend<SmallConfig, 1>>;

    #[test]
    fn interpolates_two_points_to_a_line() {
        let values = [Fr::from(5u64), Fr::from(9u64)];
        let p = Polynomial::interpolate(&values).unwrap();
        assert_eq!(p.coeffs(), &[Fr::from(5u64), Fr::from(4u64)]);
        assert_eq!(p.evaluate(Fr::from(0u64)), values[0]);
        assert_eq!(p.evaluate(Fr::from(1u64)), values[1]);
    }

    #[test]
    fn interpolation_hits_every_node() {
        let mut rng = StdRng::seed_from_u64(7);
        let values: Vec<Fr> = (0..17).map(|_| Fr::rand(&mut rng)).collect();
        let p = Polynomial::interpolate(&values).unwrap();
        assert_eq!(p.len(), values.len());
        for (i, v) in values.iter().enumerate() {
            assert_eq!(p.evaluate(Fr::from(i as u64)), *v);
        }
        assert_eq!(Polynomial::interpolate(&values).unwrap(), p);
    }

    #[test]
    fn small_prime_interpolation_wraps_correctly() {
        let values: Vec<Small> = [5u64, 9, 100, 0, 42]
            .iter()
            .map(|&v| Small::from(v))
            .collect();
        let p = Polynomial::interpolate(&values).unwrap();
        for (i, v) in values.iter().enumerate() {
            assert_eq!(p.evaluate(Small::from(i as u64)), *v);
        }
        p.check_canonical().unwrap();
    }

    #[test]
    fn small_prime_rejects_oversized_domain() {
        let values = vec![Small::from(1u64); 102];
        assert_eq!(
            Polynomial::interpolate(&values),
            Err(FieldError::DomainTooLarge { n: 102 })
        );
    }

    #[test]
    fn exact_division_has_zero_remainder() {
        // (x^2 - 1) / (x - 1) = x + 1
        let num =
            Polynomial::from_coefficients(vec![-Fr::from(1u64), Fr::from(0u64), Fr::from(1u64)]);
        let den = Polynomial::from_coefficients(vec![-Fr::from(1u64), Fr::from(1u64)]);
        let (q, r) = num.divide(&den).unwrap();
        assert_eq!(q.coeffs(), &[Fr::from(1u64), Fr::from(1u64)]);
        assert!(r.is_zero());
    }

    #[test]
    fn inexact_division_reports_remainder() {
        // (x^2 + 3) / (x - 1) = x + 1, remainder 4
        let num =
            Polynomial::from_coefficients(vec![Fr::from(3u64), Fr::from(0u64), Fr::from(1u64)]);
        let den = Polynomial::from_coefficients(vec![-Fr::from(1u64), Fr::from(1u64)]);
        let (q, r) = num.divide(&den).unwrap();
        assert_eq!(q.coeffs(), &[Fr::from(1u64), Fr::from(1u64)]);
        assert_eq!(r.coeffs(), &[Fr::from(4u64)]);
        assert_eq!(num.divide(&Polynomial::zero()), Err(FieldError::DivisionByZero));
    }

    #[test]
    fn parses_decimal_and_hex_and_rejects_overflow() {
        assert_eq!(parse_field_element::<Fr>("0x10").unwrap(), Fr::from(16u64));
        assert_eq!(parse_field_element::<Fr>("16").unwrap(), Fr::from(16u64));
        let p = modulus::<Fr>();
        let overflow = parse_field_element::<Fr>(&p.to_string());
        assert!(matches!(overflow, Err(FieldError::CoefficientOverflow { .. })));
        let max = parse_field_element::<Fr>(&(p - 1u32).to_string()).unwrap();
        assert_eq!(max, -Fr::from(1u64));
        assert!(matches!(parse_field_element::<Fr>("0x"), Err(FieldError::Parse { .. })));
        assert!(matches!(parse_field_element::<Fr>("12z"), Err(FieldError::Parse { .. })));
    }

    #[test]
    fn hex_rendering_round_trips() {
        let x = Fr::from(0xdead_beefu64);
        assert_eq!(to_hex(&x), "0xdeadbeef");
        assert_eq!(parse_field_element::<Fr>(&to_hex(&x)).unwrap(), x);
    }
}
