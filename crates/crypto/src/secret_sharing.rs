//! Shamir-style (t, n) threshold secret sharing.
//!
//! A secret is embedded as the constant term of a random degree `t - 1`
//! polynomial over a fixed prime field; share `i` is the polynomial
//! evaluated at `x = i` (1-indexed). Any `t` shares reconstruct the secret
//! by Lagrange interpolation at zero; fewer reveal nothing.
//!
//! All residues are normalized into `[0, prime)` via floored modulo, so a
//! negative intermediate from signed arithmetic can never leak a sign into
//! a share or a reconstruction.

use num_bigint::{BigInt, BigUint, RandBigInt, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::RngCore;
use thiserror::Error;

/// Errors from splitting or reconstructing secrets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretSharingError {
    /// Threshold is zero or exceeds the share count.
    #[error("invalid threshold {threshold} for {n} shares")]
    InvalidThreshold {
        /// Requested threshold.
        threshold: usize,
        /// Total share count.
        n: usize,
    },

    /// Not enough shares to reach the threshold.
    #[error("{available} shares available, threshold is {threshold}")]
    InsufficientShares {
        /// Shares supplied.
        available: usize,
        /// Required threshold.
        threshold: usize,
    },

    /// Two shares carry the same evaluation point.
    #[error("duplicate share index {0}")]
    DuplicateIndex(u32),

    /// A share index of zero would disclose the secret directly.
    #[error("share index must be non-zero")]
    ZeroIndex,
}

/// One share of a split secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretShare {
    /// Evaluation point, 1..=n. Aligned with the receiving miner's order.
    pub index: u32,
    /// Big-endian field element bytes.
    pub value: Vec<u8>,
}

/// The sharing field modulus: the 13th Mersenne prime, 2^521 - 1.
///
/// Any 32-byte secret is strictly smaller than the modulus, so embedding is
/// injective.
pub fn field_prime() -> BigUint {
    (BigUint::one() << 521u32) - BigUint::one()
}

/// Split `secret` into `n` shares with reconstruction threshold `threshold`.
pub fn split(
    secret: &[u8],
    n: usize,
    threshold: usize,
    rng: &mut impl RngCore,
) -> Result<Vec<SecretShare>, SecretSharingError> {
    if threshold == 0 || threshold > n {
        return Err(SecretSharingError::InvalidThreshold { threshold, n });
    }

    let prime = field_prime();
    let embedded = BigUint::from_bytes_be(secret) % &prime;

    // f(x) = secret + a_1 x + ... + a_{t-1} x^{t-1}
    let mut coefficients = Vec::with_capacity(threshold);
    coefficients.push(embedded);
    for _ in 1..threshold {
        coefficients.push(rng.gen_biguint_below(&prime));
    }

    let mut shares = Vec::with_capacity(n);
    for i in 1..=n {
        let x = BigUint::from(i);
        let mut value = BigUint::zero();
        let mut x_power = BigUint::one();
        for coefficient in &coefficients {
            value = (value + coefficient * &x_power) % &prime;
            x_power = (x_power * &x) % &prime;
        }
        shares.push(SecretShare {
            index: i as u32,
            value: value.to_bytes_be(),
        });
    }

    Ok(shares)
}

/// Reconstruct a secret from any `threshold`-sized subset of shares.
///
/// Extra shares beyond the threshold are ignored; the first `threshold`
/// distinct evaluation points are interpolated. Returns the secret's
/// big-endian bytes without leading zeros; callers that stored fixed-width
/// secrets pad back to width themselves.
pub fn reconstruct(
    shares: &[SecretShare],
    threshold: usize,
) -> Result<Vec<u8>, SecretSharingError> {
    if threshold == 0 {
        return Err(SecretSharingError::InvalidThreshold {
            threshold,
            n: shares.len(),
        });
    }
    if shares.len() < threshold {
        return Err(SecretSharingError::InsufficientShares {
            available: shares.len(),
            threshold,
        });
    }

    let prime = BigInt::from_biguint(Sign::Plus, field_prime());

    let mut points: Vec<(BigInt, BigInt)> = Vec::with_capacity(threshold);
    for share in shares {
        if share.index == 0 {
            return Err(SecretSharingError::ZeroIndex);
        }
        let x = BigInt::from(share.index);
        if points.iter().any(|(seen, _)| *seen == x) {
            return Err(SecretSharingError::DuplicateIndex(share.index));
        }
        let y = BigInt::from_biguint(Sign::Plus, BigUint::from_bytes_be(&share.value));
        points.push((x, y));
        if points.len() == threshold {
            break;
        }
    }
    if points.len() < threshold {
        return Err(SecretSharingError::InsufficientShares {
            available: points.len(),
            threshold,
        });
    }

    // Lagrange interpolation at x = 0.
    let mut secret = BigInt::zero();
    for (j, (xj, yj)) in points.iter().enumerate() {
        let mut numerator = BigInt::one();
        let mut denominator = BigInt::one();
        for (m, (xm, _)) in points.iter().enumerate() {
            if m == j {
                continue;
            }
            numerator = (numerator * xm).mod_floor(&prime);
            denominator = (denominator * (xm - xj)).mod_floor(&prime);
        }
        let inverse = mod_inverse(&denominator, &prime)
            .expect("field modulus is prime, non-zero residues are invertible");
        let term = ((yj * numerator).mod_floor(&prime) * inverse).mod_floor(&prime);
        secret = (secret + term).mod_floor(&prime);
    }

    Ok(secret.to_biguint().expect("mod_floor yields non-negative").to_bytes_be())
}

/// Modular inverse via the extended Euclidean algorithm.
///
/// Returns None when `a` and `modulus` are not coprime.
fn mod_inverse(a: &BigInt, modulus: &BigInt) -> Option<BigInt> {
    let a = a.mod_floor(modulus);
    if a.is_zero() {
        return None;
    }

    let (mut old_r, mut r) = (a, modulus.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());

    while !r.is_zero() {
        let quotient = &old_r / &r;
        let next_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &quotient * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }

    if !old_r.is_one() {
        return None;
    }
    Some(old_s.mod_floor(modulus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(7)
    }

    fn pad32(bytes: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(bytes);
        out
    }

    #[test]
    fn test_roundtrip_with_all_shares() {
        let secret = [0xabu8; 32];
        let shares = split(&secret, 5, 3, &mut rng()).unwrap();
        assert_eq!(shares.len(), 5);

        let recovered = reconstruct(&shares, 3).unwrap();
        assert_eq!(pad32(&recovered), secret);
    }

    #[test]
    fn test_any_threshold_subset_reconstructs() {
        // Shares {1, 3, 5} of a (3, 5) split must suffice — never all n.
        let secret = blake3::hash(b"round secret");
        let shares = split(secret.as_bytes(), 5, 3, &mut rng()).unwrap();

        let subset = vec![shares[0].clone(), shares[2].clone(), shares[4].clone()];
        let recovered = reconstruct(&subset, 3).unwrap();
        assert_eq!(&pad32(&recovered), secret.as_bytes());
    }

    #[test]
    fn test_below_threshold_is_unavailable() {
        let secret = [0x55u8; 32];
        let shares = split(&secret, 5, 3, &mut rng()).unwrap();

        let subset = vec![shares[0].clone(), shares[2].clone()];
        assert_eq!(
            reconstruct(&subset, 3),
            Err(SecretSharingError::InsufficientShares {
                available: 2,
                threshold: 3,
            })
        );
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let secret = [1u8; 32];
        let shares = split(&secret, 4, 2, &mut rng()).unwrap();
        let dup = vec![shares[0].clone(), shares[0].clone()];
        assert_eq!(
            reconstruct(&dup, 2),
            Err(SecretSharingError::DuplicateIndex(1))
        );
    }

    #[test]
    fn test_invalid_thresholds() {
        let secret = [1u8; 32];
        assert!(split(&secret, 5, 0, &mut rng()).is_err());
        assert!(split(&secret, 5, 6, &mut rng()).is_err());
    }

    #[test]
    fn test_exact_threshold_of_large_committee() {
        // ceil(2 * 17 / 3) = 12 shares of a (12, 17) split.
        let secret = blake3::hash(b"seventeen");
        let shares = split(secret.as_bytes(), 17, 12, &mut rng()).unwrap();
        let subset: Vec<_> = shares.into_iter().skip(5).collect();
        assert_eq!(subset.len(), 12);

        let recovered = reconstruct(&subset, 12).unwrap();
        assert_eq!(&pad32(&recovered), secret.as_bytes());
    }

    #[test]
    fn test_mod_inverse() {
        let p = BigInt::from(17);
        for value in 1..17 {
            let a = BigInt::from(value);
            let inv = mod_inverse(&a, &p).unwrap();
            assert_eq!((a * inv).mod_floor(&p), BigInt::one());
        }
        assert!(mod_inverse(&BigInt::zero(), &p).is_none());
    }
}
