//! Shamir secret sharing over GF(256).
//!
//! A 32-byte content key is split byte-wise into `total` shares, any
//! `threshold` of which reconstruct it. Share ids are 1-indexed; x = 0 is the
//! secret itself.

use std::collections::HashSet;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SealError};

/// A share identifier (1 to N).
pub type ShareId = u8;

/// One share of a 32-byte secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub id: ShareId,
    pub value: [u8; 32],
}

impl Share {
    pub fn new(id: ShareId, value: [u8; 32]) -> Self {
        Self { id, value }
    }

    pub fn from_slice(id: ShareId, bytes: &[u8]) -> Result<Self> {
        let value: [u8; 32] = bytes.try_into().map_err(|_| {
            SealError::InvalidShare(format!("share must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self { id, value })
    }
}

/// Arithmetic in GF(2^8) with the AES polynomial.
mod gf256 {
    pub fn mul(a: u8, b: u8) -> u8 {
        let mut result: u8 = 0;
        let mut a = a;
        let mut b = b;

        while b != 0 {
            if b & 1 != 0 {
                result ^= a;
            }
            let hi = a & 0x80;
            a <<= 1;
            if hi != 0 {
                a ^= 0x1b;
            }
            b >>= 1;
        }
        result
    }

    /// a^254 = a^-1, since a^255 = 1 for non-zero a.
    pub fn inv(a: u8) -> u8 {
        if a == 0 {
            return 0;
        }
        let mut result = 1u8;
        let mut base = a;
        let mut exp = 254u8;
        while exp != 0 {
            if exp & 1 != 0 {
                result = mul(result, base);
            }
            base = mul(base, base);
            exp >>= 1;
        }
        result
    }

    pub fn div(a: u8, b: u8) -> u8 {
        mul(a, inv(b))
    }
}

/// Split `secret` into `total` shares, any `threshold` of which recover it.
pub fn split_secret(secret: &[u8; 32], threshold: usize, total: usize) -> Result<Vec<Share>> {
    if threshold == 0 || threshold > total || total > 255 {
        return Err(SealError::InvalidThreshold { threshold, total });
    }

    let mut rng = rand::thread_rng();
    let mut shares: Vec<Share> = (1..=total as u8)
        .map(|id| Share::new(id, [0u8; 32]))
        .collect();

    let mut coeffs = vec![0u8; threshold];
    for (byte_idx, secret_byte) in secret.iter().enumerate() {
        // f(x) = secret + a1*x + ... + a_{k-1}*x^{k-1}
        coeffs[0] = *secret_byte;
        rng.fill_bytes(&mut coeffs[1..]);

        for share in shares.iter_mut() {
            let x = share.id;
            let mut y = coeffs[0];
            let mut x_pow = x;
            for coeff in coeffs.iter().skip(1) {
                y ^= gf256::mul(*coeff, x_pow);
                x_pow = gf256::mul(x_pow, x);
            }
            share.value[byte_idx] = y;
        }
    }

    Ok(shares)
}

/// Recover the secret from at least `threshold` distinct shares.
///
/// Extra shares beyond `threshold` are ignored.
pub fn combine_shares(shares: &[Share], threshold: usize) -> Result<[u8; 32]> {
    if threshold == 0 {
        return Err(SealError::InvalidThreshold {
            threshold,
            total: shares.len(),
        });
    }
    if shares.len() < threshold {
        return Err(SealError::InsufficientShares {
            got: shares.len(),
            need: threshold,
        });
    }

    let shares = &shares[..threshold];
    let mut seen = HashSet::new();
    for share in shares {
        if share.id == 0 || !seen.insert(share.id) {
            return Err(SealError::InvalidShare(format!(
                "share id {} is zero or repeated",
                share.id
            )));
        }
    }

    let mut secret = [0u8; 32];
    for (byte_idx, out) in secret.iter_mut().enumerate() {
        let mut result: u8 = 0;
        for (i, share_i) in shares.iter().enumerate() {
            let xi = share_i.id;
            // Lagrange basis at 0: prod xj / (xi - xj), subtraction is xor.
            let mut numerator: u8 = 1;
            let mut denominator: u8 = 1;
            for (j, share_j) in shares.iter().enumerate() {
                if i != j {
                    numerator = gf256::mul(numerator, share_j.id);
                    denominator = gf256::mul(denominator, xi ^ share_j.id);
                }
            }
            result ^= gf256::mul(share_i.value[byte_idx], gf256::div(numerator, denominator));
        }
        *out = result;
    }

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_gf256_inverse() {
        for a in 1..=255u8 {
            assert_eq!(gf256::mul(a, gf256::inv(a)), 1, "a = {a}");
        }
    }

    #[test]
    fn test_one_of_one_is_the_secret() {
        let secret = [0x42u8; 32];
        let shares = split_secret(&secret, 1, 1).unwrap();
        assert_eq!(shares[0].value, secret);
        assert_eq!(combine_shares(&shares, 1).unwrap(), secret);
    }

    #[test]
    fn test_any_subset_recovers() {
        let secret = *blake3::hash(b"content key").as_bytes();
        let shares = split_secret(&secret, 2, 3).unwrap();
        for pair in [[0, 1], [0, 2], [1, 2], [2, 0]] {
            let subset = vec![shares[pair[0]].clone(), shares[pair[1]].clone()];
            assert_eq!(combine_shares(&subset, 2).unwrap(), secret);
        }
    }

    #[test]
    fn test_below_threshold_fails() {
        let shares = split_secret(&[7u8; 32], 3, 5).unwrap();
        assert!(matches!(
            combine_shares(&shares[..2], 3),
            Err(SealError::InsufficientShares { got: 2, need: 3 })
        ));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(split_secret(&[0u8; 32], 0, 3).is_err());
        assert!(split_secret(&[0u8; 32], 4, 3).is_err());
        assert!(split_secret(&[0u8; 32], 2, 256).is_err());
    }

    #[test]
    fn test_repeated_share_rejected() {
        let shares = split_secret(&[9u8; 32], 2, 3).unwrap();
        let dup = vec![shares[0].clone(), shares[0].clone()];
        assert!(matches!(combine_shares(&dup, 2), Err(SealError::InvalidShare(_))));
    }

    proptest! {
        #[test]
        fn split_then_combine(
            secret in any::<[u8; 32]>(),
            (threshold, total) in (1usize..6).prop_flat_map(|k| (Just(k), k..8)),
        ) {
            let shares = split_secret(&secret, threshold, total).unwrap();
            prop_assert_eq!(shares.len(), total);
            let tail = &shares[total - threshold..];
            prop_assert_eq!(combine_shares(tail, threshold).unwrap(), secret);
        }
    }
}
