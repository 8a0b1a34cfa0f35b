//! Shamir secret sharing over GF(2^8).
//!
//! Each byte of the secret is the constant term of an independent random
//! polynomial of degree `threshold - 1`. Share `x` holds the evaluations at
//! `x` (1..=255). Any `threshold` shares recover the secret by Lagrange
//! interpolation at zero; fewer reveal nothing.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SealError};

/// One share of a split secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    /// Evaluation point, never zero.
    pub index: u8,
    pub value: Vec<u8>,
}

/// Multiply in GF(2^8) with the AES reduction polynomial x^8 + x^4 + x^3 + x + 1.
fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0u8;
    while b != 0 {
        if b & 1 != 0 {
            product ^= a;
        }
        let carry = a & 0x80;
        a <<= 1;
        if carry != 0 {
            a ^= 0x1b;
        }
        b >>= 1;
    }
    product
}

/// Multiplicative inverse; `a^254 = a^-1` since the group has order 255.
fn gf_inv(a: u8) -> u8 {
    let mut result = 1u8;
    let mut base = a;
    let mut exp = 254u8;
    while exp != 0 {
        if exp & 1 != 0 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    result
}

/// Horner evaluation; `coefficients[0]` is the constant term.
fn eval(coefficients: &[u8], x: u8) -> u8 {
    coefficients
        .iter()
        .rev()
        .fold(0u8, |acc, &c| gf_mul(acc, x) ^ c)
}

/// Split `secret` into `shares` shares, any `threshold` of which recover it.
pub fn split(secret: &[u8], threshold: u8, shares: u8) -> Result<Vec<Share>> {
    if threshold == 0 || threshold > shares {
        return Err(SealError::InvalidThreshold { threshold, shares });
    }

    let mut rng = rand::thread_rng();
    let mut out: Vec<Share> = (1..=shares)
        .map(|index| Share {
            index,
            value: Vec::with_capacity(secret.len()),
        })
        .collect();

    let mut coefficients = vec![0u8; threshold as usize];
    for &byte in secret {
        coefficients[0] = byte;
        rng.fill_bytes(&mut coefficients[1..]);
        for share in out.iter_mut() {
            share.value.push(eval(&coefficients, share.index));
        }
    }
    Ok(out)
}

/// Recover the secret from at least `threshold` distinct shares.
///
/// Combining fewer shares than the split threshold yields garbage rather
/// than an error; callers authenticate the result.
pub fn combine(shares: &[Share]) -> Result<Vec<u8>> {
    let first = shares
        .first()
        .ok_or_else(|| SealError::InvalidShares("no shares".into()))?;
    let len = first.value.len();

    for (i, share) in shares.iter().enumerate() {
        if share.index == 0 {
            return Err(SealError::InvalidShares("share index 0".into()));
        }
        if share.value.len() != len {
            return Err(SealError::InvalidShares("share lengths differ".into()));
        }
        if shares[..i].iter().any(|s| s.index == share.index) {
            return Err(SealError::InvalidShares(format!(
                "duplicate share index {}",
                share.index
            )));
        }
    }

    // Lagrange basis at zero: l_i = prod_{j != i} x_j / (x_j - x_i); subtraction is xor.
    let basis: Vec<u8> = shares
        .iter()
        .map(|si| {
            shares
                .iter()
                .filter(|sj| sj.index != si.index)
                .fold(1u8, |acc, sj| {
                    gf_mul(acc, gf_mul(sj.index, gf_inv(sj.index ^ si.index)))
                })
        })
        .collect();

    Ok((0..len)
        .map(|pos| {
            shares
                .iter()
                .zip(&basis)
                .fold(0u8, |acc, (share, &l)| acc ^ gf_mul(share.value[pos], l))
        })
        .collect())
}
