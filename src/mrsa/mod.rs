// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Multi-party RSA arithmetic.
//!
//! The private exponent `d` of an ordinary RSA keypair is split into two
//! additive shares with `d₁ + d₂ ≡ d (mod φ(N))`. A signature over a padded
//! representative `m` is then produced cooperatively: each holder applies its
//! share as one modular exponentiation, `m^{d₁}` then `(m^{d₁})^{d₂}`, and
//! the composition equals `m^d mod N` without the full exponent ever
//! existing in one place. Addition in the exponent is commutative, so the
//! order in which shares are applied does not change the result.
//!
//! This module is pure arithmetic over [`BigNumber`]; the key objects that
//! carry shares across processes live in [`crate::keys`].

use constant_time_eq::constant_time_eq;
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use tracing::error;

use crate::errors::CryptoError;

mod pkcs1;

pub use pkcs1::DigestAlgorithm;

/// The public exponent shared by every key this protocol produces.
pub const PUBLIC_EXPONENT: u64 = 65537;

/// Modulus size, in bits, of generated keypairs.
pub const KEY_BITS: usize = 2048;

/// Bound on re-draws during key generation before giving up.
pub(crate) const GENERATION_RETRY_MAX: usize = 500;

/// Generate a fresh RSA modulus and return `(n, d₁, d₂)` where the two
/// shares sum to the private exponent modulo `φ(n)`.
///
/// The first share is drawn uniformly from `[1, φ(n))` and the second is the
/// remainder, so neither share alone carries any information about `d`.
pub(crate) fn generate_split_exponents<R: RngCore + CryptoRng>(
    bits: usize,
    rng: &mut R,
) -> Result<(BigNumber, BigNumber, BigNumber), CryptoError> {
    let e = BigNumber::from(PUBLIC_EXPONENT);
    for _ in 0..GENERATION_RETRY_MAX {
        let p = BigNumber::prime(bits / 2);
        let q = BigNumber::prime(bits / 2);
        if p == q {
            continue;
        }
        let n = &p * &q;
        let totient = (&p - 1) * (&q - 1);
        // e must be invertible mod φ(n) for the keypair to exist at all.
        let d = match e.invert(&totient) {
            Some(d) => d,
            None => continue,
        };
        let d1 = BigNumber::from_rng(&totient, rng);
        if d1 == BigNumber::zero() {
            continue;
        }
        let d2 = (&d - &d1).nmod(&totient);
        if d2 == BigNumber::zero() {
            continue;
        }
        return Ok((n, d1, d2));
    }
    error!("failed to generate an rsa keypair after {GENERATION_RETRY_MAX} attempts");
    Err(CryptoError::KeyGeneration)
}

/// Apply one exponent share to a representative: `c^d mod n`.
///
/// `c` must already be reduced; a representative outside `[0, n)` is a
/// protocol violation, not something to silently wrap.
pub(crate) fn partial_decrypt(
    d: &BigNumber,
    n: &BigNumber,
    c: &BigNumber,
) -> Result<BigNumber, CryptoError> {
    if c < &BigNumber::zero() || c >= n {
        return Err(CryptoError::InputOutOfRange);
    }
    Ok(c.modpow(d, n))
}

/// The length in bytes of a signature under the modulus `n`.
pub(crate) fn modulus_len(n: &BigNumber) -> usize {
    let bytes = n.to_bytes();
    let leading = bytes.iter().take_while(|b| **b == 0).count();
    bytes.len() - leading
}

/// Big-endian encoding of `x`, left-padded with zeros to exactly `len`
/// bytes.
pub(crate) fn i2osp(x: &BigNumber, len: usize) -> Vec<u8> {
    let bytes = x.to_bytes();
    let leading = bytes.iter().take_while(|b| **b == 0).count();
    let trimmed = &bytes[leading..];
    if trimmed.len() >= len {
        return trimmed.to_vec();
    }
    let mut out = vec![0u8; len - trimmed.len()];
    out.extend_from_slice(trimmed);
    out
}

/// PKCS#1 v1.5 pad a digest to the width of `n` and lift it to the
/// representative the signing loop starts from.
pub(crate) fn pad_digest(
    n: &BigNumber,
    algorithm: DigestAlgorithm,
    digest: &[u8],
) -> Result<BigNumber, CryptoError> {
    let em = pkcs1::emsa_pkcs1_v15(algorithm, digest, modulus_len(n))?;
    Ok(BigNumber::from_slice(&em))
}

/// Turn a fully accumulated representative into signature bytes.
///
/// `accumulated` is `m^{d₁ + d₂ + …} mod n` after every share has been
/// applied. Raising it back by the public exponent must recover the padded
/// digest, or the bytes are not a signature and are not emitted.
pub(crate) fn finalize_signature(
    n: &BigNumber,
    algorithm: DigestAlgorithm,
    digest: &[u8],
    accumulated: &BigNumber,
) -> Result<Vec<u8>, CryptoError> {
    let k = modulus_len(n);
    let em = pkcs1::emsa_pkcs1_v15(algorithm, digest, k)?;
    let e = BigNumber::from(PUBLIC_EXPONENT);
    // Constant-time comparison over the fixed-width encodings.
    let recovered = i2osp(&accumulated.modpow(&e, n), k);
    if !constant_time_eq(&recovered, &em) {
        error!("accumulated threshold signature does not match the padded digest");
        return Err(CryptoError::SignatureMismatch);
    }
    Ok(i2osp(accumulated, k))
}

/// RSASSA-PKCS1-v1.5 verification of `signature` over `digest`.
pub(crate) fn verify_pkcs1_v15(
    n: &BigNumber,
    algorithm: DigestAlgorithm,
    digest: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let k = modulus_len(n);
    if signature.len() != k {
        return Err(CryptoError::SignatureMismatch);
    }
    let s = BigNumber::from_slice(signature);
    if &s >= n {
        return Err(CryptoError::SignatureMismatch);
    }
    let em = pkcs1::emsa_pkcs1_v15(algorithm, digest, k)?;
    let e = BigNumber::from(PUBLIC_EXPONENT);
    let recovered = i2osp(&s.modpow(&e, n), k);
    if !constant_time_eq(&recovered, &em) {
        return Err(CryptoError::SignatureMismatch);
    }
    Ok(())
}
