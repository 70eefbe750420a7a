// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! EMSA-PKCS1-v1.5 message encoding (RFC 8017 §9.2).

use crate::errors::CryptoError;

/// The hash function a PKCS#1 v1.5 signature commits to.
///
/// The protocol pins SHA-1; the enum exists so the padding layer names its
/// algorithm explicitly rather than hard-coding prefix bytes at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
}

impl DigestAlgorithm {
    /// Expected digest length in bytes.
    pub const fn digest_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
        }
    }

    /// DER encoding of the DigestInfo header for this algorithm.
    const fn der_prefix(self) -> &'static [u8] {
        match self {
            DigestAlgorithm::Sha1 => &[
                0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00,
                0x04, 0x14,
            ],
        }
    }
}

/// Encode `digest` into a `k`-byte block: `00 01 FF…FF 00 DigestInfo digest`.
pub(crate) fn emsa_pkcs1_v15(
    algorithm: DigestAlgorithm,
    digest: &[u8],
    k: usize,
) -> Result<Vec<u8>, CryptoError> {
    if digest.len() != algorithm.digest_len() {
        return Err(CryptoError::DigestLength);
    }
    let t_len = algorithm.der_prefix().len() + digest.len();
    // At least eight bytes of padding, per RFC 8017.
    if k < t_len + 11 {
        return Err(CryptoError::ModulusTooSmall);
    }
    let mut em = Vec::with_capacity(k);
    em.push(0x00);
    em.push(0x01);
    em.resize(k - t_len - 1, 0xff);
    em.push(0x00);
    em.extend_from_slice(algorithm.der_prefix());
    em.extend_from_slice(digest);
    Ok(em)
}
