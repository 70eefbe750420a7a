// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use std::fmt::{self, Debug};

use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    buffer::Buffer,
    errors::{CryptoError, FormatError},
    mrsa::{self, DigestAlgorithm, PUBLIC_EXPONENT},
};

/// Key-type tag carried in the wire encoding and the one-line text form.
pub const PUBLIC_KEY_TYPE: &str = "ssh-rsa";

/// The public half `(e, N)` of a split keypair. The exponent is pinned to
/// 65537, so only the modulus is stored.
#[derive(Clone, PartialEq, Eq, Zeroize, Serialize, Deserialize)]
pub struct PublicKey {
    n: BigNumber,
}

impl PublicKey {
    pub(crate) fn from_modulus(n: BigNumber) -> Self {
        PublicKey { n }
    }

    /// The modulus `N`.
    pub fn modulus(&self) -> &BigNumber {
        &self.n
    }

    /// Parse the one-line `ssh-rsa <base64>` form.
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let text = text.trim();
        let rest = text
            .strip_prefix(PUBLIC_KEY_TYPE)
            .ok_or(FormatError::PublicKey)?;

        let mut b = Buffer::from_base64(rest.trim());
        let key = Self::read_buffer(&mut b)?;
        b.assert_eof();
        b.ok()?;
        Ok(key)
    }

    /// The one-line text form, `ssh-rsa <base64>` with a trailing newline.
    pub fn to_text(&self) -> String {
        let mut b = Buffer::new();
        self.write_buffer(&mut b);
        format!("{PUBLIC_KEY_TYPE} {}\n", b.to_base64())
    }

    /// Append the wire form `string(tag) ‖ mpint(e) ‖ mpint(N)`.
    pub(crate) fn write_buffer(&self, b: &mut Buffer) {
        b.add_string(PUBLIC_KEY_TYPE);
        b.add_mpint(&BigNumber::from(PUBLIC_EXPONENT));
        b.add_mpint(&self.n);
    }

    /// Scan the wire form, insisting on the tag and the pinned exponent.
    pub(crate) fn read_buffer(b: &mut Buffer) -> Result<Self, FormatError> {
        let tag = b.scan_string();
        let e = b.scan_mpint();
        let n = b.scan_mpint();
        b.ok()?;

        if tag != PUBLIC_KEY_TYPE {
            return Err(FormatError::PublicKey);
        }
        if e != BigNumber::from(PUBLIC_EXPONENT) {
            return Err(FormatError::PublicKey);
        }
        Ok(PublicKey { n })
    }

    /// Check an RSASSA-PKCS1-v1.5 signature over `digest`.
    pub fn verify_pkcs1_v15(
        &self,
        algorithm: DigestAlgorithm,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        mrsa::verify_pkcs1_v15(&self.n, algorithm, digest, signature)
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("e", &PUBLIC_EXPONENT)
            .field("n", &self.n)
            .finish()
    }
}
