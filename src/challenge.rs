// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Self-authenticating challenges.
//!
//! A verifier issues a challenge to any client that asks; the client later
//! presents it back inside a signed auth request. Nothing is stored server
//! side: the challenge carries its own issue time, the client address it was
//! issued to, fresh randomness, and an HMAC over all of that under the
//! verifier's secret. Validation re-derives the HMAC and checks that the
//! challenge is being replayed by the same address inside its validity
//! window.

use std::net::{IpAddr, Ipv6Addr};

use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use sha1::Sha1;

use crate::{
    buffer::Buffer,
    errors::{ChallengeError, CodecError, CryptoError},
    timestamp::Timestamp,
};

type HmacSha1 = Hmac<Sha1>;

/// Challenge format version this library issues and accepts.
pub const CHALLENGE_VERSION: u8 = 3;

/// Length of the random field, in bytes.
pub const RANDOM_SIZE: usize = 32;

/// How long after issue a challenge stays valid.
const MAX_AGE_MS: u64 = 5 * 60 * 1000;

/// Clock-skew allowance for challenges stamped in the future.
const MAX_SKEW_MS: u64 = 30 * 1000;

/// A decoded challenge token.
///
/// `client_ip` is `None` when the wire encoding carried an unknown address
/// family tag; such a token can never validate against a real peer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    version: u8,
    timestamp: Timestamp,
    client_ip: Option<IpAddr>,
    random: Vec<u8>,
    digest: Vec<u8>,
}

impl Challenge {
    /// Issue a fresh challenge bound to `client_ip` at the current time.
    pub fn issue<R: RngCore + CryptoRng>(
        secret: &[u8],
        client_ip: IpAddr,
        rng: &mut R,
    ) -> Result<String, CryptoError> {
        Self::issue_at(secret, client_ip, Timestamp::now(), rng)
    }

    /// Issue a fresh challenge stamped with the supplied time.
    pub fn issue_at<R: RngCore + CryptoRng>(
        secret: &[u8],
        client_ip: IpAddr,
        now: Timestamp,
        rng: &mut R,
    ) -> Result<String, CryptoError> {
        let mut random = vec![0u8; RANDOM_SIZE];
        rng.try_fill_bytes(&mut random)
            .map_err(|_| CryptoError::RandomSource)?;

        let mut challenge = Challenge {
            version: CHALLENGE_VERSION,
            timestamp: now,
            client_ip: Some(client_ip),
            random,
            digest: Vec::new(),
        };
        challenge.digest = challenge.expected_digest(secret);
        Ok(challenge.to_base64())
    }

    /// Validate a presented challenge against the current time.
    pub fn validate(
        secret: &[u8],
        text: &str,
        client_ip: IpAddr,
    ) -> Result<Challenge, Vec<ChallengeError>> {
        Self::validate_at(secret, text, client_ip, Timestamp::now())
    }

    /// Validate a presented challenge at the supplied time.
    ///
    /// All semantic failures are accumulated and reported together, with two
    /// exceptions that preempt the rest: a token that does not decode yields
    /// only its codec error, and a token for a different format version
    /// yields only the version mismatch (none of the other checks mean
    /// anything across versions).
    pub fn validate_at(
        secret: &[u8],
        text: &str,
        client_ip: IpAddr,
        now: Timestamp,
    ) -> Result<Challenge, Vec<ChallengeError>> {
        let challenge = Self::scan(text).map_err(|e| vec![ChallengeError::Codec(e)])?;

        if challenge.version != CHALLENGE_VERSION {
            return Err(vec![ChallengeError::VersionMismatch]);
        }

        let mut errors = Vec::new();
        // Saturating arithmetic: the stamped value comes off the wire and
        // may sit anywhere in the u64 range.
        let stamped = challenge.timestamp.as_millis();
        if stamped > now.as_millis().saturating_add(MAX_SKEW_MS) {
            errors.push(ChallengeError::TooNew);
        }
        if stamped.saturating_add(MAX_AGE_MS) < now.as_millis() {
            errors.push(ChallengeError::TooOld);
        }
        match challenge.client_ip {
            Some(bound) if ips_equal(bound, client_ip) => {}
            _ => errors.push(ChallengeError::IpMismatch),
        }
        if challenge.random.len() != RANDOM_SIZE {
            errors.push(ChallengeError::RandomMismatch);
        }
        if !challenge.digest_matches(secret) {
            errors.push(ChallengeError::HmacMismatch);
        }

        if errors.is_empty() {
            Ok(challenge)
        } else {
            Err(errors)
        }
    }

    fn scan(text: &str) -> Result<Challenge, CodecError> {
        let mut b = Buffer::from_base64(text);
        let version = b.scan_u8();
        let timestamp = b.scan_timestamp();
        let client_ip = b.scan_ip();
        let random = b.scan_var_bytes();
        let digest = b.scan_var_bytes();
        b.assert_eof();
        b.ok()?;

        Ok(Challenge {
            version,
            timestamp,
            client_ip,
            random,
            digest,
        })
    }

    /// Re-encode the token. The digest is emitted as carried, so a scanned
    /// challenge always round-trips byte-identically.
    pub fn to_base64(&self) -> String {
        let mut b = self.unsigned_buffer();
        b.add_var_bytes(&self.digest);
        b.to_base64()
    }

    /// The issue time stamped into the token.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// The client address the token was issued to.
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    fn unsigned_buffer(&self) -> Buffer {
        let mut b = Buffer::new();
        b.add_u8(self.version);
        b.add_timestamp(self.timestamp);
        if let Some(ip) = self.client_ip {
            b.add_ip(ip);
        }
        b.add_var_bytes(&self.random);
        b
    }

    fn mac(&self, secret: &[u8]) -> HmacSha1 {
        let mut mac =
            HmacSha1::new_from_slice(secret).expect("hmac accepts keys of any length");
        mac.update(self.unsigned_buffer().raw());
        mac
    }

    fn expected_digest(&self, secret: &[u8]) -> Vec<u8> {
        self.mac(secret).finalize().into_bytes().to_vec()
    }

    fn digest_matches(&self, secret: &[u8]) -> bool {
        self.mac(secret).verify_slice(&self.digest).is_ok()
    }
}

/// Compare two addresses in their 16-byte forms, so `::ffff:a.b.c.d` and
/// `a.b.c.d` are the same peer.
fn ips_equal(a: IpAddr, b: IpAddr) -> bool {
    canonical(a) == canonical(b)
}

fn canonical(ip: IpAddr) -> Ipv6Addr {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    }
}
