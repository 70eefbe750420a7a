// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The signed authentication request.
//!
//! The client serializes the challenge it was issued together with the
//! request URL, its username, the fixed service/method/algorithm names, and
//! its full public key; hashes that payload with SHA-1; signs the digest
//! through a threshold-signing session; and appends the signature. The
//! server re-derives the payload from the parsed request and verifies the
//! signature under the embedded key. Binding the whole public key wire form
//! into the payload means no field, the identity included, can be swapped
//! after signing.

use sha1::{Digest, Sha1};

use crate::{
    buffer::Buffer,
    errors::{CryptoError, Error, FormatError, Result},
    keys::PublicKey,
    mrsa::DigestAlgorithm,
};

/// Service name bound into every auth request.
pub const SERVICE_NAME: &str = "octokey-auth";

/// Authentication method bound into every auth request.
pub const AUTH_METHOD: &str = "publickey";

/// Signing algorithm identifier bound into every auth request.
pub const SIGNING_ALGORITHM: &str = "ssh-rsa";

/// The capability to produce PKCS#1 v1.5 signatures for an identity.
///
/// Implemented by [`SessionSigner`](crate::session::SessionSigner), which
/// signs through an ordered set of key-share holders.
pub trait Signer {
    fn public_key(&self) -> &PublicKey;
    fn username(&self) -> &str;
    fn sign_pkcs1_v15(&self, algorithm: DigestAlgorithm, digest: &[u8]) -> Result<Vec<u8>>;
}

/// An authentication request, signed or awaiting signature.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    challenge: Buffer,
    request_url: String,
    username: String,
    service_name: String,
    auth_method: String,
    signing_algorithm: String,
    public_key: Option<PublicKey>,
    signature: Vec<u8>,
}

impl AuthRequest {
    /// Start a request answering `challenge` (base-64, as issued) for the
    /// given URL and username.
    pub fn new(
        challenge: &str,
        request_url: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        AuthRequest {
            challenge: Buffer::from_base64(challenge),
            request_url: request_url.into(),
            username: username.into(),
            service_name: SERVICE_NAME.to_owned(),
            auth_method: AUTH_METHOD.to_owned(),
            signing_algorithm: SIGNING_ALGORITHM.to_owned(),
            public_key: None,
            signature: Vec::new(),
        }
    }

    /// Answer a challenge in one step: build the request and sign it.
    pub fn sign_challenge(
        challenge: &str,
        request_url: impl Into<String>,
        signer: &dyn Signer,
    ) -> Result<String> {
        let mut request = AuthRequest::new(challenge, request_url, signer.username());
        request.sign(signer)
    }

    /// Sign the request and return its base-64 text form.
    pub fn sign(&mut self, signer: &dyn Signer) -> Result<String> {
        self.challenge.ok().map_err(Error::Codec)?;
        self.public_key = Some(signer.public_key().clone());

        let mut b = self.unsigned_buffer();
        b.ok().map_err(Error::Codec)?;

        let digest = Sha1::digest(b.raw());
        let signature = signer.sign_pkcs1_v15(DigestAlgorithm::Sha1, &digest)?;

        b.add_var_bytes(&signature);
        b.ok().map_err(Error::Codec)?;

        self.signature = signature;
        Ok(b.to_base64())
    }

    /// Parse a signed request from its base-64 text form.
    pub fn from_base64(text: &str) -> std::result::Result<Self, FormatError> {
        let mut b = Buffer::from_base64(text.trim());
        let challenge = b.scan_buffer();
        let request_url = b.scan_string();
        let username = b.scan_string();
        let service_name = b.scan_string();
        let auth_method = b.scan_string();
        let signing_algorithm = b.scan_string();
        let public_key = PublicKey::read_buffer(&mut b)?;
        let signature = b.scan_var_bytes();
        b.assert_eof();
        b.ok()?;

        Ok(AuthRequest {
            challenge,
            request_url,
            username,
            service_name,
            auth_method,
            signing_algorithm,
            public_key: Some(public_key),
            signature,
        })
    }

    /// Verify the signature over the request's canonical payload using the
    /// embedded public key.
    ///
    /// This proves possession of the key shares only. Whether the embedded
    /// key is authorized for `username`, and whether the challenge is live,
    /// are separate checks the server makes against its own records.
    pub fn verify(&self) -> std::result::Result<(), CryptoError> {
        let Some(public_key) = &self.public_key else {
            return Err(CryptoError::SignatureMismatch);
        };
        let digest = Sha1::digest(self.unsigned_buffer().raw());
        public_key.verify_pkcs1_v15(DigestAlgorithm::Sha1, &digest, &self.signature)
    }

    /// The challenge exactly as presented, for server-side validation.
    pub fn challenge_base64(&self) -> String {
        self.challenge.to_base64()
    }

    pub fn request_url(&self) -> &str {
        &self.request_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn public_key(&self) -> Option<&PublicKey> {
        self.public_key.as_ref()
    }

    fn unsigned_buffer(&self) -> Buffer {
        let mut b = Buffer::new();
        b.add_buffer(&self.challenge);
        b.add_string(&self.request_url);
        b.add_string(&self.username);
        b.add_string(&self.service_name);
        b.add_string(&self.auth_method);
        b.add_string(&self.signing_algorithm);
        if let Some(public_key) = &self.public_key {
            public_key.write_buffer(&mut b);
        }
        b
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::*;
    use crate::{
        challenge::Challenge,
        errors::CryptoError,
        keys::PartialKey,
        session::{Session, SessionSigner},
        timestamp::Timestamp,
        utils::testing::init_testing,
    };
    use libpaillier::unknown_order::BigNumber;

    fn signer(k1: PartialKey, k2: PartialKey, username: &str) -> SessionSigner {
        let mut session = Session::new(k1.public_key().clone());
        session.add_decryptor(Box::new(k1));
        session.add_decryptor(Box::new(k2));
        SessionSigner::new(session, username)
    }

    fn issued_challenge() -> String {
        let mut rng = init_testing();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        Challenge::issue_at(b"12345", ip, Timestamp::from_millis(1_342_131_178_700), &mut rng)
            .unwrap()
    }

    #[test]
    fn signed_requests_parse_and_verify() {
        let mut rng = init_testing();
        let (k1, k2) = PartialKey::generate(&mut rng).unwrap();
        let public = k1.public_key().clone();
        let challenge = issued_challenge();

        let text = AuthRequest::sign_challenge(
            &challenge,
            "https://example.com/login",
            &signer(k1, k2, "alice"),
        )
        .unwrap();

        let parsed = AuthRequest::from_base64(&text).unwrap();
        assert_eq!(parsed.username(), "alice");
        assert_eq!(parsed.request_url(), "https://example.com/login");
        assert_eq!(parsed.challenge_base64(), challenge);
        assert_eq!(parsed.public_key(), Some(&public));
        assert!(parsed.verify().is_ok());
    }

    #[test]
    fn any_mutation_invalidates_the_signature() {
        let mut rng = init_testing();
        let (k1, k2) = PartialKey::generate(&mut rng).unwrap();
        let challenge = issued_challenge();

        let text = AuthRequest::sign_challenge(
            &challenge,
            "https://example.com/login",
            &signer(k1, k2, "alice"),
        )
        .unwrap();
        let signed = AuthRequest::from_base64(&text).unwrap();

        let mutations: Vec<AuthRequest> = vec![
            {
                let mut r = signed.clone();
                r.challenge = Buffer::from_base64(&issued_challenge());
                r
            },
            {
                let mut r = signed.clone();
                r.request_url = "https://evil.example.com/login".into();
                r
            },
            {
                let mut r = signed.clone();
                r.username = "mallory".into();
                r
            },
            {
                let mut r = signed.clone();
                r.public_key =
                    Some(PublicKey::from_modulus(BigNumber::from_slice([0x7f; 256])));
                r
            },
        ];

        for mutated in mutations {
            assert_eq!(
                mutated.verify().unwrap_err(),
                CryptoError::SignatureMismatch
            );
        }
    }

    #[test]
    fn a_bad_challenge_string_aborts_signing() {
        let mut rng = init_testing();
        let (k1, k2) = PartialKey::generate(&mut rng).unwrap();

        let result = AuthRequest::sign_challenge(
            "!!! not base64 !!!",
            "https://example.com/login",
            &signer(k1, k2, "alice"),
        );
        assert!(matches!(result, Err(Error::Codec(_))));
    }

    #[test]
    fn truncated_requests_do_not_parse() {
        let mut rng = init_testing();
        let (k1, k2) = PartialKey::generate(&mut rng).unwrap();
        let text = AuthRequest::sign_challenge(
            &issued_challenge(),
            "https://example.com/login",
            &signer(k1, k2, "alice"),
        )
        .unwrap();

        // Chop a handful of base-64 quads off the end.
        let truncated = &text[..text.len() - 8];
        assert!(AuthRequest::from_base64(truncated).is_err());
    }
}
