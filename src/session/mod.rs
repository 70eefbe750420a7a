// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The threshold-signing session.
//!
//! A session owns the shared public key and an ordered list of decryptors,
//! each holding the capability to apply one private-exponent share. Signing
//! threads the padded representative through every decryptor in declared
//! order; because the shares are additive in the exponent, the final value
//! is the ordinary RSA signature. A decryptor may be a local [`PartialKey`]
//! or a [`RemoteSigner`] proxy for an escrow holding the other share.
//!
//! Sessions are synchronous and self-contained: no state is shared between
//! sessions, and independent sessions may run in parallel.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use libpaillier::unknown_order::BigNumber;
use tracing::warn;

use crate::{
    auth_request::Signer,
    errors::{CryptoError, Result, TransportError},
    keys::{PartialKey, PublicKey},
    mrsa::{self, DigestAlgorithm},
};

mod remote;

pub use remote::RemoteSigner;

/// The capability to apply one private-exponent share to a representative.
pub trait Decryptor {
    /// Replace `c` with `c^dᵢ mod N` for the share this decryptor holds.
    fn partial_decrypt(&self, c: &BigNumber) -> Result<BigNumber>;
}

impl Decryptor for PartialKey {
    fn partial_decrypt(&self, c: &BigNumber) -> Result<BigNumber> {
        Ok(PartialKey::partial_decrypt(self, c)?)
    }
}

/// Cooperative cancellation flag shared between a session and its owner.
///
/// Cancelling takes effect at the next decryptor boundary: the in-flight
/// partial decrypt (which may be a blocking network call) completes or times
/// out on its own, and no further decryptor is invoked.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the session to stop before its next decryptor call.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// An ordered composition of decryptors producing full RSA signatures.
pub struct Session {
    public_key: PublicKey,
    decryptors: Vec<Box<dyn Decryptor>>,
    cancel: Option<CancelToken>,
}

impl Session {
    pub fn new(public_key: PublicKey) -> Self {
        Session {
            public_key,
            decryptors: Vec::new(),
            cancel: None,
        }
    }

    /// Append a decryptor. Decryptors run in the order they were added.
    pub fn add_decryptor(&mut self, decryptor: Box<dyn Decryptor>) {
        self.decryptors.push(decryptor);
    }

    /// Install a cancellation flag observed between decryptor calls.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Sign an already padded representative, returning the raw signature
    /// bytes without verifying them against anything.
    pub fn sign(&self, padded: &BigNumber) -> Result<Vec<u8>> {
        let accumulated = self.run_decryptors(padded.clone())?;
        Ok(mrsa::i2osp(
            &accumulated,
            mrsa::modulus_len(self.public_key.modulus()),
        ))
    }

    /// PKCS#1 v1.5 sign a digest: pad it, thread it through the decryptors,
    /// and verify the accumulated result before returning it.
    pub fn sign_digest(&self, algorithm: DigestAlgorithm, digest: &[u8]) -> Result<Vec<u8>> {
        let n = self.public_key.modulus();
        let padded = mrsa::pad_digest(n, algorithm, digest)?;
        let accumulated = self.run_decryptors(padded)?;
        Ok(mrsa::finalize_signature(n, algorithm, digest, &accumulated)?)
    }

    fn run_decryptors(&self, start: BigNumber) -> Result<BigNumber> {
        let n = self.public_key.modulus();
        if start < BigNumber::zero() || &start >= n {
            return Err(CryptoError::InputOutOfRange.into());
        }
        if self.decryptors.is_empty() {
            warn!("signing session has no decryptors");
        }

        let mut accumulated = start;
        for decryptor in &self.decryptors {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(TransportError::Cancelled.into());
            }
            accumulated = decryptor.partial_decrypt(&accumulated)?;
        }
        Ok(accumulated)
    }
}

/// A session paired with the identity it signs for, usable wherever a
/// [`Signer`] is expected.
pub struct SessionSigner {
    session: Session,
    username: String,
}

impl SessionSigner {
    pub fn new(session: Session, username: impl Into<String>) -> Self {
        SessionSigner {
            session,
            username: username.into(),
        }
    }
}

impl Signer for SessionSigner {
    fn public_key(&self) -> &PublicKey {
        self.session.public_key()
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn sign_pkcs1_v15(&self, algorithm: DigestAlgorithm, digest: &[u8]) -> Result<Vec<u8>> {
        self.session.sign_digest(algorithm, digest)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{errors::Error, utils::testing::init_testing};
    use sha1::{Digest, Sha1};

    fn local_session(k1: PartialKey, k2: PartialKey) -> Session {
        let mut session = Session::new(k1.public_key().clone());
        session.add_decryptor(Box::new(k1));
        session.add_decryptor(Box::new(k2));
        session
    }

    #[test]
    fn two_local_shares_produce_a_verifiable_signature() {
        let mut rng = init_testing();
        let (k1, k2) = PartialKey::generate(&mut rng).unwrap();
        let public = k1.public_key().clone();
        let digest = Sha1::digest(b"Monkey!");

        // Either share order yields the same valid signature.
        let forward = local_session(k1.clone(), k2.clone())
            .sign_digest(DigestAlgorithm::Sha1, &digest)
            .unwrap();
        let backward = local_session(k2, k1)
            .sign_digest(DigestAlgorithm::Sha1, &digest)
            .unwrap();

        assert_eq!(forward, backward);
        assert!(public
            .verify_pkcs1_v15(DigestAlgorithm::Sha1, &digest, &forward)
            .is_ok());
    }

    #[test]
    fn signature_does_not_verify_under_another_digest() {
        let mut rng = init_testing();
        let (k1, k2) = PartialKey::generate(&mut rng).unwrap();
        let public = k1.public_key().clone();

        let digest = Sha1::digest(b"Monkey!");
        let signature = local_session(k1, k2)
            .sign_digest(DigestAlgorithm::Sha1, &digest)
            .unwrap();

        let other = Sha1::digest(b"Gorilla!");
        assert_eq!(
            public
                .verify_pkcs1_v15(DigestAlgorithm::Sha1, &other, &signature)
                .unwrap_err(),
            CryptoError::SignatureMismatch
        );
    }

    struct CountingDecryptor(AtomicUsize);

    impl Decryptor for &CountingDecryptor {
        fn partial_decrypt(&self, c: &BigNumber) -> Result<BigNumber> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(c.clone())
        }
    }

    #[test]
    fn cancellation_stops_before_the_next_decryptor() {
        let counter: &'static CountingDecryptor =
            Box::leak(Box::new(CountingDecryptor(AtomicUsize::new(0))));

        let mut session = Session::new(PublicKey::from_modulus(BigNumber::from(1_000_003u64)));
        session.add_decryptor(Box::new(counter));
        session.add_decryptor(Box::new(counter));

        let token = CancelToken::new();
        session.set_cancel_token(token.clone());
        token.cancel();

        let err = session.sign(&BigNumber::from(42u64)).unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Cancelled)));
        assert_eq!(counter.0.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn a_session_with_no_decryptors_cannot_produce_a_signature() {
        // Any modulus wide enough for the padding will do here.
        let session = Session::new(PublicKey::from_modulus(BigNumber::from_slice([0x7f; 48])));

        // The padded digest passes through unchanged and fails the final
        // verification.
        let digest = Sha1::digest(b"Monkey!");
        assert!(matches!(
            session.sign_digest(DigestAlgorithm::Sha1, &digest),
            Err(Error::Crypto(CryptoError::SignatureMismatch))
        ));
    }

    #[test]
    fn unreduced_input_is_rejected_before_any_decryptor_runs() {
        let counter: &'static CountingDecryptor =
            Box::leak(Box::new(CountingDecryptor(AtomicUsize::new(0))));

        let mut session = Session::new(PublicKey::from_modulus(BigNumber::from(1_000_003u64)));
        session.add_decryptor(Box::new(counter));

        assert!(session.sign(&BigNumber::from(2_000_000u64)).is_err());
        assert_eq!(counter.0.load(Ordering::Relaxed), 0);
    }
}
