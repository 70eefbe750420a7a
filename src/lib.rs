// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Challenge/response authentication with multi-party RSA signing.
//!
//! The private signing key never exists in one place: its exponent is split
//! into additive shares held by different parties, and a signature is
//! produced by chaining one modular exponentiation per share. A typical
//! deployment puts one share on the user's device and one behind an escrow
//! service, so neither a stolen laptop nor a compromised escrow can sign
//! alone.
//!
//! # Protocol flow
//!
//! 1. The server issues a [`Challenge`]: an opaque token binding a
//!    timestamp, the client's address, and fresh randomness under an HMAC of
//!    the server's secret. Nothing is recorded server side.
//! 2. The client builds an [`AuthRequest`] over the challenge, the request
//!    URL, and its username, and signs its SHA-1 digest through a
//!    [`Session`]: an ordered list of [`Decryptor`]s, each holding one
//!    [`PartialKey`] share locally or proxying to a remote escrow via
//!    [`RemoteSigner`].
//! 3. The server validates the challenge, re-derives the signed payload,
//!    and verifies the PKCS#1 v1.5 signature under the embedded
//!    [`PublicKey`].
//!
//! Everything on the wire is built from the length-prefixed binary framing
//! in [`buffer`], so independent implementations interoperate byte for
//! byte.

pub mod auth_request;
pub mod buffer;
pub mod challenge;
pub mod errors;
pub mod escrow;
pub mod keys;
pub mod mrsa;
pub mod session;
pub mod sign_request;
pub mod timestamp;
mod utils;

pub use auth_request::{AuthRequest, Signer};
pub use buffer::Buffer;
pub use challenge::Challenge;
pub use errors::{
    ChallengeError, CodecError, CryptoError, Error, FormatError, Result, TransportError,
};
pub use keys::{PartialKey, PublicKey};
pub use mrsa::DigestAlgorithm;
pub use session::{CancelToken, Decryptor, RemoteSigner, Session, SessionSigner};
pub use sign_request::SignRequest;
pub use timestamp::Timestamp;
