// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Error types for the library.
//!
//! Errors are grouped by the layer that produces them: the wire codec, the
//! textual key/request formats, challenge validation, the RSA arithmetic, and
//! the transport to remote partial signers. None of these are retried
//! internally; retry policy belongs to the caller.

use thiserror::Error;

/// The default result type used in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The umbrella error type returned by operations that cross layers, such as
/// a threshold-signing session that mixes local arithmetic with remote calls.
#[derive(Debug, Error)]
pub enum Error {
    /// A buffer could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A textual form (key, sign request, auth request) was malformed.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A challenge failed validation.
    #[error("invalid challenge")]
    Challenge(Vec<ChallengeError>),

    /// An RSA operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A remote partial signer could not be reached or misbehaved.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<Vec<ChallengeError>> for Error {
    fn from(errors: Vec<ChallengeError>) -> Self {
        Error::Challenge(errors)
    }
}

/// Errors produced by the wire codec.
///
/// These live in a buffer's sticky error cell: the first failure is recorded
/// and every later operation on the same buffer is inert, so a structured
/// read or write surfaces exactly one codec error at the end.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A read ran past the end of the buffer.
    #[error("buffer too short")]
    BufferTooShort,

    /// Bytes remained after the final field of a structured read.
    #[error("buffer too long")]
    BufferTooLong,

    /// A length prefix exceeded the read cap.
    #[error("refusing to read oversize byte string")]
    OversizeRead,

    /// A negative value was written as, or read from, an mpint.
    #[error("mpint is negative")]
    MpintNegative,

    /// An mpint carried a superfluous leading zero byte.
    #[error("mpint is not minimally encoded")]
    MpintNotMinimal,

    /// A string field did not hold UTF-8.
    #[error("byte string is not valid utf-8")]
    InvalidUtf8,

    /// The buffer was constructed from a malformed base-64 string.
    #[error("invalid base64: {0}")]
    Base64(String),
}

/// Errors produced while parsing the textual key and request formats.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("invalid public key")]
    PublicKey,

    #[error("invalid partial key")]
    PartialKey,

    #[error("partial key has wrong exponent")]
    WrongExponent,

    #[error("partial key share is out of range")]
    ShareOutOfRange,

    #[error("invalid sign request")]
    SignRequest,

    #[error("message is not reduced modulo the key")]
    MessageOutOfRange,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A single failed check during challenge validation.
///
/// Validation accumulates these: a challenge that is both stale and bound to
/// the wrong address reports both failures. Only a codec-level decoding
/// failure, or a version mismatch, is reported alone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    #[error("challenge version mismatch")]
    VersionMismatch,

    #[error("challenge too new")]
    TooNew,

    #[error("challenge too old")]
    TooOld,

    #[error("challenge IP mismatch")]
    IpMismatch,

    #[error("challenge random mismatch")]
    RandomMismatch,

    #[error("challenge HMAC mismatch")]
    HmacMismatch,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors produced by the RSA arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("random source failure")]
    RandomSource,

    #[error("keypair generation failed")]
    KeyGeneration,

    #[error("input is not reduced modulo the key")]
    InputOutOfRange,

    #[error("digest length does not match the signing algorithm")]
    DigestLength,

    #[error("modulus too small for pkcs#1 v1.5 padding")]
    ModulusTooSmall,

    #[error("signature verification failed")]
    SignatureMismatch,
}

/// Errors produced while talking to a remote partial signer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("partial signer returned http status {0}")]
    Status(u16),

    #[error("http request failed")]
    Http(#[from] reqwest::Error),

    #[error("malformed partial signer response")]
    MalformedResponse(#[source] FormatError),

    #[error("partial signer responded for a different key")]
    KeyMismatch,

    #[error("signing session cancelled")]
    Cancelled,
}
