// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use std::time::Duration;

use libpaillier::unknown_order::BigNumber;
use reqwest::{blocking::Client, header::CONTENT_TYPE, StatusCode};
use tracing::debug;

use crate::{
    errors::{Result, TransportError},
    keys::PublicKey,
    session::Decryptor,
    sign_request::{SignRequest, SIGN_REQUEST_MEDIA_TYPE},
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A decryptor backed by a remote escrow.
///
/// Each partial decrypt is one HTTP round-trip: the running value is framed
/// as a [`SignRequest`], POSTed to the escrow, and the returned request's
/// value is taken as the result. The escrow sees only the public key and
/// the running representative, never the digest or the other shares.
pub struct RemoteSigner {
    url: String,
    key: PublicKey,
    client: Client,
    timeout: Duration,
}

impl RemoteSigner {
    /// A signer POSTing to `url`, which must accept the escrow sign
    /// endpoint's media type.
    pub fn new(url: impl Into<String>, key: PublicKey) -> Self {
        RemoteSigner {
            url: url.into(),
            key,
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The public key this signer holds a share for.
    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    fn exchange(&self, body: String) -> std::result::Result<String, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, SIGN_REQUEST_MEDIA_TYPE)
            .timeout(self.timeout)
            .body(body)
            .send()?;

        if response.status() != StatusCode::OK {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        Ok(response.text()?)
    }
}

impl Decryptor for RemoteSigner {
    fn partial_decrypt(&self, c: &BigNumber) -> Result<BigNumber> {
        let request = SignRequest::new(self.key.clone(), c.clone())?;

        debug!(url = %self.url, "requesting partial signature");
        let body = self.exchange(request.to_text())?;

        let response =
            SignRequest::parse(&body).map_err(TransportError::MalformedResponse)?;
        if response.key() != request.key() {
            return Err(TransportError::KeyMismatch.into());
        }
        Ok(response.into_message())
    }
}
