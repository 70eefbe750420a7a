// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The escrow service: a second signing party that holds one share per
//! uploaded keypair and applies it on request.
//!
//! Two endpoints, both POST:
//!
//! * `/upload` takes a multipart form whose `key` field is a partial key in
//!   its text form, and stores it under its public key.
//! * `/sign` takes a sign request (media type `octokey/sign-request`),
//!   applies the stored share for the referenced public key, and returns the
//!   updated sign request. Unknown keys and malformed input get a 400.
//!
//! The store itself is a plain mutex-guarded map; handlers copy shares out
//! under the lock and never hold it across a request.

use std::{
    collections::HashMap,
    io::{self, Read},
    net::SocketAddr,
    sync::Mutex,
};

use tiny_http::{Method, Request, Response, Server};
use tracing::{error, info};

use crate::{
    keys::{PartialKey, PublicKey},
    sign_request::SignRequest,
};

/// In-memory share storage, keyed by the text form of the public key.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: Mutex<HashMap<String, PartialKey>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a share, replacing any previous share for the same public key.
    pub fn insert(&self, key: PartialKey) {
        let mut keys = self.keys.lock().expect("key store lock poisoned");
        keys.insert(key.public_key().to_text(), key);
    }

    /// Copy out the share for a public key, if one was uploaded.
    pub fn lookup(&self, public_key: &PublicKey) -> Option<PartialKey> {
        let keys = self.keys.lock().expect("key store lock poisoned");
        keys.get(&public_key.to_text()).cloned()
    }
}

/// The HTTP surface over a [`KeyStore`].
pub struct EscrowServer {
    store: KeyStore,
    server: Server,
}

impl EscrowServer {
    /// Bind to `addr` (for example `"0.0.0.0:5005"`, or port 0 for an
    /// ephemeral port).
    pub fn bind(addr: &str) -> io::Result<Self> {
        let server = Server::http(addr)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(EscrowServer {
            store: KeyStore::new(),
            server,
        })
    }

    /// The address actually bound, for reporting and for tests that bind
    /// port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    /// Serve requests until the process exits.
    pub fn run(&self) {
        for request in self.server.incoming_requests() {
            self.handle(request);
        }
    }

    fn handle(&self, mut request: Request) {
        info!(
            remote = ?request.remote_addr(),
            url = request.url(),
            "escrow request"
        );

        let mut body = String::new();
        if request.as_reader().read_to_string(&mut body).is_err() {
            respond(request, 400, "400 bad request");
            return;
        }

        let method = request.method().clone();
        let url = request.url().to_owned();
        match (method, url.as_str()) {
            (Method::Post, "/upload") => self.upload(request, &body),
            (Method::Post, "/sign") => self.sign(request, &body),
            _ => respond(request, 404, "404 not found"),
        }
    }

    fn upload(&self, request: Request, body: &str) {
        let field = content_type(&request)
            .and_then(multipart_boundary)
            .and_then(|boundary| multipart_field(body, &boundary, "key"));

        let Some(text) = field else {
            respond(request, 400, "400 bad request");
            return;
        };

        match PartialKey::parse(text) {
            Ok(key) => {
                self.store.insert(key);
                respond(request, 200, "OK");
            }
            Err(e) => {
                error!("rejecting uploaded key: {e}");
                respond(request, 400, "400 bad request");
            }
        }
    }

    fn sign(&self, request: Request, body: &str) {
        let mut sign_request = match SignRequest::parse(body) {
            Ok(r) => r,
            Err(e) => {
                error!("rejecting sign request: {e}");
                respond(request, 400, "400 bad request");
                return;
            }
        };

        let Some(share) = self.store.lookup(sign_request.key()) else {
            respond(request, 400, "400 bad request");
            return;
        };

        match sign_request.apply(&share) {
            Ok(()) => respond(request, 200, &sign_request.to_text()),
            Err(e) => {
                error!("partial signature failed: {e}");
                respond(request, 400, "400 bad request");
            }
        }
    }
}

fn respond(request: Request, status: u16, body: &str) {
    if let Err(e) = request.respond(Response::from_string(body).with_status_code(status)) {
        error!("failed to write escrow response: {e}");
    }
}

fn content_type(request: &Request) -> Option<&str> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str())
}

/// Pull the boundary parameter out of a `multipart/form-data` content type.
fn multipart_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_owned())
}

/// Find the named field in a multipart body. Only textual fields are
/// supported, which is all the upload endpoint accepts.
fn multipart_field<'a>(body: &'a str, boundary: &str, name: &str) -> Option<&'a str> {
    let delimiter = format!("--{boundary}");
    let marker = format!("name=\"{name}\"");

    for part in body.split(delimiter.as_str()) {
        let part = part.strip_prefix("\r\n").unwrap_or(part);
        let Some((headers, content)) = part.split_once("\r\n\r\n") else {
            continue;
        };
        if headers.contains(marker.as_str()) {
            // The trailing CRLF belongs to the framing, not the field.
            return Some(content.strip_suffix("\r\n").unwrap_or(content));
        }
    }
    None
}
