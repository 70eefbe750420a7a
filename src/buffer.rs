// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Self-describing binary framing in the style of RFC 4251.
//!
//! Every object this protocol puts on the wire (challenges, keys, sign
//! requests, auth requests) is a linear composition of the primitives in
//! this module: raw bytes, big-endian integers, tagged IP addresses,
//! length-prefixed byte strings, non-negative multi-precision integers, and
//! nested sub-buffers.
//!
//! A [`Buffer`] carries a sticky error cell. The first failing operation
//! records its error; every later operation is inert, with reads yielding
//! zero values. Serializers and parsers are therefore written as straight
//! sequences of calls with a single error check at the end, and a malformed
//! or truncated input can never partially commit.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use byteorder::{BigEndian, ByteOrder};
use libpaillier::unknown_order::BigNumber;

use crate::{errors::CodecError, timestamp::Timestamp};

/// Cap on the length of a single variable-length byte string, applied on
/// read. Writes are not capped; the peer's reader enforces its own limit.
pub const MAX_VAR_BYTES: usize = 100 * 1024;

/// An append/consume byte buffer with a sticky error cell.
///
/// Writes append at the end; reads consume from a cursor at the front. The
/// unread remainder is what [`raw`](Buffer::raw) and
/// [`to_base64`](Buffer::to_base64) expose, so a freshly written buffer
/// serializes in full.
#[derive(Debug, Default, Clone)]
pub struct Buffer {
    bytes: Vec<u8>,
    cursor: usize,
    error: Option<CodecError>,
}

impl Buffer {
    /// An empty buffer, ready for writing.
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer over raw bytes, ready for scanning.
    pub fn from_raw(bytes: Vec<u8>) -> Self {
        Buffer {
            bytes,
            cursor: 0,
            error: None,
        }
    }

    /// Decode a base-64 string (standard alphabet, padded). A malformed
    /// input yields an empty buffer with the error cell already set.
    pub fn from_base64(s: &str) -> Self {
        match STANDARD.decode(s) {
            Ok(bytes) => Self::from_raw(bytes),
            Err(e) => Buffer {
                bytes: Vec::new(),
                cursor: 0,
                error: Some(CodecError::Base64(e.to_string())),
            },
        }
    }

    /// The unread remainder of the buffer.
    pub fn raw(&self) -> &[u8] {
        &self.bytes[self.cursor..]
    }

    /// Base-64 encoding of the unread remainder.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.raw())
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    /// Whether any unread bytes remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sticky error, if any operation has failed.
    pub fn error(&self) -> Option<&CodecError> {
        self.error.as_ref()
    }

    /// Surface the sticky error cell.
    pub fn ok(&self) -> Result<(), CodecError> {
        match &self.error {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        }
    }

    fn fail(&mut self, error: CodecError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.error.is_none() {
            self.bytes.extend_from_slice(bytes);
        }
    }

    /// Consume the next `n` bytes, or record `BufferTooShort`.
    fn take(&mut self, n: usize) -> Option<&[u8]> {
        if self.error.is_some() {
            return None;
        }
        let start = self.cursor;
        let end = match start.checked_add(n) {
            Some(end) if end <= self.bytes.len() => end,
            _ => {
                self.fail(CodecError::BufferTooShort);
                return None;
            }
        };
        self.cursor = end;
        Some(&self.bytes[start..end])
    }

    pub fn add_u8(&mut self, x: u8) {
        self.append(&[x]);
    }

    pub fn scan_u8(&mut self) -> u8 {
        self.take(1).map_or(0, |b| b[0])
    }

    fn add_u32(&mut self, x: u32) {
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, x);
        self.append(&tmp);
    }

    fn scan_u32(&mut self) -> u32 {
        self.take(4).map_or(0, BigEndian::read_u32)
    }

    /// Eight big-endian bytes holding the raw [`Timestamp`] value.
    pub fn add_timestamp(&mut self, t: Timestamp) {
        let mut tmp = [0u8; 8];
        BigEndian::write_u64(&mut tmp, t.as_millis());
        self.append(&tmp);
    }

    pub fn scan_timestamp(&mut self) -> Timestamp {
        Timestamp::from_millis(self.take(8).map_or(0, BigEndian::read_u64))
    }

    /// A one-byte family tag (`4` or `6`) followed by the address bytes.
    ///
    /// An IPv4-mapped IPv6 address is written with tag `4`, so
    /// `::ffff:a.b.c.d` and `a.b.c.d` produce the same encoding.
    pub fn add_ip(&mut self, ip: IpAddr) {
        match ipv4_form(ip) {
            Some(v4) => {
                self.add_u8(4);
                self.append(&v4.octets());
            }
            None => {
                let IpAddr::V6(v6) = ip else { return };
                self.add_u8(6);
                self.append(&v6.octets());
            }
        }
    }

    /// Scan a tagged IP address. An unknown tag yields `None` without
    /// setting the error cell; the cursor is left just past the tag.
    pub fn scan_ip(&mut self) -> Option<IpAddr> {
        match self.scan_u8() {
            4 => {
                let octets: [u8; 4] = self.take(4)?.try_into().ok()?;
                Some(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            6 => {
                let octets: [u8; 16] = self.take(16)?.try_into().ok()?;
                Some(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            _ => None,
        }
    }

    /// A big-endian `u32` length prefix followed by that many bytes.
    pub fn add_var_bytes(&mut self, x: &[u8]) {
        self.add_u32(x.len() as u32);
        self.append(x);
    }

    pub fn scan_var_bytes(&mut self) -> Vec<u8> {
        let len = self.scan_u32() as usize;
        if self.error.is_some() {
            return Vec::new();
        }
        if len > MAX_VAR_BYTES {
            self.fail(CodecError::OversizeRead);
            return Vec::new();
        }
        self.take(len).map_or_else(Vec::new, <[u8]>::to_vec)
    }

    /// A variable-length byte string whose payload is UTF-8.
    pub fn add_string(&mut self, x: &str) {
        self.add_var_bytes(x.as_bytes());
    }

    pub fn scan_string(&mut self) -> String {
        let bytes = self.scan_var_bytes();
        match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(_) => {
                self.fail(CodecError::InvalidUtf8);
                String::new()
            }
        }
    }

    /// A non-negative multi-precision integer: minimal big-endian bytes with
    /// a zero byte prepended iff the top bit of the first byte would
    /// otherwise be set.
    pub fn add_mpint(&mut self, x: &BigNumber) {
        if self.error.is_some() {
            return;
        }
        if x < &BigNumber::zero() {
            self.fail(CodecError::MpintNegative);
            return;
        }
        let bytes = x.to_bytes();
        let bytes = strip_leading_zeros(&bytes);
        if bytes.first().is_some_and(|b| b & 0x80 != 0) {
            self.add_u32(bytes.len() as u32 + 1);
            self.add_u8(0);
            self.append(bytes);
        } else {
            self.add_var_bytes(bytes);
        }
    }

    /// Scan an mpint, rejecting encodings that would be negative in
    /// two's-complement or that carry a superfluous leading zero.
    pub fn scan_mpint(&mut self) -> BigNumber {
        let bytes = self.scan_var_bytes();
        if self.error.is_some() {
            return BigNumber::zero();
        }
        if bytes.first().is_some_and(|b| b & 0x80 != 0) {
            self.fail(CodecError::MpintNegative);
            return BigNumber::zero();
        }
        if bytes.first() == Some(&0) && bytes.get(1).map_or(true, |b| *b < 0x80) {
            self.fail(CodecError::MpintNotMinimal);
            return BigNumber::zero();
        }
        BigNumber::from_slice(&bytes)
    }

    /// Nest another buffer's unread contents as a length-prefixed field.
    pub fn add_buffer(&mut self, inner: &Buffer) {
        self.add_var_bytes(inner.raw());
    }

    /// Scan a length-prefixed field into a fresh buffer with its own cursor
    /// and error cell.
    pub fn scan_buffer(&mut self) -> Buffer {
        Buffer::from_raw(self.scan_var_bytes())
    }

    /// Record `BufferTooLong` if unread bytes remain after the final field.
    pub fn assert_eof(&mut self) {
        if self.error.is_none() && !self.is_empty() {
            self.fail(CodecError::BufferTooLong);
        }
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first_nonzero..]
}

fn ipv4_form(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_and_timestamp_round_trip() {
        let mut b = Buffer::new();
        b.add_u8(3);
        b.add_timestamp(Timestamp::from_millis(1_342_131_174_987));
        assert_eq!(b.scan_u8(), 3);
        assert_eq!(b.scan_timestamp(), Timestamp::from_millis(1_342_131_174_987));
        b.assert_eof();
        assert!(b.ok().is_ok());
    }

    #[test]
    fn short_buffer_reads_zero_and_sticks() {
        let mut b = Buffer::from_raw(vec![0x01]);
        assert_eq!(b.scan_u32(), 0);
        assert_eq!(b.error(), Some(&CodecError::BufferTooShort));
        // Everything after the first failure is inert.
        assert_eq!(b.scan_u8(), 0);
        b.add_u8(0xff);
        assert_eq!(b.bytes.len(), 1);
    }

    #[test]
    fn ipv4_round_trip() {
        let mut b = Buffer::new();
        b.add_ip("127.0.0.1".parse().unwrap());
        assert_eq!(b.raw(), &[4, 127, 0, 0, 1]);
        assert_eq!(b.scan_ip(), Some("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn ipv6_round_trip() {
        let ip: IpAddr = "::1".parse().unwrap();
        let mut b = Buffer::new();
        b.add_ip(ip);
        assert_eq!(b.scan_u8(), 6);
        let mut b = Buffer::new();
        b.add_ip(ip);
        assert_eq!(b.scan_ip(), Some(ip));
    }

    #[test]
    fn mapped_ipv6_writes_the_v4_tag() {
        let mapped: IpAddr = "::ffff:192.168.0.1".parse().unwrap();
        let mut b = Buffer::new();
        b.add_ip(mapped);
        assert_eq!(b.raw(), &[4, 192, 168, 0, 1]);
    }

    #[test]
    fn unknown_ip_tag_yields_none_and_consumes_only_the_tag() {
        let mut b = Buffer::from_raw(vec![9, 0xaa, 0xbb]);
        assert_eq!(b.scan_ip(), None);
        assert!(b.ok().is_ok());
        assert_eq!(b.scan_u8(), 0xaa);
    }

    #[test]
    fn var_bytes_cap_applies_on_read() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(MAX_VAR_BYTES as u32 + 1).to_be_bytes());
        let mut b = Buffer::from_raw(raw);
        assert!(b.scan_var_bytes().is_empty());
        assert_eq!(b.error(), Some(&CodecError::OversizeRead));

        let mut raw = Vec::new();
        raw.extend_from_slice(&(MAX_VAR_BYTES as u32).to_be_bytes());
        raw.extend_from_slice(&vec![0u8; MAX_VAR_BYTES]);
        let mut b = Buffer::from_raw(raw);
        assert_eq!(b.scan_var_bytes().len(), MAX_VAR_BYTES);
        assert!(b.ok().is_ok());
    }

    #[test]
    fn invalid_utf8_is_rejected_on_scan() {
        let mut b = Buffer::new();
        b.add_var_bytes(&[0xff, 0xfe]);
        assert_eq!(b.scan_string(), "");
        assert_eq!(b.error(), Some(&CodecError::InvalidUtf8));
    }

    #[test]
    fn mpint_zero_is_the_empty_string() {
        let mut b = Buffer::new();
        b.add_mpint(&BigNumber::zero());
        assert_eq!(b.raw(), &[0, 0, 0, 0]);
        assert_eq!(b.scan_mpint(), BigNumber::zero());
        assert!(b.ok().is_ok());
    }

    #[test]
    fn mpint_high_bit_gets_a_leading_zero() {
        let mut b = Buffer::new();
        b.add_mpint(&BigNumber::from(0x80u64));
        assert_eq!(b.raw(), &[0, 0, 0, 2, 0x00, 0x80]);
        assert_eq!(b.scan_mpint(), BigNumber::from(0x80u64));

        let mut b = Buffer::new();
        b.add_mpint(&BigNumber::from(0x7fu64));
        assert_eq!(b.raw(), &[0, 0, 0, 1, 0x7f]);
        assert_eq!(b.scan_mpint(), BigNumber::from(0x7fu64));
    }

    #[test]
    fn mpint_round_trips_large_values() {
        let x = BigNumber::from_slice([0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0]);
        let mut b = Buffer::new();
        b.add_mpint(&x);
        assert_eq!(b.scan_mpint(), x);
        b.assert_eof();
        assert!(b.ok().is_ok());
    }

    #[test]
    fn negative_mpint_is_not_written() {
        let mut b = Buffer::new();
        b.add_mpint(&-BigNumber::one());
        assert_eq!(b.error(), Some(&CodecError::MpintNegative));
        assert!(b.is_empty());
    }

    #[test]
    fn sign_bit_mpint_is_not_read() {
        let mut b = Buffer::new();
        b.add_var_bytes(&[0x80]);
        assert_eq!(b.scan_mpint(), BigNumber::zero());
        assert_eq!(b.error(), Some(&CodecError::MpintNegative));
    }

    #[test]
    fn non_minimal_mpint_is_not_read() {
        for payload in [&[0x00, 0x7f][..], &[0x00][..]] {
            let mut b = Buffer::new();
            b.add_var_bytes(payload);
            assert_eq!(b.scan_mpint(), BigNumber::zero());
            assert_eq!(b.error(), Some(&CodecError::MpintNotMinimal));
        }
    }

    #[test]
    fn nested_buffer_round_trip() {
        let mut inner = Buffer::new();
        inner.add_string("hello");
        inner.add_u8(7);

        let mut outer = Buffer::new();
        outer.add_buffer(&inner);
        outer.add_u8(1);

        let mut scanned = outer.scan_buffer();
        assert_eq!(scanned.scan_string(), "hello");
        assert_eq!(scanned.scan_u8(), 7);
        scanned.assert_eof();
        assert!(scanned.ok().is_ok());
        assert_eq!(outer.scan_u8(), 1);
    }

    #[test]
    fn assert_eof_flags_trailing_bytes() {
        let mut b = Buffer::from_raw(vec![1, 2]);
        assert_eq!(b.scan_u8(), 1);
        b.assert_eof();
        assert_eq!(b.error(), Some(&CodecError::BufferTooLong));
    }

    #[test]
    fn base64_round_trip() {
        let mut b = Buffer::new();
        b.add_string("buffer contents");
        let text = b.to_base64();
        let mut decoded = Buffer::from_base64(&text);
        assert_eq!(decoded.scan_string(), "buffer contents");
    }

    #[test]
    fn malformed_base64_sets_the_error_cell() {
        let b = Buffer::from_base64("not//valid==b64");
        assert!(matches!(b.error(), Some(CodecError::Base64(_))));
        assert!(b.is_empty());
    }
}
