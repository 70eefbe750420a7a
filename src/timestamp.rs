// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Wire-compatible wall-clock timestamps.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A timestamp as it appears on the wire: a 64-bit count of milliseconds
/// since the UNIX epoch, whose sub-second field carries the microsecond
/// residue modulo 1000 of the moment it was taken.
///
/// The raw value is kept verbatim so that re-encoding a scanned timestamp is
/// bit-exact regardless of how the producing clock populated the low bits.
/// Ordering and window arithmetic treat the value as plain milliseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The current time, in the encoding described on [`Timestamp`].
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Encode a [`SystemTime`]. Times before the epoch clamp to zero.
    pub fn from_system_time(t: SystemTime) -> Self {
        let elapsed = t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Timestamp(elapsed.as_secs() * 1000 + u64::from(elapsed.subsec_micros() % 1000))
    }

    /// Wrap a raw wire value.
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// The raw wire value.
    pub const fn as_millis(self) -> u64 {
        self.0
    }
}
