//  Copyright 2025 Palantir Technologies, Inc.
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! Trace flags.
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// The flags byte of a W3C `traceparent`.
///
/// Only the lowest bit is defined: it records whether the caller may have
/// sampled the trace.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// The `sampled` bit.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// Creates flags from their raw byte.
    #[inline]
    pub const fn new(bits: u8) -> TraceFlags {
        TraceFlags(bits)
    }

    /// Returns the raw byte.
    #[inline]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Determines if the `sampled` bit is set.
    #[inline]
    pub const fn is_sampled(&self) -> bool {
        self.0 & Self::SAMPLED.0 != 0
    }

    /// Returns a copy of these flags with the `sampled` bit set or cleared.
    #[inline]
    pub const fn with_sampled(self, sampled: bool) -> TraceFlags {
        if sampled {
            TraceFlags(self.0 | Self::SAMPLED.0)
        } else {
            TraceFlags(self.0 & !Self::SAMPLED.0)
        }
    }
}

impl From<bool> for TraceFlags {
    fn from(sampled: bool) -> TraceFlags {
        TraceFlags::default().with_sampled(sampled)
    }
}

impl fmt::Display for TraceFlags {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{:02x}", self.0)
    }
}

impl FromStr for TraceFlags {
    type Err = TraceFlagsParseError;

    /// Parses exactly two hex digits.
    fn from_str(s: &str) -> Result<TraceFlags, TraceFlagsParseError> {
        if s.len() != 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TraceFlagsParseError(()));
        }

        u8::from_str_radix(s, 16)
            .map(TraceFlags)
            .map_err(|_| TraceFlagsParseError(()))
    }
}

#[cfg(feature = "serde")]
crate::hex_serde!(TraceFlags, "two hex digits");

/// The error returned when parsing `TraceFlags` from a string.
#[derive(Debug)]
pub struct TraceFlagsParseError(());

impl fmt::Display for TraceFlagsParseError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str("error parsing trace flags: expected two hex digits")
    }
}

impl Error for TraceFlagsParseError {}
