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

//! Span IDs.
use data_encoding::{DecodeError, HEXLOWER_PERMISSIVE};
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// The ID of a span.
///
/// Span IDs are 8 bytes, and are serialized as lowercase hexadecimal strings.
/// The all-zero ID is reserved by the W3C trace context specification to mean
/// "no span".
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpanId {
    buf: [u8; 8],
}

impl FromStr for SpanId {
    type Err = SpanIdParseError;

    fn from_str(s: &str) -> Result<SpanId, SpanIdParseError> {
        let mut buf = [0; 8];
        match HEXLOWER_PERMISSIVE.decode_len(s.len()) {
            Ok(8) => {
                HEXLOWER_PERMISSIVE
                    .decode_mut(s.as_bytes(), &mut buf)
                    .map_err(|e| SpanIdParseError(Some(e.error)))?;
            }
            _ => return Err(SpanIdParseError(None)),
        }

        Ok(SpanId { buf })
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.bytes() {
            write!(fmt, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
crate::hex_serde!(SpanId, "a hex-encoded span ID");

impl SpanId {
    /// The invalid, all-zero span ID.
    pub const INVALID: SpanId = SpanId { buf: [0; 8] };

    /// Returns the bytes of the span ID.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Determines if this ID is anything other than all zeros.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.buf != [0; 8]
    }
}

impl From<[u8; 8]> for SpanId {
    #[inline]
    fn from(bytes: [u8; 8]) -> SpanId {
        SpanId { buf: bytes }
    }
}

/// The error returned when parsing a `SpanId` from a string.
#[derive(Debug)]
pub struct SpanIdParseError(Option<DecodeError>);

impl fmt::Display for SpanIdParseError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str("error parsing span ID: ")?;
        match self.0 {
            Some(ref err) => write!(fmt, "{}", err),
            None => fmt.write_str("invalid length"),
        }
    }
}

impl Error for SpanIdParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.as_ref().map(|e| e as _)
    }
}
