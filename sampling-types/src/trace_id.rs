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

//! Trace IDs.
use data_encoding::{DecodeError, HEXLOWER_PERMISSIVE};
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// The ID of a trace.
///
/// Trace IDs are 16 bytes, and are serialized as lowercase hexadecimal
/// strings. As with span IDs, the all-zero value is invalid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TraceId {
    buf: [u8; 16],
}

impl FromStr for TraceId {
    type Err = TraceIdParseError;

    fn from_str(s: &str) -> Result<TraceId, TraceIdParseError> {
        let mut buf = [0; 16];
        match HEXLOWER_PERMISSIVE.decode_len(s.len()) {
            Ok(16) => {
                HEXLOWER_PERMISSIVE
                    .decode_mut(s.as_bytes(), &mut buf)
                    .map_err(|e| TraceIdParseError(Some(e.error)))?;
            }
            _ => return Err(TraceIdParseError(None)),
        }

        Ok(TraceId { buf })
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.bytes() {
            write!(fmt, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
crate::hex_serde!(TraceId, "a hex-encoded trace ID");

impl TraceId {
    /// The invalid, all-zero trace ID.
    pub const INVALID: TraceId = TraceId { buf: [0; 16] };

    /// Returns the bytes of the trace ID.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Determines if this ID is anything other than all zeros.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.buf != [0; 16]
    }
}

impl From<[u8; 16]> for TraceId {
    #[inline]
    fn from(bytes: [u8; 16]) -> TraceId {
        TraceId { buf: bytes }
    }
}

/// The error returned when parsing a `TraceId` from a string.
#[derive(Debug)]
pub struct TraceIdParseError(Option<DecodeError>);

impl fmt::Display for TraceIdParseError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str("error parsing trace ID: ")?;
        match self.0 {
            Some(ref err) => write!(fmt, "{}", err),
            None => fmt.write_str("invalid length"),
        }
    }
}

impl Error for TraceIdParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.as_ref().map(|e| e as _)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_display() {
        let s = "4bf92f3577b34da6a3ce929d0e0e4736";
        let id = s.parse::<TraceId>().unwrap();
        assert_eq!(id.bytes().len(), 16);
        assert_eq!(id.to_string(), s);
        assert!(id.is_valid());
    }

    #[test]
    fn short_ids_are_rejected() {
        assert!("4bf92f3577b34da6".parse::<TraceId>().is_err());
    }

    #[test]
    fn zero_is_invalid() {
        let id = "00000000000000000000000000000000".parse::<TraceId>().unwrap();
        assert!(!id.is_valid());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde() {
        let id = TraceId::from([1; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"01010101010101010101010101010101\"");
        assert_eq!(serde_json::from_str::<TraceId>(&json).unwrap(), id);
    }
}
