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

//! Trigger trace request options.
//!
//! Callers request a trigger trace with an `X-Trace-Options` header made of
//! `;` separated options, optionally signed through an
//! `X-Trace-Options-Signature` header carrying a hex encoded HMAC-SHA1 of the
//! raw options value.
use data_encoding::HEXLOWER_PERMISSIVE;
use hmac::{Hmac, Mac};
use indexmap::IndexMap;
use log::debug;
use sha1::Sha1;
use std::fmt;
use std::time::SystemTime;

use crate::settings::unix_secs;

/// The maximum distance in seconds between a signed request's timestamp and
/// the local clock.
pub const TIMESTAMP_WINDOW: u64 = 5 * 60;

const TRIGGER_TRACE_KEY: &str = "trigger-trace";
const TIMESTAMP_KEY: &str = "ts";
const SW_KEYS_KEY: &str = "sw-keys";
const CUSTOM_KEY_PREFIX: &str = "custom-";

/// The outcome of validating a request signature.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AuthStatus {
    /// The signature matched and the timestamp was fresh.
    Ok,
    /// The signature did not match the options.
    BadSignature,
    /// The timestamp was missing or outside of the accepted window.
    BadTimestamp,
    /// No signature key is configured, so no signature can be valid.
    NoSignatureKey,
}

impl AuthStatus {
    /// Returns the status as it appears in response headers.
    pub fn as_str(&self) -> &'static str {
        match *self {
            AuthStatus::Ok => "ok",
            AuthStatus::BadSignature => "bad-signature",
            AuthStatus::BadTimestamp => "bad-timestamp",
            AuthStatus::NoSignatureKey => "no-signature-key",
        }
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// The signature state of a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Signature {
    /// No signature was supplied.
    NotPresent,
    /// A signature was supplied and validated.
    Valid,
    /// A signature was supplied but failed validation.
    Invalid(AuthStatus),
}

impl Signature {
    /// Returns the auth status to report back to the caller, if any.
    pub fn auth_status(&self) -> Option<AuthStatus> {
        match *self {
            Signature::NotPresent => None,
            Signature::Valid => Some(AuthStatus::Ok),
            Signature::Invalid(status) => Some(status),
        }
    }

    /// Determines if the signature failed validation.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Signature::Invalid(_))
    }
}

/// Parsed trigger trace request options.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    trigger_trace: bool,
    timestamp: Option<i64>,
    sw_keys: Option<String>,
    custom_kvs: IndexMap<String, String>,
    ignored: Vec<String>,
    signature: Signature,
}

impl RequestOptions {
    /// Parses an options header value and validates its signature against
    /// the current time.
    pub fn parse(header: &str, signature: Option<&str>, key: Option<&[u8]>) -> RequestOptions {
        RequestOptions::parse_at(header, signature, key, SystemTime::now())
    }

    /// Parses an options header value and validates its signature against
    /// the provided time.
    pub fn parse_at(
        header: &str,
        signature: Option<&str>,
        key: Option<&[u8]>,
        now: SystemTime,
    ) -> RequestOptions {
        let mut options = RequestOptions {
            trigger_trace: false,
            timestamp: None,
            sw_keys: None,
            custom_kvs: IndexMap::new(),
            ignored: vec![],
            signature: Signature::NotPresent,
        };

        for segment in header.split(';') {
            let (key, value) = match segment.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim()).filter(|v| !v.is_empty())),
                None => (segment.trim(), None),
            };
            if key.is_empty() {
                continue;
            }
            options.add(key, value);
        }

        if let Some(signature) = signature {
            let status = validate_signature(header, signature, key, options.timestamp, now);
            options.signature = match status {
                AuthStatus::Ok => Signature::Valid,
                status => Signature::Invalid(status),
            };
        }

        options
    }

    fn add(&mut self, key: &str, value: Option<&str>) {
        let accepted = match key {
            TRIGGER_TRACE_KEY => {
                if value.is_none() && !self.trigger_trace {
                    self.trigger_trace = true;
                    true
                } else {
                    false
                }
            }
            TIMESTAMP_KEY => match value.map(str::parse::<i64>) {
                Some(Ok(timestamp)) if self.timestamp.is_none() => {
                    self.timestamp = Some(timestamp);
                    true
                }
                _ => false,
            },
            SW_KEYS_KEY => match value {
                Some(value) if self.sw_keys.is_none() => {
                    self.sw_keys = Some(value.to_string());
                    true
                }
                _ => false,
            },
            key if is_custom_key(key) => match value {
                Some(value) if !self.custom_kvs.contains_key(key) => {
                    self.custom_kvs.insert(key.to_string(), value.to_string());
                    true
                }
                _ => false,
            },
            _ => false,
        };

        if !accepted {
            debug!("ignoring trace option {}", key);
            self.ignored.push(key.to_string());
        }
    }

    /// Determines if the caller requested a trigger trace.
    #[inline]
    pub fn trigger_trace(&self) -> bool {
        self.trigger_trace
    }

    /// Returns the request timestamp in seconds since the Unix epoch.
    #[inline]
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Returns the free-form `sw-keys` value.
    #[inline]
    pub fn sw_keys(&self) -> Option<&str> {
        self.sw_keys.as_deref()
    }

    /// Returns the `custom-*` options in the order they were received.
    #[inline]
    pub fn custom_kvs(&self) -> &IndexMap<String, String> {
        &self.custom_kvs
    }

    /// Returns the keys of options which were not accepted, in order.
    #[inline]
    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    /// Returns the signature state of the request.
    #[inline]
    pub fn signature(&self) -> Signature {
        self.signature
    }
}

fn is_custom_key(key: &str) -> bool {
    key.starts_with(CUSTOM_KEY_PREFIX) && !key.contains(char::is_whitespace)
}

fn validate_signature(
    header: &str,
    signature: &str,
    key: Option<&[u8]>,
    timestamp: Option<i64>,
    now: SystemTime,
) -> AuthStatus {
    let key = match key {
        Some(key) => key,
        None => return AuthStatus::NoSignatureKey,
    };

    let now = unix_secs(now) as i64;
    match timestamp {
        Some(timestamp) if now.abs_diff(timestamp) <= TIMESTAMP_WINDOW => {}
        _ => return AuthStatus::BadTimestamp,
    }

    let signature = match HEXLOWER_PERMISSIVE.decode(signature.trim().as_bytes()) {
        Ok(signature) => signature,
        Err(_) => return AuthStatus::BadSignature,
    };

    let mut mac = match Hmac::<Sha1>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return AuthStatus::BadSignature,
    };
    mac.update(header.as_bytes());
    match mac.verify_slice(&signature) {
        Ok(()) => AuthStatus::Ok,
        Err(_) => AuthStatus::BadSignature,
    }
}
