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

//! The `sw` trace-state member and trigger trace responses.
//!
//! The `sw` member carries the span id of the span which made a sampling
//! decision and its trace flags, as `{16 hex digits}-{2 hex digits}`.
//! Downstream services continue that decision rather than making their own.
use sampling_types::{SpanId, TraceFlags, TraceState};
use std::fmt;

use crate::decision::{Decision, Status};
use crate::request_options::{RequestOptions, Signature};

/// The trace-state key of the member.
pub const SW_KEY: &str = "sw";

/// The separator between segments of a trigger trace response.
pub const RESPONSE_SEPARATOR: &str = "####";

/// A decoded `sw` member.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SwMember {
    span_id: SpanId,
    flags: TraceFlags,
}

impl SwMember {
    /// Creates a member.
    pub fn new(span_id: SpanId, sampled: bool) -> SwMember {
        SwMember {
            span_id,
            flags: TraceFlags::from(sampled),
        }
    }

    /// Returns the span id of the span which made the decision.
    #[inline]
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Returns the trace flags of the decision.
    #[inline]
    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    /// Determines if the decision was to sample.
    #[inline]
    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }
}

impl fmt::Display for SwMember {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}-{}", self.span_id, self.flags)
    }
}

/// Renders the member for a decision made by the given span.
pub fn encode(decision: &Decision, span_id: SpanId) -> String {
    SwMember::new(span_id, decision.do_sample()).to_string()
}

/// Extracts the member from a trace state.
///
/// Members which are not exactly 16 lowercase hex digits, a dash and 2
/// lowercase hex digits are treated as absent.
pub fn decode(trace_state: &TraceState) -> Option<SwMember> {
    let value = trace_state.get(SW_KEY)?;
    if !is_valid_member(value) {
        return None;
    }

    let span_id = value[..16].parse().ok()?;
    let flags = value[17..].parse().ok()?;
    Some(SwMember { span_id, flags })
}

fn is_valid_member(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 19
        && bytes[16] == b'-'
        && bytes[..16].iter().chain(&bytes[17..]).all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Returns a trace state carrying the member for a decision, with the other
/// members preserved.
pub fn inject(trace_state: &TraceState, decision: &Decision, span_id: SpanId) -> TraceState {
    let mut trace_state = trace_state.clone();
    // the encoded member is always a valid trace-state value
    let _ = trace_state.insert(SW_KEY, &encode(decision, span_id));
    trace_state
}

/// Builds the `X-Trace-Options-Response` value for a request.
///
/// When the signature failed validation only the auth status is reported.
pub fn build_response(decision: &Decision, options: &RequestOptions) -> String {
    let mut segments = vec![];

    if let Some(auth) = options.signature().auth_status() {
        segments.push(format!("auth={}", auth));
    }

    if decision.status() == Status::AuthFailed
        || matches!(options.signature(), Signature::Invalid(_))
    {
        return segments.join(RESPONSE_SEPARATOR);
    }

    segments.push(format!("trigger-trace={}", decision.trigger_trace()));

    if let Some(sw_keys) = options.sw_keys() {
        segments.push(format!("sw-keys={}", sw_keys));
    }

    if !options.ignored().is_empty() {
        segments.push(format!("ignored:{}", options.ignored().join(";")));
    }

    segments.join(RESPONSE_SEPARATOR)
}
