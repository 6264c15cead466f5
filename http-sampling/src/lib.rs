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

//! HTTP header propagation for sampling decisions.
//!
//! Trace contexts travel in the W3C `traceparent` and `tracestate` headers.
//! Trigger trace requests arrive in `X-Trace-Options` and
//! `X-Trace-Options-Signature`, and are answered in
//! `X-Trace-Options-Response`.
#![warn(missing_docs)]

use http::header::{HeaderMap, HeaderValue};
use sampling::codec::{self, SwMember};
use sampling::{Decision, RequestOptions, SpanContext, TraceFlags, TraceState};
use std::str::FromStr;

const TRACEPARENT: &str = "traceparent";
const TRACESTATE: &str = "tracestate";
const X_TRACE: &str = "x-trace";
const X_TRACE_OPTIONS: &str = "x-trace-options";
const X_TRACE_OPTIONS_SIGNATURE: &str = "x-trace-options-signature";
const X_TRACE_OPTIONS_RESPONSE: &str = "x-trace-options-response";
const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "access-control-expose-headers";

const SUPPORTED_VERSION: &str = "00";

/// Deserializes a remote trace context from the `traceparent` and
/// `tracestate` headers.
pub fn get_trace_context(headers: &HeaderMap) -> Option<SpanContext> {
    let value = headers.get(TRACEPARENT)?.to_str().ok()?.trim();
    let mut parts = value.split('-');

    let version = parts.next().filter(|s| is_lower_hex(s, 2))?;
    if version == "ff" {
        return None;
    }
    let trace_id = parts.next().filter(|s| is_lower_hex(s, 32))?.parse().ok()?;
    let span_id = parts.next().filter(|s| is_lower_hex(s, 16))?.parse().ok()?;
    let flags = parts
        .next()
        .filter(|s| is_lower_hex(s, 2))?
        .parse::<TraceFlags>()
        .ok()?;
    // later versions may append fields
    if version == SUPPORTED_VERSION && parts.next().is_some() {
        return None;
    }

    let trace_state = headers
        .get_all(TRACESTATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");

    let context = SpanContext::builder()
        .trace_id(trace_id)
        .span_id(span_id)
        .trace_flags(flags)
        .remote(true)
        .trace_state(TraceState::parse(&trace_state))
        .build();

    if context.is_valid() {
        Some(context)
    } else {
        None
    }
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Serializes a trace context into the `traceparent` and `tracestate`
/// headers.
///
/// The `sw` member of the trace state is replaced by one carrying the span's
/// own id and sampled flag, so downstream services continue its decision.
pub fn set_trace_context(context: &SpanContext, headers: &mut HeaderMap) {
    headers.insert(
        TRACEPARENT,
        HeaderValue::from_str(&traceparent(context)).unwrap(),
    );

    let mut trace_state = context.trace_state().clone();
    let member = SwMember::new(context.span_id(), context.is_sampled());
    // the member is always a valid trace-state value
    let _ = trace_state.insert(codec::SW_KEY, &member.to_string());

    match HeaderValue::from_str(&trace_state.to_string()) {
        Ok(value) => {
            headers.insert(TRACESTATE, value);
        }
        Err(_) => {
            headers.remove(TRACESTATE);
        }
    }
}

fn traceparent(context: &SpanContext) -> String {
    format!(
        "{}-{}-{}-{}",
        SUPPORTED_VERSION,
        context.trace_id(),
        context.span_id(),
        context.trace_flags()
    )
}

/// Deserializes trigger trace request options from the `X-Trace-Options` and
/// `X-Trace-Options-Signature` headers.
///
/// Returns `None` if no options were sent.
pub fn get_request_options(
    headers: &HeaderMap,
    signature_key: Option<&[u8]>,
) -> Option<RequestOptions> {
    let header = headers.get(X_TRACE_OPTIONS)?.to_str().ok()?;
    let signature = headers
        .get(X_TRACE_OPTIONS_SIGNATURE)
        .and_then(|v| v.to_str().ok());

    Some(RequestOptions::parse(header, signature, signature_key))
}

/// Serializes the outcome of a sampling decision into response headers.
///
/// `x-trace` always carries the trace context of the span which handled the
/// request. `X-Trace-Options-Response` is only written if the request
/// carried trigger trace options.
pub fn set_response(
    context: &SpanContext,
    decision: &Decision,
    options: Option<&RequestOptions>,
    headers: &mut HeaderMap,
) {
    headers.insert(X_TRACE, HeaderValue::from_str(&traceparent(context)).unwrap());

    let mut exposed = vec![X_TRACE];

    if let Some(options) = options {
        let response = codec::build_response(decision, options);
        if let Ok(value) = HeaderValue::from_str(&response) {
            headers.insert(X_TRACE_OPTIONS_RESPONSE, value);
            exposed.push(X_TRACE_OPTIONS_RESPONSE);
        }
    }

    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_str(&exposed.join(", ")).unwrap(),
    );
}

/// Deserializes the `x-trace` header of a response.
pub fn get_response_context(headers: &HeaderMap) -> Option<SpanContext> {
    let value = parse_header::<String>(headers, X_TRACE)?;
    let mut traceparent = HeaderMap::new();
    traceparent.insert(TRACEPARENT, HeaderValue::from_str(&value).ok()?);
    get_trace_context(&traceparent)
}

fn parse_header<T>(headers: &HeaderMap, name: &str) -> Option<T>
where
    T: FromStr,
{
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}
