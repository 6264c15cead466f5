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

//! Sampling decisions.
use indexmap::IndexMap;
use std::fmt;

use crate::request_options::AuthStatus;
use crate::settings::SampleSource;

/// The rule which produced a decision.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// The decision was made without remote settings.
    LocalDefault,
    /// The sample rate from remote settings was applied.
    RemoteSetting,
    /// A signed trigger trace request was charged to the strict bucket.
    TriggerTraceStrict,
    /// An unsigned trigger trace request was charged to the relaxed bucket.
    TriggerTraceRelaxed,
    /// The decision of an upstream service was continued.
    TracestateContinuation,
    /// The decision of an in-process parent span was inherited.
    ParentLocal,
    /// The request signature failed validation.
    AuthFailed,
}

impl Source {
    /// Returns the name of the source.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Source::LocalDefault => "local-default",
            Source::RemoteSetting => "remote-setting",
            Source::TriggerTraceStrict => "trigger-trace-strict",
            Source::TriggerTraceRelaxed => "trigger-trace-relaxed",
            Source::TracestateContinuation => "tracestate-continuation",
            Source::ParentLocal => "parent-local",
            Source::AuthFailed => "auth-failed",
        }
    }
}

impl From<SampleSource> for Source {
    fn from(source: SampleSource) -> Source {
        match source {
            SampleSource::LocalDefault => Source::LocalDefault,
            SampleSource::Remote => Source::RemoteSetting,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// The overall status of a decision.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    /// The decision followed the regular rules.
    Ok,
    /// No settings have been published yet.
    SettingsNotAvailable,
    /// Tracing is disabled.
    TracingDisabled,
    /// The request signature failed validation.
    AuthFailed,
    /// A token bucket was exhausted.
    RateExceeded,
    /// A trigger trace was requested but trigger tracing is disabled.
    TriggerTracingDisabled,
}

impl Status {
    /// Returns the numeric status code.
    pub fn code(&self) -> i32 {
        match *self {
            Status::Ok => 0,
            Status::SettingsNotAvailable => -1,
            Status::TracingDisabled => -2,
            Status::AuthFailed => -3,
            Status::RateExceeded => -4,
            Status::TriggerTracingDisabled => -5,
        }
    }

    /// Returns the status message.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Status::Ok => "ok",
            Status::SettingsNotAvailable => "settings-not-available",
            Status::TracingDisabled => "tracing-disabled",
            Status::AuthFailed => "auth-failed",
            Status::RateExceeded => "rate-exceeded",
            Status::TriggerTracingDisabled => "trigger-tracing-disabled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// The outcome of a trigger trace request, as reported to the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TriggerTraceStatus {
    /// The trace was triggered.
    Ok,
    /// No trigger trace was requested.
    NotRequested,
    /// The request was ignored because the trace is already in progress.
    Ignored,
    /// Tracing is disabled.
    TracingDisabled,
    /// Trigger tracing is disabled.
    TriggerTracingDisabled,
    /// The trigger trace budget is exhausted.
    RateExceeded,
    /// No settings have been published yet.
    SettingsNotAvailable,
}

impl TriggerTraceStatus {
    /// Returns the status as it appears in response headers.
    pub fn as_str(&self) -> &'static str {
        match *self {
            TriggerTraceStatus::Ok => "ok",
            TriggerTraceStatus::NotRequested => "not-requested",
            TriggerTraceStatus::Ignored => "ignored",
            TriggerTraceStatus::TracingDisabled => "tracing-disabled",
            TriggerTraceStatus::TriggerTracingDisabled => "trigger-tracing-disabled",
            TriggerTraceStatus::RateExceeded => "rate-exceeded",
            TriggerTraceStatus::SettingsNotAvailable => "settings-not-available",
        }
    }
}

impl fmt::Display for TriggerTraceStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// The value of a span attribute attached by a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    String(String),
}

impl fmt::Display for Attribute {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Attribute::Bool(v) => fmt::Display::fmt(&v, fmt),
            Attribute::Int(v) => fmt::Display::fmt(&v, fmt),
            Attribute::Float(v) => fmt::Display::fmt(&v, fmt),
            Attribute::String(ref v) => fmt.write_str(v),
        }
    }
}

impl From<bool> for Attribute {
    fn from(v: bool) -> Attribute {
        Attribute::Bool(v)
    }
}

impl From<i64> for Attribute {
    fn from(v: i64) -> Attribute {
        Attribute::Int(v)
    }
}

impl From<f64> for Attribute {
    fn from(v: f64) -> Attribute {
        Attribute::Float(v)
    }
}

impl<'a> From<&'a str> for Attribute {
    fn from(v: &'a str) -> Attribute {
        Attribute::String(v.to_string())
    }
}

impl From<String> for Attribute {
    fn from(v: String) -> Attribute {
        Attribute::String(v)
    }
}

/// The result of a single sampling evaluation.
///
/// A decision is created fresh for each unit of work and is immutable once
/// returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    do_sample: bool,
    do_metrics: bool,
    rate: u32,
    source: Source,
    bucket_capacity: f64,
    bucket_rate: f64,
    status: Status,
    auth: Option<AuthStatus>,
    trigger_trace: TriggerTraceStatus,
    attributes: IndexMap<String, Attribute>,
}

impl Decision {
    /// Returns a builder used to construct a `Decision`.
    pub fn builder() -> Builder {
        Builder {
            do_sample: false,
            do_metrics: false,
            rate: 0,
            source: Source::LocalDefault,
            bucket_capacity: 0.,
            bucket_rate: 0.,
            status: Status::Ok,
            auth: None,
            trigger_trace: TriggerTraceStatus::NotRequested,
            attributes: IndexMap::new(),
        }
    }

    /// Determines if the span should be recorded and exported.
    #[inline]
    pub fn do_sample(&self) -> bool {
        self.do_sample
    }

    /// Determines if the span should be counted by aggregate metrics.
    #[inline]
    pub fn do_metrics(&self) -> bool {
        self.do_metrics
    }

    /// Returns the sample rate, in parts per million, that was used.
    #[inline]
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Returns the rule which produced the decision.
    #[inline]
    pub fn source(&self) -> Source {
        self.source
    }

    /// Returns the capacity of the consulted token bucket.
    #[inline]
    pub fn bucket_capacity(&self) -> f64 {
        self.bucket_capacity
    }

    /// Returns the refill rate of the consulted token bucket.
    #[inline]
    pub fn bucket_rate(&self) -> f64 {
        self.bucket_rate
    }

    /// Returns the status of the decision.
    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns the numeric status code.
    #[inline]
    pub fn status_code(&self) -> i32 {
        self.status.code()
    }

    /// Returns the status message.
    #[inline]
    pub fn status_msg(&self) -> &'static str {
        self.status.as_str()
    }

    /// Returns the signature validation outcome, if a signature was supplied.
    #[inline]
    pub fn auth(&self) -> Option<AuthStatus> {
        self.auth
    }

    /// Returns the signature validation message, if a signature was supplied.
    #[inline]
    pub fn auth_msg(&self) -> Option<&'static str> {
        self.auth.map(|a| a.as_str())
    }

    /// Returns the outcome of the trigger trace request.
    #[inline]
    pub fn trigger_trace(&self) -> TriggerTraceStatus {
        self.trigger_trace
    }

    /// Returns the attributes to attach to the span.
    #[inline]
    pub fn attributes(&self) -> &IndexMap<String, Attribute> {
        &self.attributes
    }
}

/// A builder type for `Decision`s.
pub struct Builder {
    do_sample: bool,
    do_metrics: bool,
    rate: u32,
    source: Source,
    bucket_capacity: f64,
    bucket_rate: f64,
    status: Status,
    auth: Option<AuthStatus>,
    trigger_trace: TriggerTraceStatus,
    attributes: IndexMap<String, Attribute>,
}

impl Builder {
    /// Sets whether the span should be recorded.
    ///
    /// Defaults to `false`.
    pub fn do_sample(&mut self, do_sample: bool) -> &mut Builder {
        self.do_sample = do_sample;
        self
    }

    /// Sets whether the span should be counted by metrics.
    ///
    /// Defaults to `false`.
    pub fn do_metrics(&mut self, do_metrics: bool) -> &mut Builder {
        self.do_metrics = do_metrics;
        self
    }

    /// Sets the sample rate that was used.
    ///
    /// Defaults to 0.
    pub fn rate(&mut self, rate: u32) -> &mut Builder {
        self.rate = rate;
        self
    }

    /// Sets the rule which produced the decision.
    ///
    /// Defaults to `Source::LocalDefault`.
    pub fn source(&mut self, source: Source) -> &mut Builder {
        self.source = source;
        self
    }

    /// Sets the snapshot of the consulted token bucket.
    ///
    /// Defaults to an empty bucket.
    pub fn bucket(&mut self, capacity: f64, rate: f64) -> &mut Builder {
        self.bucket_capacity = capacity;
        self.bucket_rate = rate;
        self
    }

    /// Sets the status.
    ///
    /// Defaults to `Status::Ok`.
    pub fn status(&mut self, status: Status) -> &mut Builder {
        self.status = status;
        self
    }

    /// Sets the signature validation outcome.
    ///
    /// Defaults to `None`.
    pub fn auth(&mut self, auth: Option<AuthStatus>) -> &mut Builder {
        self.auth = auth;
        self
    }

    /// Sets the trigger trace outcome.
    ///
    /// Defaults to `TriggerTraceStatus::NotRequested`.
    pub fn trigger_trace(&mut self, trigger_trace: TriggerTraceStatus) -> &mut Builder {
        self.trigger_trace = trigger_trace;
        self
    }

    /// Adds a span attribute.
    pub fn attribute<T>(&mut self, key: &str, value: T) -> &mut Builder
    where
        T: Into<Attribute>,
    {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Constructs the `Decision`.
    pub fn build(&self) -> Decision {
        Decision {
            do_sample: self.do_sample,
            do_metrics: self.do_metrics,
            rate: self.rate,
            source: self.source,
            bucket_capacity: self.bucket_capacity,
            bucket_rate: self.bucket_rate,
            status: self.status,
            auth: self.auth,
            trigger_trace: self.trigger_trace,
            attributes: self.attributes.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::SettingsNotAvailable.code(), -1);
        assert_eq!(Status::TracingDisabled.code(), -2);
        assert_eq!(Status::AuthFailed.code(), -3);
        assert_eq!(Status::RateExceeded.code(), -4);
        assert_eq!(Status::TriggerTracingDisabled.code(), -5);
    }

    #[test]
    fn messages() {
        let decision = Decision::builder()
            .status(Status::AuthFailed)
            .auth(Some(AuthStatus::BadSignature))
            .source(Source::AuthFailed)
            .build();

        assert_eq!(decision.status_msg(), "auth-failed");
        assert_eq!(decision.status_code(), -3);
        assert_eq!(decision.auth_msg(), Some("bad-signature"));
        assert_eq!(decision.source().to_string(), "auth-failed");
        assert_eq!(decision.trigger_trace().as_str(), "not-requested");
    }

    #[test]
    fn attributes_keep_insertion_order() {
        let decision = Decision::builder()
            .attribute("SampleRate", 1_000_000i64)
            .attribute("BucketRate", 0.5)
            .attribute("TriggeredTrace", true)
            .attribute("SWKeys", "abc")
            .build();

        let rendered = decision
            .attributes()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>();
        assert_eq!(
            rendered,
            ["SampleRate=1000000", "BucketRate=0.5", "TriggeredTrace=true", "SWKeys=abc"]
        );
    }
}
