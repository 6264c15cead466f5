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
//! Counters describing sampling decisions.
//!
//! The counters are registered with whichever `metrics` recorder is
//! installed when the engine is built. Exporting them is up to that recorder.
use metrics::{counter, Counter};

/// Decisions made for spans without a local parent.
pub const REQUEST_COUNT: &str = "trace.service.request_count";
/// Decisions which rolled the dice.
pub const SAMPLE_COUNT: &str = "trace.service.samplecount";
/// Decisions which sampled the trace.
pub const TRACE_COUNT: &str = "trace.service.tracecount";
/// Sampled decisions continued from an upstream service.
pub const THROUGH_TRACE_COUNT: &str = "trace.service.through_trace_count";
/// Sampled trigger trace requests.
pub const TRIGGERED_TRACE_COUNT: &str = "trace.service.triggered_trace_count";
/// Winning dice rolls rejected by the default bucket.
pub const TOKEN_BUCKET_EXHAUSTION_COUNT: &str = "trace.service.tokenbucket_exhaustion_count";

pub(crate) struct Counters {
    pub(crate) request: Counter,
    pub(crate) sample: Counter,
    pub(crate) trace: Counter,
    pub(crate) through_trace: Counter,
    pub(crate) triggered_trace: Counter,
    pub(crate) token_bucket_exhaustion: Counter,
}

impl Counters {
    pub(crate) fn register() -> Counters {
        Counters {
            request: counter!(REQUEST_COUNT),
            sample: counter!(SAMPLE_COUNT),
            trace: counter!(TRACE_COUNT),
            through_trace: counter!(THROUGH_TRACE_COUNT),
            triggered_trace: counter!(TRIGGERED_TRACE_COUNT),
            token_bucket_exhaustion: counter!(TOKEN_BUCKET_EXHAUSTION_COUNT),
        }
    }
}
