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

//! Span contexts.
use crate::{SpanId, TraceFlags, TraceId, TraceState};

/// A `SpanContext` identifies a span within a distributed trace.
///
/// It consists of a trace ID, the ID of the context's span, the W3C trace
/// flags and the `tracestate` list, along with a marker recording whether
/// the context was received from another process.
///
/// The span context is sent to remote services on requests. For example, it
/// is included in the `traceparent` and `tracestate` headers of HTTP
/// requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    flags: TraceFlags,
    remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// Returns a builder used to construct a `SpanContext`.
    pub fn builder() -> Builder {
        Builder {
            trace_id: None,
            span_id: None,
            flags: TraceFlags::default(),
            remote: false,
            trace_state: TraceState::new(),
        }
    }

    /// Returns the ID of the trace associated with this context.
    #[inline]
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// Returns the ID of the span associated with this context.
    #[inline]
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Returns the trace flags associated with this context.
    #[inline]
    pub fn trace_flags(&self) -> TraceFlags {
        self.flags
    }

    /// Determines if the span associated with this context was sampled.
    #[inline]
    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }

    /// Determines if this context was propagated from another process.
    #[inline]
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Returns the `tracestate` list associated with this context.
    #[inline]
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }

    /// Determines if both the trace and span IDs are valid.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }
}

/// A builder type for `SpanContext`s.
pub struct Builder {
    trace_id: Option<TraceId>,
    span_id: Option<SpanId>,
    flags: TraceFlags,
    remote: bool,
    trace_state: TraceState,
}

impl From<SpanContext> for Builder {
    fn from(c: SpanContext) -> Builder {
        Builder {
            trace_id: Some(c.trace_id),
            span_id: Some(c.span_id),
            flags: c.flags,
            remote: c.remote,
            trace_state: c.trace_state,
        }
    }
}

impl Builder {
    /// Sets the trace ID of this context.
    pub fn trace_id(&mut self, trace_id: TraceId) -> &mut Builder {
        self.trace_id = Some(trace_id);
        self
    }

    /// Sets the ID of the span of this context.
    pub fn span_id(&mut self, span_id: SpanId) -> &mut Builder {
        self.span_id = Some(span_id);
        self
    }

    /// Sets the trace flags of this context.
    ///
    /// Defaults to no flags.
    pub fn trace_flags(&mut self, flags: TraceFlags) -> &mut Builder {
        self.flags = flags;
        self
    }

    /// Sets or clears the `sampled` bit of the trace flags.
    pub fn sampled(&mut self, sampled: bool) -> &mut Builder {
        self.flags = self.flags.with_sampled(sampled);
        self
    }

    /// Marks this context as propagated from another process.
    ///
    /// Defaults to `false`.
    pub fn remote(&mut self, remote: bool) -> &mut Builder {
        self.remote = remote;
        self
    }

    /// Sets the `tracestate` list of this context.
    ///
    /// Defaults to an empty list.
    pub fn trace_state(&mut self, trace_state: TraceState) -> &mut Builder {
        self.trace_state = trace_state;
        self
    }

    /// Constructs a `SpanContext`.
    ///
    /// # Panics
    ///
    /// Panics if `trace_id` or `span_id` was not set.
    pub fn build(&self) -> SpanContext {
        SpanContext {
            trace_id: self.trace_id.expect("trace ID not set"),
            span_id: self.span_id.expect("span ID not set"),
            flags: self.flags,
            remote: self.remote,
            trace_state: self.trace_state.clone(),
        }
    }
}
