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

//! Transaction names.
//!
//! A transaction name can be set from anywhere in the lifetime of a request,
//! long after its entry span started. Names are stored against the entry
//! (root) span of the trace, and any span of the trace resolves to it.
use dashmap::DashMap;
use log::{debug, warn};
use sampling_types::{SpanContext, SpanId, TraceId};
use std::error::Error;
use std::fmt;

/// Returns the name store key for a span.
pub fn key(trace_id: TraceId, span_id: SpanId) -> String {
    format!("{}-{}", trace_id, span_id)
}

fn parse_key(key: &str) -> Option<(TraceId, SpanId)> {
    let (trace_id, span_id) = key.split_once('-')?;
    Some((trace_id.parse().ok()?, span_id.parse().ok()?))
}

/// A concurrent store of transaction names.
///
/// Names are keyed by `"{trace_id}-{span_id}"` of the root span. A second
/// index maps each trace to its root span so that a key built from any span
/// of the trace resolves to the root's entry. Entries never expire on their
/// own; owners remove them when the trace completes.
#[derive(Default)]
pub struct TxnNameManager {
    names: DashMap<String, String>,
    roots: DashMap<TraceId, SpanId>,
}

impl TxnNameManager {
    /// Creates an empty store.
    pub fn new() -> TxnNameManager {
        TxnNameManager::default()
    }

    fn resolve(&self, key: &str) -> String {
        match parse_key(key) {
            Some((trace_id, span_id)) => {
                let root = self.roots.get(&trace_id).map(|r| *r).unwrap_or(span_id);
                self::key(trace_id, root)
            }
            None => key.to_string(),
        }
    }

    /// Sets the name for the trace of a key.
    ///
    /// If the trace has no root yet, the key's span becomes its root. A later
    /// call through any span of the trace replaces the name.
    pub fn set(&self, key: &str, name: &str) {
        let key = match parse_key(key) {
            Some((trace_id, span_id)) => {
                let root = *self.roots.entry(trace_id).or_insert(span_id);
                self::key(trace_id, root)
            }
            None => key.to_string(),
        };

        debug!("setting transaction name for {} to {}", key, name);
        self.names.insert(key, name.to_string());
    }

    /// Returns the name for the trace of a key.
    pub fn get(&self, key: &str) -> Option<String> {
        let key = self.resolve(key);
        self.names.get(&key).map(|name| name.value().clone())
    }

    /// Removes the name for the trace of a key, returning it.
    pub fn del(&self, key: &str) -> Option<String> {
        let key = self.resolve(key);
        self.names.remove(&key).map(|(_, name)| name)
    }

    /// Registers the root span of a trace.
    pub fn set_root(&self, trace_id: TraceId, span_id: SpanId) {
        self.roots.insert(trace_id, span_id);
    }

    /// Returns the root span of a trace.
    pub fn root(&self, trace_id: TraceId) -> Option<SpanId> {
        self.roots.get(&trace_id).map(|r| *r)
    }

    /// Removes the root span of a trace.
    pub fn remove_root(&self, trace_id: TraceId) -> Option<SpanId> {
        self.roots.remove(&trace_id).map(|(_, span_id)| span_id)
    }

    /// Returns the number of stored names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Determines if no names are stored.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Sets the transaction name of the trace a span belongs to.
    ///
    /// The trace must have a registered root.
    pub fn set_transaction_name(
        &self,
        context: &SpanContext,
        name: &str,
    ) -> Result<(), TxnNameError> {
        if name.is_empty() {
            warn!("transaction name must not be empty");
            return Err(TxnNameError(ErrorKind::EmptyName));
        }

        if !context.is_valid() {
            warn!("cannot set transaction name for an invalid span context");
            return Err(TxnNameError(ErrorKind::InvalidContext));
        }

        let root = match self.root(context.trace_id()) {
            Some(root) => root,
            None => {
                warn!("no entry span recorded for trace {}", context.trace_id());
                return Err(TxnNameError(ErrorKind::UnknownTrace));
            }
        };

        self.set(&key(context.trace_id(), root), name);
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ErrorKind {
    EmptyName,
    InvalidContext,
    UnknownTrace,
}

/// The error returned when a transaction name cannot be set.
#[derive(Debug)]
pub struct TxnNameError(ErrorKind);

impl TxnNameError {
    /// Determines if the error was caused by an empty name.
    pub fn is_empty_name(&self) -> bool {
        self.0 == ErrorKind::EmptyName
    }

    /// Determines if the error was caused by a trace with no recorded root.
    pub fn is_unknown_trace(&self) -> bool {
        self.0 == ErrorKind::UnknownTrace
    }
}

impl fmt::Display for TxnNameError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self.0 {
            ErrorKind::EmptyName => "transaction name is empty",
            ErrorKind::InvalidContext => "span context is invalid",
            ErrorKind::UnknownTrace => "no entry span recorded for trace",
        };
        fmt.write_str(msg)
    }
}

impl Error for TxnNameError {}
