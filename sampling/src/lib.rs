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

//! Sampling decisions for distributed traces.
//!
//! A [`DecisionEngine`] decides, for every unit of work, whether it should be
//! sampled. It combines periodically refreshed remote [`Settings`] with the
//! local [`Config`], charges sampled traces against token buckets, validates
//! signed trigger trace requests, and continues decisions made by upstream
//! services through the `sw` trace-state member.
//!
//! The [`TxnNameManager`] lets code running anywhere in a request attach a
//! transaction name to the trace that request belongs to.
//!
//! # Example
//!
//! ```
//! use sampling::{DecisionEngine, Params, SettingsStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SettingsStore::new());
//! let engine = DecisionEngine::builder().build(store);
//!
//! // nothing is sampled until settings have been published
//! let decision = engine.decide(&Params::default());
//! assert!(!decision.do_sample());
//! assert_eq!(decision.status_msg(), "settings-not-available");
//! ```
#![warn(missing_docs)]

#[doc(inline)]
pub use crate::config::Config;
#[doc(inline)]
pub use crate::decision::{Decision, Source, Status, TriggerTraceStatus};
#[doc(inline)]
pub use crate::engine::{DecisionEngine, Params};
#[doc(inline)]
pub use crate::limiter::{TokenBucket, TokenBucketLimiter};
#[doc(inline)]
pub use crate::request_options::{AuthStatus, RequestOptions, Signature};
#[doc(inline)]
pub use crate::sample::Dice;
#[doc(inline)]
pub use crate::settings::{Settings, SettingsError};
#[doc(inline)]
pub use crate::store::SettingsStore;
#[doc(inline)]
pub use crate::txn_name::TxnNameManager;
#[doc(inline)]
pub use sampling_types::{Flags, SpanContext, SpanId, TraceFlags, TraceId, TraceState};

pub mod codec;
pub mod config;
pub mod counters;
pub mod decision;
pub mod engine;
pub mod file;
pub mod limiter;
pub mod request_options;
pub mod sample;
pub mod settings;
pub mod store;
pub mod txn_name;
