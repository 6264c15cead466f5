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

//! Type definitions for trace sampling decisions.
//!
//! This library covers the pieces of the W3C [trace context] that a sampler
//! needs to look at (trace and span IDs, the flags byte and the `tracestate`
//! list) along with the settings flags a remote collector hands out.
//!
//! # Serialization
//!
//! If the `serde` Cargo feature is enabled, `SpanId`, `TraceId` and
//! `TraceFlags` implement `Serialize` and `Deserialize` as lowercase hex
//! strings.
//!
//! [trace context]: https://www.w3.org/TR/trace-context/
#![doc(html_root_url = "https://docs.rs/sampling-types/1.0")]
#![warn(missing_docs)]

#[doc(inline)]
pub use crate::flags::Flags;
#[doc(inline)]
pub use crate::span_context::SpanContext;
#[doc(inline)]
pub use crate::span_id::SpanId;
#[doc(inline)]
pub use crate::trace_flags::TraceFlags;
#[doc(inline)]
pub use crate::trace_id::TraceId;
#[doc(inline)]
pub use crate::trace_state::TraceState;

pub mod flags;
pub mod span_context;
pub mod span_id;
pub mod trace_flags;
pub mod trace_id;
pub mod trace_state;

#[cfg(feature = "serde")]
macro_rules! hex_serde {
    ($ty:ty, $expecting:expr) => {
        const _: () = {
            use serde::de::{Error, Unexpected, Visitor};
            use serde::{Deserialize, Deserializer, Serialize, Serializer};
            use std::fmt;

            impl Serialize for $ty {
                fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
                where
                    S: Serializer,
                {
                    s.collect_str(self)
                }
            }

            impl<'de> Deserialize<'de> for $ty {
                fn deserialize<D>(d: D) -> Result<$ty, D::Error>
                where
                    D: Deserializer<'de>,
                {
                    d.deserialize_str(V)
                }
            }

            struct V;

            impl<'de> Visitor<'de> for V {
                type Value = $ty;

                fn expecting(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt.write_str($expecting)
                }

                fn visit_str<E>(self, v: &str) -> Result<$ty, E>
                where
                    E: Error,
                {
                    v.parse()
                        .map_err(|_| Error::invalid_value(Unexpected::Str(v), &self))
                }
            }
        };
    };
}

#[cfg(feature = "serde")]
pub(crate) use hex_serde;
