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

//! Token bucket rate limiting.
use crate::settings::{BucketSettings, BucketType, Buckets};
use parking_lot::Mutex;
use std::time::Instant;

/// The outcome of an attempt to take a token from a bucket.
///
/// The capacity and rate are captured while the bucket is locked so that
/// diagnostics reflect the exact state the decision was made against.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Consumption {
    /// Whether a token was taken.
    pub consumed: bool,
    /// The capacity of the bucket at the time of the attempt.
    pub capacity: f64,
    /// The refill rate of the bucket at the time of the attempt.
    pub rate: f64,
}

struct State {
    settings: BucketSettings,
    tokens: f64,
    last_refill: Instant,
}

impl State {
    fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + self.settings.rate * elapsed).min(self.settings.capacity);
        self.last_refill = now;
    }
}

/// A lazily refilled token bucket.
///
/// Tokens accumulate at `rate` per second up to `capacity`. Refilling
/// happens on demand right before each attempt to take a token, so an idle
/// bucket costs nothing.
pub struct TokenBucket {
    state: Mutex<State>,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(settings: BucketSettings) -> TokenBucket {
        TokenBucket {
            state: Mutex::new(State {
                settings,
                tokens: settings.capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Changes the capacity and rate of the bucket.
    ///
    /// Time elapsed before the update is accounted for at the old rate. A
    /// change in capacity adds or removes the same number of tokens.
    pub fn update(&self, settings: BucketSettings) {
        self.update_at(settings, Instant::now())
    }

    pub(crate) fn update_at(&self, settings: BucketSettings, now: Instant) {
        let mut state = self.state.lock();
        if state.settings == settings {
            return;
        }

        state.refill(now);
        let difference = settings.capacity - state.settings.capacity;
        state.settings = settings;
        state.tokens = (state.tokens + difference).clamp(0., settings.capacity);
    }

    /// Attempts to take a single token, returning `true` on success.
    pub fn consume(&self) -> bool {
        self.try_consume().consumed
    }

    /// Attempts to take a single token, reporting the bucket state.
    pub fn try_consume(&self) -> Consumption {
        self.try_consume_at(Instant::now())
    }

    pub(crate) fn try_consume_at(&self, now: Instant) -> Consumption {
        let mut state = self.state.lock();
        state.refill(now);

        let consumed = state.tokens >= 1.;
        if consumed {
            state.tokens -= 1.;
        }

        Consumption {
            consumed,
            capacity: state.settings.capacity,
            rate: state.settings.rate,
        }
    }

    /// Returns the current capacity and rate.
    pub fn settings(&self) -> BucketSettings {
        self.state.lock().settings
    }

    /// Returns the number of tokens as of the last refill.
    pub fn tokens(&self) -> f64 {
        self.state.lock().tokens
    }
}

/// The set of token buckets charged by sampling decisions.
///
/// Each bucket is locked independently.
pub struct TokenBucketLimiter {
    default: TokenBucket,
    trigger_strict: TokenBucket,
    trigger_relaxed: TokenBucket,
}

impl Default for TokenBucketLimiter {
    fn default() -> TokenBucketLimiter {
        TokenBucketLimiter::new(&Buckets::default())
    }
}

impl TokenBucketLimiter {
    /// Creates a limiter with full buckets.
    pub fn new(buckets: &Buckets) -> TokenBucketLimiter {
        TokenBucketLimiter {
            default: TokenBucket::new(buckets.default),
            trigger_strict: TokenBucket::new(buckets.trigger_strict),
            trigger_relaxed: TokenBucket::new(buckets.trigger_relaxed),
        }
    }

    /// Returns one of the buckets.
    pub fn bucket(&self, bucket: BucketType) -> &TokenBucket {
        match bucket {
            BucketType::Default => &self.default,
            BucketType::TriggerStrict => &self.trigger_strict,
            BucketType::TriggerRelaxed => &self.trigger_relaxed,
        }
    }

    /// Applies new bucket settings to every bucket.
    pub fn update(&self, buckets: &Buckets) {
        self.default.update(buckets.default);
        self.trigger_strict.update(buckets.trigger_strict);
        self.trigger_relaxed.update(buckets.trigger_relaxed);
    }

    /// Attempts to take a token from one bucket.
    pub fn consume(&self, bucket: BucketType) -> bool {
        self.bucket(bucket).consume()
    }

    /// Attempts to take a token from one bucket, reporting its state.
    pub fn try_consume(&self, bucket: BucketType) -> Consumption {
        self.bucket(bucket).try_consume()
    }
}
