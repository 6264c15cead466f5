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

//! Sampling settings.
//!
//! Settings are handed out by the collector as a small JSON document and
//! combined with the local configuration before every decision.
use sampling_types::Flags;
use serde::Deserialize;
use std::error;
use std::fmt;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

/// The denominator of sample rates: rates are expressed in parts per million.
pub const DICE_SCALE: u32 = 1_000_000;

/// Where the sample rate of a decision came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SampleSource {
    /// Built-in defaults; no remote settings were involved.
    LocalDefault,
    /// Settings fetched from the collector.
    Remote,
}

impl SampleSource {
    /// Returns the numeric code reported in the `SampleSource` span attribute.
    pub fn code(&self) -> i64 {
        match self {
            SampleSource::LocalDefault => 2,
            SampleSource::Remote => 6,
        }
    }
}

/// A local override of a remote setting.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Force the capability on.
    Enabled,
    /// Force the capability off.
    Disabled,
    /// Defer to the remote settings.
    #[default]
    Unset,
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D>(d: D) -> Result<Mode, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Str(String),
        }

        match Raw::deserialize(d)? {
            Raw::Bool(true) => Ok(Mode::Enabled),
            Raw::Bool(false) => Ok(Mode::Disabled),
            Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Mode, String> {
        match &*s.trim().to_ascii_lowercase() {
            "enabled" | "always" | "true" => Ok(Mode::Enabled),
            "disabled" | "never" | "false" => Ok(Mode::Disabled),
            "" | "unset" => Ok(Mode::Unset),
            other => Err(format!("invalid mode `{}`", other)),
        }
    }
}

/// The local tracing mode.
pub type TracingMode = Mode;

/// The local trigger trace mode.
pub type TriggerTraceMode = Mode;

/// Settings coming from the local configuration.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LocalSettings {
    /// Whether tracing is forced on or off.
    pub tracing_mode: TracingMode,
    /// Whether trigger trace requests are forced on or off.
    pub trigger_trace: TriggerTraceMode,
}

/// The three token buckets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BucketType {
    /// Charged by sampled traces started by the dice roll.
    Default,
    /// Charged by signed trigger trace requests.
    TriggerStrict,
    /// Charged by unsigned trigger trace requests.
    TriggerRelaxed,
}

/// The capacity and refill rate of a token bucket.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct BucketSettings {
    /// The maximum number of tokens the bucket holds.
    pub capacity: f64,
    /// The number of tokens added per second.
    pub rate: f64,
}

impl BucketSettings {
    /// Creates bucket settings, clamping negative values to zero.
    pub fn new(capacity: f64, rate: f64) -> BucketSettings {
        BucketSettings {
            capacity: capacity.max(0.),
            rate: rate.max(0.),
        }
    }
}

/// Bucket settings for every `BucketType`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Buckets {
    /// Settings of the default bucket.
    pub default: BucketSettings,
    /// Settings of the strict trigger trace bucket.
    pub trigger_strict: BucketSettings,
    /// Settings of the relaxed trigger trace bucket.
    pub trigger_relaxed: BucketSettings,
}

impl Buckets {
    /// Returns the settings of one bucket.
    pub fn get(&self, bucket: BucketType) -> BucketSettings {
        match bucket {
            BucketType::Default => self.default,
            BucketType::TriggerStrict => self.trigger_strict,
            BucketType::TriggerRelaxed => self.trigger_relaxed,
        }
    }
}

/// A snapshot of the sampling settings.
///
/// Settings are immutable: a refresh publishes a whole new value rather than
/// modifying the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    tracing_mode: TracingMode,
    sample_rate: u32,
    sample_source: SampleSource,
    flags: Flags,
    buckets: Buckets,
    signature_key: Option<Vec<u8>>,
    timestamp: u64,
    ttl: u64,
    warning: Option<String>,
}

impl Default for Settings {
    /// The fail-closed settings used before any settings have been fetched.
    fn default() -> Settings {
        Settings::builder().build()
    }
}

#[derive(Deserialize)]
struct Payload {
    value: f64,
    flags: String,
    timestamp: u64,
    ttl: u64,
    arguments: Arguments,
    #[serde(default)]
    warning: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Arguments {
    bucket_capacity: f64,
    bucket_rate: f64,
    trigger_relaxed_bucket_capacity: f64,
    trigger_relaxed_bucket_rate: f64,
    #[serde(default)]
    trigger_strict_bucket_capacity: Option<f64>,
    #[serde(default)]
    trigger_strict_bucket_rate: Option<f64>,
    #[serde(default)]
    signature_key: Option<String>,
}

impl Settings {
    /// Returns a builder used to construct `Settings`.
    pub fn builder() -> Builder {
        Builder {
            tracing_mode: TracingMode::Unset,
            sample_rate: 0,
            sample_source: SampleSource::LocalDefault,
            flags: Flags::none(),
            buckets: Buckets::default(),
            signature_key: None,
            timestamp: 0,
            ttl: 0,
            warning: None,
        }
    }

    /// Parses a settings payload as returned by the collector.
    ///
    /// Every required field must be present and well-typed; nothing is
    /// returned for a partially valid payload.
    pub fn from_json(value: &serde_json::Value) -> Result<Settings, SettingsError> {
        let payload = Payload::deserialize(value).map_err(|e| SettingsError(ErrorInner::Json(e)))?;

        if !payload.value.is_finite() {
            return Err(SettingsError(ErrorInner::Invalid("value is not a finite number")));
        }

        let args = payload.arguments;
        let default = BucketSettings::new(args.bucket_capacity, args.bucket_rate);
        let trigger_strict = match (
            args.trigger_strict_bucket_capacity,
            args.trigger_strict_bucket_rate,
        ) {
            (Some(capacity), Some(rate)) => BucketSettings::new(capacity, rate),
            _ => default,
        };
        let trigger_relaxed = BucketSettings::new(
            args.trigger_relaxed_bucket_capacity,
            args.trigger_relaxed_bucket_rate,
        );

        Ok(Settings {
            tracing_mode: TracingMode::Unset,
            sample_rate: payload.value.clamp(0., DICE_SCALE as f64) as u32,
            sample_source: SampleSource::Remote,
            flags: Flags::parse_list(&payload.flags),
            buckets: Buckets {
                default,
                trigger_strict,
                trigger_relaxed,
            },
            signature_key: args.signature_key.map(String::into_bytes),
            timestamp: payload.timestamp,
            ttl: payload.ttl,
            warning: payload.warning,
        })
    }

    /// Combines these settings with the local configuration.
    ///
    /// A local tracing mode replaces the remote flags and a local trigger
    /// trace mode sets or clears `TRIGGERED_TRACE`. If the remote flags carry
    /// `OVERRIDE`, the local configuration can only take capabilities away.
    pub fn merge(&self, local: &LocalSettings) -> Settings {
        let mut flags = match local.tracing_mode {
            Mode::Enabled => Flags::SampleStart | Flags::SampleThroughAlways,
            Mode::Disabled => Flags::none(),
            Mode::Unset => self.flags,
        };

        match local.trigger_trace {
            Mode::Enabled => flags = flags | Flags::TriggeredTrace,
            Mode::Disabled => flags = flags & !Flags::TriggeredTrace,
            Mode::Unset => {}
        }

        if self.flags.contains(Flags::Override) {
            flags = (flags & self.flags) | Flags::Override;
        }

        Settings {
            tracing_mode: local.tracing_mode,
            flags,
            ..self.clone()
        }
    }

    /// Returns the local tracing mode these settings were merged with.
    #[inline]
    pub fn tracing_mode(&self) -> TracingMode {
        self.tracing_mode
    }

    /// Returns the sample rate, in parts per million.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns where the sample rate came from.
    #[inline]
    pub fn sample_source(&self) -> SampleSource {
        self.sample_source
    }

    /// Returns the settings flags.
    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Determines if new traces may be started.
    #[inline]
    pub fn tracing_enabled(&self) -> bool {
        self.flags.contains(Flags::SampleStart)
    }

    /// Returns the token bucket settings.
    #[inline]
    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    /// Returns the secret used to sign trigger trace requests.
    #[inline]
    pub fn signature_key(&self) -> Option<&[u8]> {
        self.signature_key.as_deref()
    }

    /// Returns the time the settings were issued, in seconds since the epoch.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns how long the settings stay fresh, in seconds.
    #[inline]
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Returns the diagnostic message attached by the collector, if any.
    #[inline]
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    /// Returns the time after which the settings are stale, in seconds since
    /// the epoch.
    pub fn expiry(&self) -> u64 {
        self.timestamp.saturating_add(self.ttl)
    }

    /// Determines if the settings are stale at the given time.
    ///
    /// Stale settings are still used until they are replaced.
    pub fn is_stale_at(&self, now: SystemTime) -> bool {
        unix_secs(now) > self.expiry()
    }

    /// Determines if the settings are stale now.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(SystemTime::now())
    }
}

pub(crate) fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A builder type for `Settings`.
pub struct Builder {
    tracing_mode: TracingMode,
    sample_rate: u32,
    sample_source: SampleSource,
    flags: Flags,
    buckets: Buckets,
    signature_key: Option<Vec<u8>>,
    timestamp: u64,
    ttl: u64,
    warning: Option<String>,
}

impl Builder {
    /// Sets the local tracing mode.
    ///
    /// Defaults to `Unset`.
    pub fn tracing_mode(&mut self, tracing_mode: TracingMode) -> &mut Builder {
        self.tracing_mode = tracing_mode;
        self
    }

    /// Sets the sample rate in parts per million, clamped to `DICE_SCALE`.
    ///
    /// Defaults to 0.
    pub fn sample_rate(&mut self, sample_rate: u32) -> &mut Builder {
        self.sample_rate = sample_rate.min(DICE_SCALE);
        self
    }

    /// Sets the source of the sample rate.
    ///
    /// Defaults to `LocalDefault`.
    pub fn sample_source(&mut self, sample_source: SampleSource) -> &mut Builder {
        self.sample_source = sample_source;
        self
    }

    /// Sets the settings flags.
    ///
    /// Defaults to none.
    pub fn flags(&mut self, flags: Flags) -> &mut Builder {
        self.flags = flags;
        self
    }

    /// Sets the settings of one token bucket.
    ///
    /// Buckets default to a capacity and rate of 0.
    pub fn bucket(&mut self, bucket: BucketType, settings: BucketSettings) -> &mut Builder {
        match bucket {
            BucketType::Default => self.buckets.default = settings,
            BucketType::TriggerStrict => self.buckets.trigger_strict = settings,
            BucketType::TriggerRelaxed => self.buckets.trigger_relaxed = settings,
        }
        self
    }

    /// Sets the trigger trace signature secret.
    pub fn signature_key(&mut self, key: &[u8]) -> &mut Builder {
        self.signature_key = Some(key.to_vec());
        self
    }

    /// Sets the time the settings were issued, in seconds since the epoch.
    pub fn timestamp(&mut self, timestamp: u64) -> &mut Builder {
        self.timestamp = timestamp;
        self
    }

    /// Sets how long the settings stay fresh, in seconds.
    pub fn ttl(&mut self, ttl: u64) -> &mut Builder {
        self.ttl = ttl;
        self
    }

    /// Attaches a diagnostic message.
    pub fn warning(&mut self, warning: &str) -> &mut Builder {
        self.warning = Some(warning.to_string());
        self
    }

    /// Constructs `Settings`.
    pub fn build(&self) -> Settings {
        Settings {
            tracing_mode: self.tracing_mode,
            sample_rate: self.sample_rate,
            sample_source: self.sample_source,
            flags: self.flags,
            buckets: self.buckets,
            signature_key: self.signature_key.clone(),
            timestamp: self.timestamp,
            ttl: self.ttl,
            warning: self.warning.clone(),
        }
    }
}

/// The error returned when settings cannot be loaded.
#[derive(Debug)]
pub struct SettingsError(ErrorInner);

#[derive(Debug)]
enum ErrorInner {
    Json(serde_json::Error),
    Io(io::Error),
    Invalid(&'static str),
}

impl SettingsError {
    pub(crate) fn io(e: io::Error) -> SettingsError {
        SettingsError(ErrorInner::Io(e))
    }

    pub(crate) fn json(e: serde_json::Error) -> SettingsError {
        SettingsError(ErrorInner::Json(e))
    }

    pub(crate) fn invalid(msg: &'static str) -> SettingsError {
        SettingsError(ErrorInner::Invalid(msg))
    }

    /// True if the payload was malformed, rather than unreadable.
    pub fn is_invalid(&self) -> bool {
        !matches!(self.0, ErrorInner::Io(_))
    }
}

impl fmt::Display for SettingsError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ErrorInner::Json(ref e) => write!(fmt, "invalid settings: {}", e),
            ErrorInner::Io(ref e) => write!(fmt, "error reading settings: {}", e),
            ErrorInner::Invalid(msg) => write!(fmt, "invalid settings: {}", msg),
        }
    }
}

impl error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.0 {
            ErrorInner::Json(ref e) => Some(e),
            ErrorInner::Io(ref e) => Some(e),
            ErrorInner::Invalid(_) => None,
        }
    }
}
