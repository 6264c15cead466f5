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

//! The sampling decision engine.
use log::debug;
use parking_lot::Mutex;
use sampling_types::{Flags, SpanContext};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::codec;
use crate::config::Config;
use crate::counters::Counters;
use crate::decision::{self, Decision, Source, Status, TriggerTraceStatus};
use crate::limiter::TokenBucketLimiter;
use crate::request_options::{RequestOptions, Signature};
use crate::sample::{Dice, RandomDice};
use crate::settings::{BucketType, Settings};
use crate::store::SettingsStore;

/// Span attribute holding the sample rate.
pub const SAMPLE_RATE_ATTRIBUTE: &str = "SampleRate";
/// Span attribute holding the sample source code.
pub const SAMPLE_SOURCE_ATTRIBUTE: &str = "SampleSource";
/// Span attribute holding the consulted bucket capacity.
pub const BUCKET_CAPACITY_ATTRIBUTE: &str = "BucketCapacity";
/// Span attribute holding the consulted bucket rate.
pub const BUCKET_RATE_ATTRIBUTE: &str = "BucketRate";
/// Span attribute marking triggered traces.
pub const TRIGGERED_TRACE_ATTRIBUTE: &str = "TriggeredTrace";
/// Span attribute holding the `sw-keys` request option.
pub const SW_KEYS_ATTRIBUTE: &str = "SWKeys";
/// Span attribute holding the span id of a continued upstream decision.
pub const PARENT_ID_ATTRIBUTE: &str = "sw.tracestate_parent_id";

// applied settings timestamp plus one, zero before any
const NOT_APPLIED: u64 = 0;

/// The inputs of a single sampling decision.
#[derive(Debug, Default, Copy, Clone)]
pub struct Params<'a> {
    /// The context of the parent span, if any.
    pub parent: Option<&'a SpanContext>,
    /// The trigger trace options sent with the request, if any.
    pub options: Option<&'a RequestOptions>,
    /// The identifier matched against transaction settings.
    pub transaction: Option<&'a str>,
}

struct Inner {
    store: Arc<SettingsStore>,
    limiter: TokenBucketLimiter,
    applied: AtomicU64,
    resync: Mutex<()>,
    counters: Counters,
    config: Config,
    dice: Box<dyn Dice>,
}

/// Makes sampling decisions.
///
/// The engine reads the latest published settings on every decision and
/// never blocks on their refresh. It is cheap to clone and meant to be shared
/// by every thread tracing requests.
#[derive(Clone)]
pub struct DecisionEngine(Arc<Inner>);

impl DecisionEngine {
    /// Creates a `DecisionEngine` builder.
    pub fn builder() -> Builder {
        Builder {
            config: None,
            dice: None,
        }
    }

    /// Returns the settings store consulted by the engine.
    pub fn store(&self) -> &Arc<SettingsStore> {
        &self.0.store
    }

    /// Returns the local configuration.
    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Returns the token buckets charged by the engine.
    pub fn limiter(&self) -> &TokenBucketLimiter {
        &self.0.limiter
    }

    /// Parses trigger trace request options, validating any signature with
    /// the key from the current settings.
    pub fn request_options(&self, header: &str, signature: Option<&str>) -> RequestOptions {
        let settings = self.0.store.current();
        let key = settings.as_ref().and_then(|s| s.signature_key());
        RequestOptions::parse(header, signature, key)
    }

    /// Makes a sampling decision.
    pub fn decide(&self, params: &Params<'_>) -> Decision {
        if let Some(parent) = params.parent {
            if parent.is_valid() && !parent.is_remote() {
                debug!("local parent span; inheriting sampled flag");
                return self.parent_local(parent, params.options);
            }
        }

        self.0.counters.request.increment(1);

        let remote = match self.0.store.current() {
            Some(settings) => settings,
            None => {
                debug!("settings unavailable; sampling disabled");
                return settings_unavailable(params.options);
            }
        };

        if remote.is_stale() {
            debug!(
                "settings with timestamp {} are stale; using them anyway",
                remote.timestamp()
            );
        }

        self.sync_limiter(&remote);
        let settings = remote.merge(&self.0.config.local_settings(params.transaction));
        self.decide_with(&settings, params)
    }

    // Only ever moves forward; a snapshot older than the applied one is ignored.
    fn sync_limiter(&self, settings: &Settings) {
        let stamp = settings.timestamp().saturating_add(1);
        if self.0.applied.load(Ordering::Acquire) >= stamp {
            return;
        }

        let _guard = self.0.resync.lock();
        if self.0.applied.load(Ordering::Acquire) >= stamp {
            return;
        }
        debug!("applying bucket settings {:?}", settings.buckets());
        self.0.limiter.update(settings.buckets());
        self.0.applied.store(stamp, Ordering::Release);
    }

    fn decide_with(&self, settings: &Settings, params: &Params<'_>) -> Decision {
        let options = params.options;
        let trigger_requested = options.map_or(false, |o| o.trigger_trace());
        let mut decision = Decision::builder();
        let default_bucket = settings.buckets().default;
        decision
            .rate(settings.sample_rate())
            .bucket(default_bucket.capacity, default_bucket.rate)
            .auth(options.and_then(|o| o.signature().auth_status()));

        if !settings.tracing_enabled() {
            debug!("SAMPLE_START is unset; tracing disabled");
            if trigger_requested {
                decision.trigger_trace(TriggerTraceStatus::TracingDisabled);
            }
            return decision
                .source(Source::LocalDefault)
                .status(Status::TracingDisabled)
                .build();
        }

        if let Some(options) = options {
            if let Signature::Invalid(auth) = options.signature() {
                debug!("trigger trace signature invalid: {}", auth);
                return decision
                    .source(Source::AuthFailed)
                    .status(Status::AuthFailed)
                    .build();
            }

            if let Some(sw_keys) = options.sw_keys() {
                decision.attribute(SW_KEYS_ATTRIBUTE, sw_keys);
            }
            for (key, value) in options.custom_kvs() {
                decision.attribute(key, value.as_str());
            }

            if options.trigger_trace() {
                let bucket = match options.signature() {
                    Signature::Valid => BucketType::TriggerStrict,
                    _ => BucketType::TriggerRelaxed,
                };
                return self.trigger_trace(settings, bucket, &mut decision);
            }
        }

        decision.do_metrics(true);

        if let Some(parent) = params.parent {
            if parent.is_valid() && parent.is_remote() {
                if let Some(member) = codec::decode(parent.trace_state()) {
                    return self.continuation(settings, &member, &mut decision);
                }
            }
        }

        self.dice_roll(settings, &mut decision)
    }

    fn parent_local(&self, parent: &SpanContext, options: Option<&RequestOptions>) -> Decision {
        let mut decision = Decision::builder();
        decision
            .do_sample(parent.is_sampled())
            .source(Source::ParentLocal);
        if options.map_or(false, |o| o.trigger_trace()) {
            decision.trigger_trace(TriggerTraceStatus::Ignored);
        }
        decision.build()
    }

    fn trigger_trace(
        &self,
        settings: &Settings,
        bucket: BucketType,
        decision: &mut decision::Builder,
    ) -> Decision {
        let source = match bucket {
            BucketType::TriggerStrict => Source::TriggerTraceStrict,
            _ => Source::TriggerTraceRelaxed,
        };
        decision.do_metrics(true).source(source);

        if !settings.flags().contains(Flags::TriggeredTrace) {
            debug!("TRIGGERED_TRACE is unset; trigger tracing disabled");
            return decision
                .status(Status::TriggerTracingDisabled)
                .trigger_trace(TriggerTraceStatus::TriggerTracingDisabled)
                .build();
        }

        let consumption = self.0.limiter.try_consume(bucket);
        decision
            .bucket(consumption.capacity, consumption.rate)
            .attribute(TRIGGERED_TRACE_ATTRIBUTE, true)
            .attribute(BUCKET_CAPACITY_ATTRIBUTE, consumption.capacity)
            .attribute(BUCKET_RATE_ATTRIBUTE, consumption.rate);

        if consumption.consumed {
            debug!("sufficient capacity in {:?} bucket; sampling", bucket);
            self.0.counters.triggered_trace.increment(1);
            self.0.counters.trace.increment(1);
            decision
                .do_sample(true)
                .trigger_trace(TriggerTraceStatus::Ok)
                .build()
        } else {
            debug!("insufficient capacity in {:?} bucket", bucket);
            decision
                .status(Status::RateExceeded)
                .trigger_trace(TriggerTraceStatus::RateExceeded)
                .build()
        }
    }

    fn continuation(
        &self,
        settings: &Settings,
        member: &codec::SwMember,
        decision: &mut decision::Builder,
    ) -> Decision {
        decision
            .source(Source::TracestateContinuation)
            .attribute(PARENT_ID_ATTRIBUTE, member.span_id().to_string());

        if !settings.flags().contains(Flags::SampleThroughAlways) {
            debug!("SAMPLE_THROUGH_ALWAYS is unset; not sampling");
            return decision.build();
        }

        debug!("continuing upstream decision {}", member.is_sampled());
        if member.is_sampled() {
            self.0.counters.trace.increment(1);
            self.0.counters.through_trace.increment(1);
        }
        decision.do_sample(member.is_sampled()).build()
    }

    fn dice_roll(&self, settings: &Settings, decision: &mut decision::Builder) -> Decision {
        let rate = settings.sample_rate();
        decision
            .source(Source::from(settings.sample_source()))
            .attribute(SAMPLE_RATE_ATTRIBUTE, i64::from(rate))
            .attribute(SAMPLE_SOURCE_ATTRIBUTE, settings.sample_source().code());
        self.0.counters.sample.increment(1);

        if !self.0.dice.roll(rate) {
            debug!("dice roll failed at rate {}", rate);
            return decision.build();
        }

        let consumption = self.0.limiter.try_consume(BucketType::Default);
        decision
            .bucket(consumption.capacity, consumption.rate)
            .attribute(BUCKET_CAPACITY_ATTRIBUTE, consumption.capacity)
            .attribute(BUCKET_RATE_ATTRIBUTE, consumption.rate);

        if consumption.consumed {
            debug!("dice roll succeeded; sampling");
            self.0.counters.trace.increment(1);
            decision.do_sample(true).build()
        } else {
            debug!("dice roll succeeded but the default bucket is empty");
            self.0.counters.token_bucket_exhaustion.increment(1);
            decision.status(Status::RateExceeded).build()
        }
    }
}

fn settings_unavailable(options: Option<&RequestOptions>) -> Decision {
    let mut decision = Decision::builder();
    decision
        .source(Source::LocalDefault)
        .status(Status::SettingsNotAvailable)
        .auth(options.and_then(|o| o.signature().auth_status()));
    if options.map_or(false, |o| o.trigger_trace()) {
        decision.trigger_trace(TriggerTraceStatus::SettingsNotAvailable);
    }
    decision.build()
}

/// A builder type for `DecisionEngine`s.
pub struct Builder {
    config: Option<Config>,
    dice: Option<Box<dyn Dice>>,
}

impl Builder {
    /// Sets the local configuration.
    ///
    /// Defaults to `Config::default()`.
    pub fn config(&mut self, config: Config) -> &mut Builder {
        self.config = Some(config);
        self
    }

    /// Sets the dice used for rate based sampling.
    ///
    /// Defaults to `RandomDice`.
    pub fn dice(&mut self, dice: Box<dyn Dice>) -> &mut Builder {
        self.dice = Some(dice);
        self
    }

    /// Constructs a new `DecisionEngine`.
    ///
    /// Sampling counters are registered with the `metrics` recorder in scope.
    pub fn build(&mut self, store: Arc<SettingsStore>) -> DecisionEngine {
        let inner = Inner {
            store,
            limiter: TokenBucketLimiter::default(),
            applied: AtomicU64::new(NOT_APPLIED),
            resync: Mutex::new(()),
            counters: Counters::register(),
            config: self.config.take().unwrap_or_default(),
            dice: self.dice.take().unwrap_or_else(|| Box::new(RandomDice)),
        };

        DecisionEngine(Arc::new(inner))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::counters::*;
    use crate::request_options::AuthStatus;
    use crate::sample::{AlwaysDice, NeverDice};
    use crate::settings::{BucketSettings, Mode, SampleSource, DICE_SCALE};
    use data_encoding::HEXLOWER;
    use hmac::{Hmac, Mac};
    use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
    use sampling_types::{SpanId, TraceId, TraceState};
    use sha1::Sha1;
    use std::collections::HashMap;
    use std::time::SystemTime;

    const KEY: &[u8] = b"8mZ98ZnZhhggcsUmdMbS";

    fn flags() -> Flags {
        Flags::SampleStart | Flags::SampleThroughAlways | Flags::TriggeredTrace
    }

    fn settings(flags: Flags) -> Settings {
        Settings::builder()
            .sample_rate(DICE_SCALE)
            .sample_source(SampleSource::Remote)
            .flags(flags)
            .bucket(BucketType::Default, BucketSettings::new(10., 0.))
            .bucket(BucketType::TriggerStrict, BucketSettings::new(10., 0.))
            .bucket(BucketType::TriggerRelaxed, BucketSettings::new(10., 0.))
            .signature_key(KEY)
            .timestamp(now())
            .ttl(120)
            .build()
    }

    fn engine(settings: Settings, dice: Box<dyn Dice>) -> DecisionEngine {
        DecisionEngine::builder()
            .dice(dice)
            .build(Arc::new(SettingsStore::with_settings(settings)))
    }

    fn now() -> u64 {
        crate::settings::unix_secs(SystemTime::now())
    }

    fn sign(header: &str) -> String {
        let mut mac = Hmac::<Sha1>::new_from_slice(KEY).unwrap();
        mac.update(header.as_bytes());
        HEXLOWER.encode(&mac.finalize().into_bytes())
    }

    fn remote_parent(trace_state: &str) -> SpanContext {
        SpanContext::builder()
            .trace_id(TraceId::from([1; 16]))
            .span_id(SpanId::from([2; 8]))
            .remote(true)
            .trace_state(TraceState::parse(trace_state))
            .build()
    }

    fn counters(snapshotter: &Snapshotter) -> HashMap<String, u64> {
        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(value) => Some((key.key().name().to_string(), value)),
                _ => None,
            })
            .collect()
    }

    fn decide(engine: &DecisionEngine, options: Option<&RequestOptions>) -> Decision {
        engine.decide(&Params {
            options,
            ..Params::default()
        })
    }

    #[test]
    fn full_rate_always_samples() {
        let engine = engine(settings(flags()), Box::new(RandomDice));
        for _ in 0..10 {
            let decision = decide(&engine, None);
            assert!(decision.do_sample());
            assert!(decision.do_metrics());
            assert_eq!(decision.source(), Source::RemoteSetting);
            assert_eq!(decision.rate(), DICE_SCALE);
        }
    }

    #[test]
    fn no_settings_fails_closed() {
        let engine = DecisionEngine::builder()
            .dice(Box::new(AlwaysDice))
            .build(Arc::new(SettingsStore::new()));
        let options = RequestOptions::parse("trigger-trace", None, None);

        let decision = decide(&engine, Some(&options));
        assert!(!decision.do_sample());
        assert!(!decision.do_metrics());
        assert_eq!(decision.status(), Status::SettingsNotAvailable);
        assert_eq!(
            decision.trigger_trace(),
            TriggerTraceStatus::SettingsNotAvailable
        );
    }

    #[test]
    fn tracing_disabled() {
        let engine = engine(settings(Flags::none()), Box::new(AlwaysDice));
        let options = RequestOptions::parse("trigger-trace", None, None);

        let decision = decide(&engine, Some(&options));
        assert!(!decision.do_sample());
        assert!(!decision.do_metrics());
        assert_eq!(decision.source(), Source::LocalDefault);
        assert_eq!(decision.status_msg(), "tracing-disabled");
        assert_eq!(decision.trigger_trace(), TriggerTraceStatus::TracingDisabled);
    }

    #[test]
    fn local_tracing_mode_overrides_remote() {
        let config = Config::builder().tracing_mode(Mode::Disabled).build();
        let engine = DecisionEngine::builder()
            .config(config)
            .dice(Box::new(AlwaysDice))
            .build(Arc::new(SettingsStore::with_settings(settings(flags()))));

        let decision = decide(&engine, None);
        assert_eq!(decision.status(), Status::TracingDisabled);
    }

    #[test]
    fn auth_failure_wins_over_available_tokens() {
        let engine = engine(settings(flags()), Box::new(AlwaysDice));

        let header = format!("trigger-trace;ts={}", now());
        let options = engine.request_options(&header, Some("0000000000000000000000000000000000000000"));

        for _ in 0..3 {
            let decision = decide(&engine, Some(&options));
            assert!(!decision.do_sample());
            assert!(!decision.do_metrics());
            assert_eq!(decision.status_msg(), "auth-failed");
            assert_eq!(decision.auth_msg(), Some("bad-signature"));
        }

        // the bucket was never charged
        assert_eq!(
            engine.limiter().bucket(BucketType::TriggerStrict).tokens(),
            10.
        );
    }

    #[test]
    fn bad_signature_without_trigger_trace_is_rejected() {
        let engine = engine(settings(flags()), Box::new(AlwaysDice));
        let header = format!("sw-keys=abc;ts={}", now());
        let options = engine.request_options(&header, Some("abcdef"));

        let decision = decide(&engine, Some(&options));
        assert!(!decision.do_sample());
        assert_eq!(decision.status(), Status::AuthFailed);
    }

    #[test]
    fn replayed_signature_is_rejected() {
        let engine = engine(settings(flags()), Box::new(AlwaysDice));
        let header = format!("trigger-trace;ts={}", now() - 600);
        let options = engine.request_options(&header, Some(&sign(&header)));

        let decision = decide(&engine, Some(&options));
        assert!(!decision.do_sample());
        assert_eq!(decision.auth(), Some(AuthStatus::BadTimestamp));
    }

    #[test]
    fn signed_trigger_trace_uses_strict_bucket() {
        let settings = Settings::builder()
            .flags(flags())
            .bucket(BucketType::TriggerStrict, BucketSettings::new(1., 0.))
            .bucket(BucketType::TriggerRelaxed, BucketSettings::new(5., 0.))
            .signature_key(KEY)
            .timestamp(now())
            .build();
        let engine = engine(settings, Box::new(NeverDice));

        let header = format!("trigger-trace;ts={}", now());
        let options = engine.request_options(&header, Some(&sign(&header)));
        assert_eq!(options.signature(), Signature::Valid);

        let decision = decide(&engine, Some(&options));
        assert!(decision.do_sample());
        assert_eq!(decision.source(), Source::TriggerTraceStrict);
        assert_eq!(decision.auth_msg(), Some("ok"));
        assert_eq!(decision.bucket_capacity(), 1.);

        let decision = decide(&engine, Some(&options));
        assert!(!decision.do_sample());
        assert_eq!(decision.status_msg(), "rate-exceeded");
        assert_eq!(decision.trigger_trace(), TriggerTraceStatus::RateExceeded);
    }

    #[test]
    fn unsigned_trigger_trace_uses_relaxed_bucket() {
        let settings = Settings::builder()
            .flags(flags())
            .bucket(BucketType::TriggerRelaxed, BucketSettings::new(1., 0.))
            .timestamp(now())
            .build();
        let engine = engine(settings, Box::new(NeverDice));

        let header = format!("trigger-trace;ts={};custom-key=42", now());
        let options = engine.request_options(&header, None);

        let decision = decide(&engine, Some(&options));
        assert!(decision.do_sample());
        assert_eq!(decision.source(), Source::TriggerTraceRelaxed);
        assert_eq!(decision.trigger_trace(), TriggerTraceStatus::Ok);
        assert_eq!(
            decision.attributes().get("custom-key"),
            Some(&decision::Attribute::from("42"))
        );
        assert_eq!(
            decision.attributes().get(TRIGGERED_TRACE_ATTRIBUTE),
            Some(&decision::Attribute::Bool(true))
        );

        let decision = decide(&engine, Some(&options));
        assert!(!decision.do_sample());
        assert_eq!(decision.status_msg(), "rate-exceeded");
    }

    #[test]
    fn trigger_tracing_disabled() {
        let options = RequestOptions::parse("trigger-trace", None, None);

        let config = Config::builder().trigger_trace(Mode::Disabled).build();
        let local = DecisionEngine::builder()
            .config(config)
            .dice(Box::new(AlwaysDice))
            .build(Arc::new(SettingsStore::with_settings(settings(flags()))));

        // remote override takes away what the local configuration enables
        let remote = engine_always(settings(
            Flags::Override | Flags::SampleStart | Flags::SampleThroughAlways,
        ));

        for engine in &[local, remote] {
            let decision = decide(engine, Some(&options));
            assert!(!decision.do_sample());
            assert!(decision.do_metrics());
            assert_eq!(decision.status(), Status::TriggerTracingDisabled);
            assert_eq!(
                decision.trigger_trace(),
                TriggerTraceStatus::TriggerTracingDisabled
            );
        }
    }

    #[test]
    fn continuation_preserves_upstream_decision() {
        let engine = engine(settings(flags()), Box::new(NeverDice));

        let parent = remote_parent("sw=0123456789abcdef-01");
        let decision = engine.decide(&Params {
            parent: Some(&parent),
            ..Params::default()
        });
        assert!(decision.do_sample());
        assert!(decision.do_metrics());
        assert_eq!(decision.source(), Source::TracestateContinuation);
        assert_eq!(
            decision.attributes().get(PARENT_ID_ATTRIBUTE),
            Some(&decision::Attribute::from("0123456789abcdef"))
        );

        let engine = engine_always(settings(flags()));
        let parent = remote_parent("sw=0123456789abcdef-00");
        let decision = engine.decide(&Params {
            parent: Some(&parent),
            ..Params::default()
        });
        assert!(!decision.do_sample());
        assert_eq!(decision.source(), Source::TracestateContinuation);
    }

    fn engine_always(settings: Settings) -> DecisionEngine {
        engine(settings, Box::new(AlwaysDice))
    }

    #[test]
    fn continuation_requires_sample_through_always() {
        let engine = engine_always(settings(Flags::SampleStart));
        let parent = remote_parent("sw=0123456789abcdef-01");
        let decision = engine.decide(&Params {
            parent: Some(&parent),
            ..Params::default()
        });
        assert!(!decision.do_sample());
        assert_eq!(decision.source(), Source::TracestateContinuation);
    }

    #[test]
    fn malformed_member_falls_back_to_dice() {
        let engine = engine_always(settings(flags()));
        let parent = remote_parent("sw=0123456789ABCDEF-01");
        let decision = engine.decide(&Params {
            parent: Some(&parent),
            ..Params::default()
        });
        assert_eq!(decision.source(), Source::RemoteSetting);
    }

    #[test]
    fn local_parent_is_trusted() {
        let engine = engine(settings(Flags::none()), Box::new(NeverDice));
        let parent = SpanContext::builder()
            .trace_id(TraceId::from([1; 16]))
            .span_id(SpanId::from([2; 8]))
            .sampled(true)
            .build();

        let decision = engine.decide(&Params {
            parent: Some(&parent),
            ..Params::default()
        });
        assert!(decision.do_sample());
        assert_eq!(decision.source(), Source::ParentLocal);
    }

    #[test]
    fn dice_roll_charges_default_bucket() {
        let settings = Settings::builder()
            .sample_rate(DICE_SCALE)
            .flags(flags())
            .bucket(BucketType::Default, BucketSettings::new(1., 0.))
            .timestamp(now())
            .build();
        let engine = engine_always(settings);

        let decision = decide(&engine, None);
        assert!(decision.do_sample());
        assert_eq!(decision.source(), Source::LocalDefault);

        let decision = decide(&engine, None);
        assert!(!decision.do_sample());
        assert!(decision.do_metrics());
        assert_eq!(decision.status(), Status::RateExceeded);
    }

    #[test]
    fn lost_dice_roll() {
        let engine = engine(settings(flags()), Box::new(NeverDice));
        let decision = decide(&engine, None);
        assert!(!decision.do_sample());
        assert!(decision.do_metrics());
        assert_eq!(decision.status(), Status::Ok);
        assert_eq!(engine.limiter().bucket(BucketType::Default).tokens(), 10.);
    }

    #[test]
    fn new_settings_resize_buckets() {
        let engine = engine_always(settings(flags()));
        decide(&engine, None);
        assert_eq!(engine.limiter().bucket(BucketType::Default).tokens(), 9.);

        let mut newer = Settings::builder();
        newer
            .sample_rate(DICE_SCALE)
            .flags(flags())
            .bucket(BucketType::Default, BucketSettings::new(2., 0.))
            .timestamp(now() + 1);
        engine.store().update(newer.build());

        let decision = decide(&engine, None);
        assert!(decision.do_sample());
        assert_eq!(decision.bucket_capacity(), 2.);
        assert_eq!(engine.limiter().bucket(BucketType::Default).tokens(), 0.);
    }

    #[test]
    fn response_for_signed_request() {
        let engine = engine_always(settings(flags()));
        let header = format!("sw-keys=abc;trigger-trace;ts={}", now());
        let options = engine.request_options(&header, Some(&sign(&header)));

        let decision = decide(&engine, Some(&options));
        assert!(decision.do_sample());
        assert_eq!(
            codec::build_response(&decision, &options),
            "auth=ok####trigger-trace=ok####sw-keys=abc"
        );
    }

    #[test]
    fn transaction_settings_apply_per_span() {
        let config = Config::builder()
            .transaction_setting(
                crate::config::TransactionSetting::new("/health", false).unwrap(),
            )
            .build();
        let engine = DecisionEngine::builder()
            .config(config)
            .dice(Box::new(AlwaysDice))
            .build(Arc::new(SettingsStore::with_settings(settings(flags()))));

        let decision = engine.decide(&Params {
            transaction: Some("http://localhost/health"),
            ..Params::default()
        });
        assert_eq!(decision.status(), Status::TracingDisabled);

        let decision = engine.decide(&Params {
            transaction: Some("http://localhost/users"),
            ..Params::default()
        });
        assert!(decision.do_sample());
    }

    #[test]
    fn stale_snapshot_does_not_resize_buckets() {
        let engine = engine_always(settings(flags()));
        let bucket = engine.limiter().bucket(BucketType::Default);

        let older = Settings::builder()
            .bucket(BucketType::Default, BucketSettings::new(10., 0.))
            .timestamp(100)
            .build();
        let newer = Settings::builder()
            .bucket(BucketType::Default, BucketSettings::new(2., 0.))
            .timestamp(200)
            .build();

        engine.sync_limiter(&older);
        while bucket.consume() {}

        engine.sync_limiter(&newer);
        assert_eq!(bucket.settings(), BucketSettings::new(2., 0.));

        engine.sync_limiter(&older);
        assert_eq!(bucket.settings(), BucketSettings::new(2., 0.));
        assert_eq!(bucket.tokens(), 0.);
        assert!(!bucket.consume());
    }

    #[test]
    fn counters_follow_each_branch() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let engine = metrics::with_local_recorder(&recorder, || engine_always(settings(flags())));

        decide(&engine, None);

        let options = engine.request_options("trigger-trace", None);
        decide(&engine, Some(&options));

        let parent = remote_parent("sw=0102030405060708-01");
        engine.decide(&Params {
            parent: Some(&parent),
            ..Params::default()
        });

        let local = SpanContext::builder()
            .trace_id(TraceId::from([1; 16]))
            .span_id(SpanId::from([2; 8]))
            .sampled(true)
            .build();
        engine.decide(&Params {
            parent: Some(&local),
            ..Params::default()
        });

        let counters = counters(&snapshotter);
        let count = |name: &str| counters.get(name).copied().unwrap_or(0);
        assert_eq!(count(REQUEST_COUNT), 3);
        assert_eq!(count(SAMPLE_COUNT), 1);
        assert_eq!(count(TRACE_COUNT), 3);
        assert_eq!(count(THROUGH_TRACE_COUNT), 1);
        assert_eq!(count(TRIGGERED_TRACE_COUNT), 1);
        assert_eq!(count(TOKEN_BUCKET_EXHAUSTION_COUNT), 0);
    }

    #[test]
    fn exhausted_bucket_is_counted() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let settings = Settings::builder()
            .sample_rate(DICE_SCALE)
            .flags(flags())
            .bucket(BucketType::Default, BucketSettings::new(1., 0.))
            .timestamp(now())
            .build();
        let engine = metrics::with_local_recorder(&recorder, || engine_always(settings));

        decide(&engine, None);
        decide(&engine, None);

        let counters = counters(&snapshotter);
        let count = |name: &str| counters.get(name).copied().unwrap_or(0);
        assert_eq!(count(REQUEST_COUNT), 2);
        assert_eq!(count(SAMPLE_COUNT), 2);
        assert_eq!(count(TRACE_COUNT), 1);
        assert_eq!(count(TOKEN_BUCKET_EXHAUSTION_COUNT), 1);
    }
}
