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
//! Keeps a `SettingsStore` fresh with sampling settings fetched from a collector.
//!
//! Settings are requested from `{collector}/v1/settings/{service}/{hostname}`. A background task
//! fetches them once at startup and again shortly before they expire. Failed requests are retried
//! with an exponential backoff; in the meantime the store keeps serving the last good settings, or
//! none at all, in which case the engine does not trace.
//!
//! Environments without access to the collector can refresh from a [`FileSettings`] instead, which
//! implements [`Fetch`] by reading the settings file off the request path.
//!
//! # Example
//!
//! ```no_run
//! use sampling::{Config, SettingsStore};
//! use sampling_settings_http::{HttpFetcher, Refresher};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let store = Arc::new(SettingsStore::new());
//! let handle = Refresher::new(HttpFetcher::new(&config)?, store.clone()).spawn();
//!
//! // ...
//!
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]
#![warn(missing_docs)]

use backon::{ExponentialBuilder, Retryable};
use log::{debug, info, warn};
use sampling::file::FileSettings;
use sampling::{Config, Settings, SettingsStore};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

mod error;

pub use error::Error;

/// The timeout of a single settings request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The delay before the first retry of a failed request.
pub const RETRY_MIN_DELAY: Duration = Duration::from_millis(500);

/// The upper bound of the delay between retries.
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);

/// The factor applied to the retry delay after every failed attempt.
pub const RETRY_FACTOR: f32 = 1.5;

/// The number of attempts made before a refresh is given up.
pub const MAX_ATTEMPTS: usize = 20;

/// How long before expiry settings are refreshed.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(15);

const MIN_REFRESH_DELAY: Duration = Duration::from_secs(1);

/// A source of raw settings payloads.
pub trait Fetch: Send + Sync + 'static {
    /// Fetches a single settings payload.
    fn fetch(&self) -> impl Future<Output = Result<serde_json::Value, Error>> + Send;
}

/// Fetches settings from a collector over HTTP.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: Url,
    token: Option<String>,
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("HttpFetcher")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpFetcher {
    /// Creates a fetcher for the collector, service and hostname named by the configuration.
    ///
    /// The collector defaults to `https` if it is given without a scheme.
    pub fn new(config: &Config) -> Result<HttpFetcher, Error> {
        let url = settings_url(config)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(Error::request)?;

        Ok(HttpFetcher {
            client,
            url,
            token: config.token().map(str::to_string),
        })
    }

    /// Returns the URL settings are requested from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn get(&self) -> Result<serde_json::Value, Error> {
        let mut request = self.client.get(self.url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(Error::request)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(status));
        }

        response.json().await.map_err(Error::request)
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self) -> impl Future<Output = Result<serde_json::Value, Error>> + Send {
        self.get()
    }
}

impl Fetch for FileSettings {
    async fn fetch(&self) -> Result<serde_json::Value, Error> {
        let contents = tokio::fs::read(self.path()).await.map_err(Error::io)?;
        FileSettings::parse(&contents).map_err(Error::settings)
    }
}

fn settings_url(config: &Config) -> Result<Url, Error> {
    let service = config
        .service()
        .ok_or_else(|| Error::config("no service name configured"))?;

    let collector = config.collector();
    let mut url = if collector.contains("://") {
        Url::parse(collector)
    } else {
        Url::parse(&format!("https://{}", collector))
    }
    .map_err(Error::url)?;

    url.path_segments_mut()
        .map_err(|_| Error::config("collector address cannot be a base"))?
        .pop_if_empty()
        .extend(["v1", "settings", service, config.hostname()]);

    Ok(url)
}

/// Fetches settings and publishes them to a store.
pub struct Refresher<F> {
    fetcher: F,
    store: Arc<SettingsStore>,
}

impl<F> Refresher<F>
where
    F: Fetch,
{
    /// Creates a new refresher publishing to the given store.
    pub fn new(fetcher: F, store: Arc<SettingsStore>) -> Refresher<F> {
        Refresher { fetcher, store }
    }

    /// Returns the store settings are published to.
    pub fn store(&self) -> &Arc<SettingsStore> {
        &self.store
    }

    /// Makes a single attempt to fetch and publish settings.
    ///
    /// Returns the settings in effect afterwards, which are the previous ones if the fetched
    /// settings were not newer.
    pub async fn refresh(&self) -> Result<Arc<Settings>, Error> {
        let value = self.fetcher.fetch().await?;
        self.store.update_from_json(&value).map_err(Error::settings)?;
        Ok(self.store.get())
    }

    /// Fetches and publishes settings, retrying failed attempts with an exponential backoff.
    pub async fn refresh_with_retry(&self) -> Result<Arc<Settings>, Error> {
        (|| self.refresh())
            .retry(backoff())
            .notify(|e, delay| {
                warn!("error refreshing settings, retrying in {:?}: {}", delay, e);
            })
            .await
    }

    /// Starts refreshing settings in the background.
    ///
    /// Settings are fetched immediately and then shortly before they expire. Must be called from
    /// within a Tokio runtime.
    pub fn spawn(self) -> RefreshHandle {
        let token = CancellationToken::new();
        let task = tokio::spawn(self.run(token.clone()));
        RefreshHandle { token, task }
    }

    async fn run(self, token: CancellationToken) {
        loop {
            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = self.refresh_with_retry() => result,
            };

            let delay = match result {
                Ok(settings) => next_refresh(&settings, SystemTime::now()),
                Err(e) => {
                    warn!(
                        "giving up refreshing settings after {} attempts: {}",
                        MAX_ATTEMPTS, e
                    );
                    if !self.store.is_available() {
                        warn!("tracing remains disabled until settings can be fetched");
                    }
                    RETRY_MAX_DELAY
                }
            };
            debug!("next settings refresh in {:?}", delay);

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("settings refresh stopped");
    }
}

fn backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(RETRY_MIN_DELAY)
        .with_factor(RETRY_FACTOR)
        .with_max_delay(RETRY_MAX_DELAY)
        .with_max_times(MAX_ATTEMPTS - 1)
}

fn next_refresh(settings: &Settings, now: SystemTime) -> Duration {
    let now = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    Duration::from_secs(settings.expiry())
        .saturating_sub(REFRESH_MARGIN)
        .saturating_sub(now)
        .max(MIN_REFRESH_DELAY)
}

/// A handle to a background settings refresh task.
#[derive(Debug)]
pub struct RefreshHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Signals the task to stop without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true if the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!("settings refresh task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeFetch {
        responses: Mutex<VecDeque<Result<serde_json::Value, Error>>>,
        fallback: Option<serde_json::Value>,
        calls: AtomicUsize,
    }

    impl FakeFetch {
        fn new(responses: Vec<Result<serde_json::Value, Error>>) -> FakeFetch {
            FakeFetch {
                responses: Mutex::new(responses.into()),
                fallback: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn always(value: serde_json::Value) -> FakeFetch {
            FakeFetch {
                fallback: Some(value),
                ..FakeFetch::new(vec![])
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetch for Arc<FakeFetch> {
        async fn fetch(&self) -> Result<serde_json::Value, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.lock().unwrap().pop_front() {
                Some(response) => response,
                None => match &self.fallback {
                    Some(value) => Ok(value.clone()),
                    None => Err(Error::http(http::StatusCode::SERVICE_UNAVAILABLE)),
                },
            }
        }
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn payload(timestamp: u64) -> serde_json::Value {
        json!({
            "value": 1000000,
            "flags": "SAMPLE_START,SAMPLE_THROUGH_ALWAYS,TRIGGER_TRACE",
            "timestamp": timestamp,
            "ttl": 120,
            "arguments": {
                "BucketCapacity": 2,
                "BucketRate": 1,
                "TriggerRelaxedBucketCapacity": 20,
                "TriggerRelaxedBucketRate": 1,
                "TriggerStrictBucketCapacity": 6,
                "TriggerStrictBucketRate": 0.1,
                "SignatureKey": "key"
            }
        })
    }

    fn refresher(fetch: &Arc<FakeFetch>) -> Refresher<Arc<FakeFetch>> {
        Refresher::new(fetch.clone(), Arc::new(SettingsStore::new()))
    }

    #[test]
    fn settings_url() {
        let config = Config::builder()
            .collector("collector.example.com:443")
            .token("secret")
            .service("my service")
            .hostname("web-1")
            .build();
        let fetcher = HttpFetcher::new(&config).unwrap();
        assert_eq!(
            fetcher.url().as_str(),
            "https://collector.example.com/v1/settings/my%20service/web-1"
        );

        let config = Config::builder()
            .collector("http://localhost:8080/")
            .service("svc")
            .hostname("host")
            .build();
        assert_eq!(
            HttpFetcher::new(&config).unwrap().url().as_str(),
            "http://localhost:8080/v1/settings/svc/host"
        );
    }

    #[test]
    fn missing_service() {
        let config = Config::builder().build();
        assert!(HttpFetcher::new(&config).is_err());
    }

    #[test]
    fn refresh_delay() {
        let settings = Settings::builder().timestamp(1000).ttl(120).build();
        let at = |secs| UNIX_EPOCH + Duration::from_secs(secs);

        assert_eq!(next_refresh(&settings, at(1000)), Duration::from_secs(105));
        assert_eq!(next_refresh(&settings, at(1100)), Duration::from_secs(5));
        assert_eq!(next_refresh(&settings, at(1110)), MIN_REFRESH_DELAY);
        assert_eq!(next_refresh(&settings, at(5000)), MIN_REFRESH_DELAY);
    }

    #[tokio::test]
    async fn refresh_publishes_settings() {
        let fetch = Arc::new(FakeFetch::new(vec![Ok(payload(now()))]));
        let refresher = refresher(&fetch);

        let settings = refresher.refresh().await.unwrap();
        assert_eq!(settings.sample_rate(), 1_000_000);
        assert!(refresher.store().is_available());
    }

    #[tokio::test]
    async fn invalid_settings_are_not_published() {
        let timestamp = now();
        let mut broken = payload(timestamp + 1);
        broken["ttl"] = json!("soon");
        let fetch = Arc::new(FakeFetch::new(vec![Ok(payload(timestamp)), Ok(broken)]));
        let refresher = refresher(&fetch);

        let before = refresher.refresh().await.unwrap();
        let err = refresher.refresh().await.unwrap_err();
        assert!(err.is_invalid());
        assert_eq!(refresher.store().get(), before);
    }

    #[tokio::test]
    async fn file_settings_are_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let source = FileSettings::new(path.clone());

        let err = source.fetch().await.unwrap_err();
        assert!(!err.is_invalid());

        std::fs::write(&path, format!("[{}]", payload(now()))).unwrap();
        let refresher = Refresher::new(source, Arc::new(SettingsStore::new()));
        let settings = refresher.refresh().await.unwrap();
        assert_eq!(settings.sample_rate(), 1_000_000);

        std::fs::write(&path, "[{\"value\": 1}]").unwrap();
        assert!(refresher.refresh().await.unwrap_err().is_invalid());
        assert_eq!(refresher.store().get(), settings);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_are_retried() {
        let fetch = Arc::new(FakeFetch::new(vec![
            Err(Error::http(http::StatusCode::SERVICE_UNAVAILABLE)),
            Ok(json!({ "value": "garbage" })),
            Ok(payload(now())),
        ]));
        let refresher = refresher(&fetch);

        refresher.refresh_with_retry().await.unwrap();
        assert_eq!(fetch.calls(), 3);
        assert!(refresher.store().is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let fetch = Arc::new(FakeFetch::new(vec![]));
        let refresher = refresher(&fetch);

        let err = refresher.refresh_with_retry().await.unwrap_err();
        assert_eq!(err.status_code(), Some(http::StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(fetch.calls(), MAX_ATTEMPTS);
        assert!(!refresher.store().is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn background_refresh() {
        let fetch = Arc::new(FakeFetch::always(payload(now())));
        let store = Arc::new(SettingsStore::new());
        let handle = Refresher::new(fetch.clone(), store.clone()).spawn();

        while !store.is_available() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fetch.calls(), 1);

        tokio::time::sleep(Duration::from_secs(110)).await;
        assert!(fetch.calls() >= 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_retries() {
        let fetch = Arc::new(FakeFetch::new(vec![]));
        let handle = refresher(&fetch).spawn();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fetch.calls() >= 1);
        assert!(!handle.is_finished());

        handle.shutdown().await;
        let calls = fetch.calls();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fetch.calls(), calls);
    }
}
