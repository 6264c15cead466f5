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

//! The shared settings snapshot.
use arc_swap::ArcSwapOption;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::settings::{Settings, SettingsError};

/// Holds the most recent sampling settings.
///
/// Readers never block: each read takes a reference counted snapshot, and a
/// refresh publishes a complete new value in a single atomic swap. Settings
/// are never discarded once published, only replaced by newer ones.
pub struct SettingsStore {
    current: ArcSwapOption<Settings>,
    fallback: Arc<Settings>,
    ready_lock: Mutex<()>,
    ready: Condvar,
}

impl Default for SettingsStore {
    fn default() -> SettingsStore {
        SettingsStore::new()
    }
}

impl SettingsStore {
    /// Creates a store with no settings.
    pub fn new() -> SettingsStore {
        SettingsStore {
            current: ArcSwapOption::empty(),
            fallback: Arc::new(Settings::default()),
            ready_lock: Mutex::new(()),
            ready: Condvar::new(),
        }
    }

    /// Creates a store holding initial settings.
    pub fn with_settings(settings: Settings) -> SettingsStore {
        let store = SettingsStore::new();
        store.current.store(Some(Arc::new(settings)));
        store
    }

    /// Returns the current settings, if any have been published.
    pub fn current(&self) -> Option<Arc<Settings>> {
        self.current.load_full()
    }

    /// Returns the current settings, or the fail-closed default if none have
    /// been published.
    pub fn get(&self) -> Arc<Settings> {
        self.current().unwrap_or_else(|| self.fallback.clone())
    }

    /// Determines if settings have been published.
    pub fn is_available(&self) -> bool {
        self.current.load().is_some()
    }

    /// Blocks until settings have been published or the timeout elapses.
    ///
    /// Returns `true` if settings are available.
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.ready_lock.lock();
        while !self.is_available() {
            if self.ready.wait_until(&mut guard, deadline).timed_out() {
                return self.is_available();
            }
        }
        true
    }

    /// Publishes new settings.
    ///
    /// Settings whose timestamp is not newer than the current ones are
    /// ignored. Returns `true` if the settings were applied.
    pub fn update(&self, settings: Settings) -> bool {
        let new = Arc::new(settings);
        let mut applied = false;

        self.current.rcu(|current| match current {
            Some(current) if current.timestamp() >= new.timestamp() => {
                applied = false;
                Some(current.clone())
            }
            _ => {
                applied = true;
                Some(new.clone())
            }
        });

        if applied {
            debug!(
                "applied settings with timestamp {} and ttl {}",
                new.timestamp(),
                new.ttl()
            );
            let _guard = self.ready_lock.lock();
            self.ready.notify_all();
        } else {
            debug!("ignoring settings with timestamp {}", new.timestamp());
        }

        applied
    }

    /// Parses and publishes a settings payload.
    ///
    /// A payload which fails to parse leaves the current settings untouched.
    pub fn update_from_json(&self, value: &serde_json::Value) -> Result<bool, SettingsError> {
        let settings = match Settings::from_json(value) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("discarding invalid settings: {}", e);
                return Err(e);
            }
        };

        if let Some(warning) = settings.warning() {
            warn!("settings warning: {}", warning);
        }

        Ok(self.update(settings))
    }
}
