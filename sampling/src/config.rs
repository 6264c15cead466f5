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

//! Agent configuration.
use regex::Regex;
use serde::Deserialize;
use std::error::Error;
use std::fmt;

use crate::settings::{LocalSettings, Mode, TracingMode, TriggerTraceMode};

/// The collector used when none is configured.
pub const DEFAULT_COLLECTOR: &str = "apm.collector.na-01.cloud.solarwinds.com";

/// A per-transaction tracing override.
///
/// The first setting whose matcher matches a span's transaction identifier
/// replaces the configured tracing mode for that span.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawTransactionSetting")]
pub struct TransactionSetting {
    matcher: Regex,
    tracing: bool,
}

#[derive(Deserialize)]
struct RawTransactionSetting {
    regex: String,
    tracing: Mode,
}

impl TryFrom<RawTransactionSetting> for TransactionSetting {
    type Error = regex::Error;

    fn try_from(raw: RawTransactionSetting) -> Result<TransactionSetting, regex::Error> {
        Ok(TransactionSetting {
            matcher: Regex::new(&raw.regex)?,
            tracing: raw.tracing == Mode::Enabled,
        })
    }
}

impl TransactionSetting {
    /// Creates a setting from a regular expression.
    pub fn new(regex: &str, tracing: bool) -> Result<TransactionSetting, regex::Error> {
        Ok(TransactionSetting {
            matcher: Regex::new(regex)?,
            tracing,
        })
    }

    /// Determines if the setting applies to a transaction identifier.
    pub fn matches(&self, identifier: &str) -> bool {
        self.matcher.is_match(identifier)
    }

    /// Returns whether matching transactions are traced.
    pub fn tracing(&self) -> bool {
        self.tracing
    }
}

/// Returns the identifier transaction settings are matched against.
///
/// HTTP server spans are identified by their URL, other spans by their kind
/// and name.
pub fn transaction_identifier(kind: &str, name: &str, url: Option<&str>) -> String {
    match url {
        Some(url) => url.to_string(),
        None => format!("{}:{}", kind, name),
    }
}

/// The agent configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    token: Option<String>,
    service: Option<String>,
    collector: String,
    hostname: String,
    tracing_mode: TracingMode,
    trigger_trace: TriggerTraceMode,
    transaction_settings: Vec<TransactionSetting>,
}

impl Default for Config {
    fn default() -> Config {
        Config::builder().build()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Config")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("service", &self.service)
            .field("collector", &self.collector)
            .field("hostname", &self.hostname)
            .field("tracing_mode", &self.tracing_mode)
            .field("trigger_trace", &self.trigger_trace)
            .field("transaction_settings", &self.transaction_settings)
            .finish()
    }
}

impl Config {
    /// Returns a builder used to construct a `Config`.
    pub fn builder() -> Builder {
        Builder {
            token: None,
            service: None,
            collector: DEFAULT_COLLECTOR.to_string(),
            hostname: None,
            tracing_mode: Mode::Unset,
            trigger_trace: Mode::Enabled,
            transaction_settings: vec![],
        }
    }

    /// Loads the configuration from `SW_APM_*` environment variables.
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration from `SW_APM_*` variables provided by a
    /// lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder();

        if let Some(key) = lookup("SW_APM_SERVICE_KEY") {
            match key.split_once(':') {
                Some((token, service)) if !token.is_empty() && !service.is_empty() => {
                    builder.token(token).service(service);
                }
                _ => return Err(ConfigError::new("SW_APM_SERVICE_KEY", &key)),
            }
        }

        if let Some(collector) = lookup("SW_APM_COLLECTOR") {
            builder.collector(&collector);
        }

        if let Some(hostname) = lookup("HOSTNAME") {
            builder.hostname(&hostname);
        }

        if let Some(mode) = lookup("SW_APM_TRACING_MODE") {
            let mode = mode
                .parse()
                .map_err(|_| ConfigError::new("SW_APM_TRACING_MODE", &mode))?;
            builder.tracing_mode(mode);
        }

        if let Some(mode) = lookup("SW_APM_TRIGGER_TRACE") {
            let mode = mode
                .parse()
                .map_err(|_| ConfigError::new("SW_APM_TRIGGER_TRACE", &mode))?;
            builder.trigger_trace(mode);
        }

        Ok(builder.build())
    }

    /// Returns the API token used to authenticate with the collector.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the service name.
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// Returns the collector address.
    pub fn collector(&self) -> &str {
        &self.collector
    }

    /// Returns the name of this host.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the configured tracing mode.
    pub fn tracing_mode(&self) -> TracingMode {
        self.tracing_mode
    }

    /// Returns the configured trigger trace mode.
    pub fn trigger_trace(&self) -> TriggerTraceMode {
        self.trigger_trace
    }

    /// Returns the per-transaction overrides.
    pub fn transaction_settings(&self) -> &[TransactionSetting] {
        &self.transaction_settings
    }

    /// Returns the local settings for a transaction.
    ///
    /// Without an identifier, or when no transaction setting matches, the
    /// configured modes are used.
    pub fn local_settings(&self, identifier: Option<&str>) -> LocalSettings {
        let mut tracing_mode = self.tracing_mode;

        if let Some(identifier) = identifier {
            if let Some(setting) = self
                .transaction_settings
                .iter()
                .find(|s| s.matches(identifier))
            {
                tracing_mode = if setting.tracing {
                    Mode::Enabled
                } else {
                    Mode::Disabled
                };
            }
        }

        LocalSettings {
            tracing_mode,
            trigger_trace: self.trigger_trace,
        }
    }
}

/// A builder type for `Config`s.
pub struct Builder {
    token: Option<String>,
    service: Option<String>,
    collector: String,
    hostname: Option<String>,
    tracing_mode: TracingMode,
    trigger_trace: TriggerTraceMode,
    transaction_settings: Vec<TransactionSetting>,
}

impl Builder {
    /// Sets the API token.
    pub fn token(&mut self, token: &str) -> &mut Builder {
        self.token = Some(token.to_string());
        self
    }

    /// Sets the service name.
    pub fn service(&mut self, service: &str) -> &mut Builder {
        self.service = Some(service.to_string());
        self
    }

    /// Sets the collector address.
    ///
    /// Defaults to `DEFAULT_COLLECTOR`.
    pub fn collector(&mut self, collector: &str) -> &mut Builder {
        self.collector = collector.to_string();
        self
    }

    /// Sets the hostname reported to the collector.
    ///
    /// Defaults to `localhost`.
    pub fn hostname(&mut self, hostname: &str) -> &mut Builder {
        self.hostname = Some(hostname.to_string());
        self
    }

    /// Sets the tracing mode.
    ///
    /// Defaults to `Mode::Unset`, deferring to remote settings.
    pub fn tracing_mode(&mut self, mode: TracingMode) -> &mut Builder {
        self.tracing_mode = mode;
        self
    }

    /// Sets the trigger trace mode.
    ///
    /// Defaults to `Mode::Enabled`.
    pub fn trigger_trace(&mut self, mode: TriggerTraceMode) -> &mut Builder {
        self.trigger_trace = mode;
        self
    }

    /// Adds a per-transaction override.
    ///
    /// Overrides are matched in the order they were added.
    pub fn transaction_setting(&mut self, setting: TransactionSetting) -> &mut Builder {
        self.transaction_settings.push(setting);
        self
    }

    /// Constructs the `Config`.
    pub fn build(&self) -> Config {
        Config {
            token: self.token.clone(),
            service: self.service.clone(),
            collector: self.collector.clone(),
            hostname: self
                .hostname
                .clone()
                .unwrap_or_else(|| "localhost".to_string()),
            tracing_mode: self.tracing_mode,
            trigger_trace: self.trigger_trace,
            transaction_settings: self.transaction_settings.clone(),
        }
    }
}

/// The error returned when an environment variable holds an invalid value.
#[derive(Debug)]
pub struct ConfigError {
    variable: &'static str,
    value: String,
}

impl ConfigError {
    fn new(variable: &'static str, value: &str) -> ConfigError {
        ConfigError {
            variable,
            value: value.to_string(),
        }
    }

    /// Returns the name of the offending variable.
    pub fn variable(&self) -> &str {
        self.variable
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        // service keys carry a secret token
        if self.variable == "SW_APM_SERVICE_KEY" {
            write!(fmt, "invalid value for {}", self.variable)
        } else {
            write!(fmt, "invalid value for {}: {}", self.variable, self.value)
        }
    }
}

impl Error for ConfigError {}
