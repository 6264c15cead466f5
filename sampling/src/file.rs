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
//! Settings loaded from a local file.
//!
//! Environments without network access to the collector, such as function
//! runtimes, receive their settings through a file maintained by an external
//! extension. The file holds a JSON array with exactly one settings object.
//! Reading the file is left to a background refresh task; nothing here is
//! called while deciding.
use std::fs;
use std::path::{Path, PathBuf};

use crate::settings::{Settings, SettingsError};

/// The name of the settings file in the system temporary directory.
pub const DEFAULT_FILE_NAME: &str = "solarwinds-apm-settings.json";

/// A settings source backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
}

impl Default for FileSettings {
    fn default() -> FileSettings {
        FileSettings::new(std::env::temp_dir().join(DEFAULT_FILE_NAME))
    }
}

impl FileSettings {
    /// Creates a source reading the file at the given path.
    pub fn new<P>(path: P) -> FileSettings
    where
        P: Into<PathBuf>,
    {
        FileSettings { path: path.into() }
    }

    /// Returns the path of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extracts the settings payload from the contents of a settings file.
    pub fn parse(contents: &[u8]) -> Result<serde_json::Value, SettingsError> {
        let value: serde_json::Value =
            serde_json::from_slice(contents).map_err(SettingsError::json)?;

        match value {
            serde_json::Value::Array(mut entries) if entries.len() == 1 => Ok(entries.remove(0)),
            _ => Err(SettingsError::invalid(
                "settings file must contain an array of one object",
            )),
        }
    }

    /// Reads and parses the settings file.
    pub fn read(&self) -> Result<Settings, SettingsError> {
        let contents = fs::read(&self.path).map_err(SettingsError::io)?;
        Settings::from_json(&FileSettings::parse(&contents)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn entry(timestamp: u64) -> String {
        format!(
            r#"[{{
                "value": 1000000,
                "flags": "SAMPLE_START,SAMPLE_THROUGH_ALWAYS",
                "timestamp": {},
                "ttl": 60,
                "arguments": {{
                    "BucketCapacity": 1,
                    "BucketRate": 1,
                    "TriggerRelaxedBucketCapacity": 1,
                    "TriggerRelaxedBucketRate": 1
                }}
            }}]"#,
            timestamp
        )
    }

    #[test]
    fn reads_single_entry() {
        let file = file(&entry(1000));
        let settings = FileSettings::new(file.path()).read().unwrap();
        assert_eq!(settings.timestamp(), 1000);
        assert_eq!(settings.sample_rate(), 1_000_000);
    }

    #[test]
    fn parse_unwraps_the_entry() {
        let value = FileSettings::parse(entry(1000).as_bytes()).unwrap();
        assert_eq!(value["timestamp"], 1000);
    }

    #[test]
    fn rejects_other_shapes() {
        for contents in &["{}", "[]", "[{}, {}]", "not json"] {
            let file = file(contents);
            assert!(FileSettings::new(file.path()).read().is_err());
            assert!(FileSettings::parse(contents.as_bytes()).is_err());
        }

        let missing = FileSettings::new("/nonexistent/settings.json").read();
        assert!(!missing.unwrap_err().is_invalid());
    }

    #[test]
    fn broken_entry_is_rejected() {
        let file = file("[{\"value\": 1}]");
        assert!(FileSettings::new(file.path()).read().unwrap_err().is_invalid());
    }
}
