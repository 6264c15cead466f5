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
use sampling::SettingsError;
use std::error;
use std::fmt;
use std::io;

/// The error type returned when fetching settings fails.
#[derive(Debug)]
pub struct Error {
    inner: ErrorInner,
}

#[derive(Debug)]
enum ErrorInner {
    Request(reqwest::Error),
    Io(io::Error),
    Http(http::StatusCode),
    Settings(SettingsError),
    Url(url::ParseError),
    Config(&'static str),
}

impl Error {
    pub(crate) fn request(e: reqwest::Error) -> Error {
        Error {
            inner: ErrorInner::Request(e),
        }
    }

    pub(crate) fn io(e: io::Error) -> Error {
        Error {
            inner: ErrorInner::Io(e),
        }
    }

    pub(crate) fn http(status: http::StatusCode) -> Error {
        Error {
            inner: ErrorInner::Http(status),
        }
    }

    pub(crate) fn settings(e: SettingsError) -> Error {
        Error {
            inner: ErrorInner::Settings(e),
        }
    }

    pub(crate) fn url(e: url::ParseError) -> Error {
        Error {
            inner: ErrorInner::Url(e),
        }
    }

    pub(crate) fn config(msg: &'static str) -> Error {
        Error {
            inner: ErrorInner::Config(msg),
        }
    }

    /// True if the request to the collector timed out.
    pub fn is_timeout(&self) -> bool {
        match self.inner {
            ErrorInner::Request(ref e) => e.is_timeout(),
            _ => false,
        }
    }

    /// True if the collector replied with an unexpected status code.
    pub fn is_http_error(&self) -> bool {
        matches!(self.inner, ErrorInner::Http(_))
    }

    /// True if the collector replied with a settings payload which could not be used.
    pub fn is_invalid(&self) -> bool {
        matches!(self.inner, ErrorInner::Settings(_))
    }

    /// HTTP status code from the collector if there was any.
    pub fn status_code(&self) -> Option<http::StatusCode> {
        match self.inner {
            ErrorInner::Http(status) => Some(status),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner {
            ErrorInner::Request(ref e) => fmt::Display::fmt(e, fmt),
            ErrorInner::Io(ref e) => write!(fmt, "error reading settings file: {}", e),
            ErrorInner::Http(status) => {
                write!(fmt, "collector replied with status code {}", status)
            }
            ErrorInner::Settings(ref e) => fmt::Display::fmt(e, fmt),
            ErrorInner::Url(ref e) => write!(fmt, "invalid collector address: {}", e),
            ErrorInner::Config(msg) => fmt.write_str(msg),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.inner {
            ErrorInner::Request(ref e) => Some(e),
            ErrorInner::Io(ref e) => Some(e),
            ErrorInner::Settings(ref e) => Some(e),
            ErrorInner::Url(ref e) => Some(e),
            ErrorInner::Http(_) | ErrorInner::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use sampling::Settings;
    use serde_json::json;
    use std::error::Error as _;

    #[test]
    fn it_works_for_status_code() {
        let err = Error::http(http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_http_error());
        assert!(!err.is_timeout());
        assert_eq!(
            err.to_string(),
            "collector replied with status code 500 Internal Server Error"
        );
        assert!(err.source().is_none());
        assert_eq!(
            err.status_code(),
            Some(http::StatusCode::INTERNAL_SERVER_ERROR)
        );
    }

    #[test]
    fn it_works_for_invalid_settings() {
        let err = Error::settings(Settings::from_json(&json!({})).unwrap_err());
        assert!(err.is_invalid());
        assert!(!err.is_http_error());
        assert!(err.to_string().starts_with("invalid settings"));
        assert!(err.source().is_some());
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn it_works_for_urls() {
        let err = Error::url(url::Url::parse("https://").unwrap_err());
        assert!(err.to_string().starts_with("invalid collector address"));
        assert!(err.source().is_some());
    }
}
