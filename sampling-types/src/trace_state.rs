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

//! The W3C `tracestate` list.
use std::error::Error;
use std::fmt;

const MAX_MEMBERS: usize = 32;
const MAX_KEY_LEN: usize = 256;
const MAX_VALUE_LEN: usize = 256;

/// An ordered list of vendor-specific `key=value` members.
///
/// The list carries trace data that doesn't fit in the `traceparent` header.
/// Each vendor owns a single key; updating a member moves it to the front of
/// the list, as required when a service changes the value it propagates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceState {
    members: Vec<(String, String)>,
}

impl TraceState {
    /// Creates an empty list.
    pub fn new() -> TraceState {
        TraceState::default()
    }

    /// Parses a `tracestate` header value.
    ///
    /// Parsing is lenient: malformed or duplicate members are dropped rather
    /// than invalidating the whole header, and members past the 32nd are
    /// discarded.
    pub fn parse(header: &str) -> TraceState {
        let mut state = TraceState::new();

        for member in header.split(',') {
            let member = member.trim();
            if member.is_empty() {
                continue;
            }

            let (key, value) = match member.split_once('=') {
                Some(kv) => kv,
                None => continue,
            };

            if !valid_key(key) || !valid_value(value) || state.get(key).is_some() {
                continue;
            }

            if state.members.len() == MAX_MEMBERS {
                break;
            }
            state.members.push((key.to_string(), value.to_string()));
        }

        state
    }

    /// Returns the value associated with a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| &**v)
    }

    /// Sets the value of a key, moving it to the front of the list.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<(), InvalidMemberError> {
        if !valid_key(key) {
            return Err(InvalidMemberError::Key(key.to_string()));
        }
        if !valid_value(value) {
            return Err(InvalidMemberError::Value(value.to_string()));
        }

        self.members.retain(|(k, _)| k != key);
        self.members.insert(0, (key.to_string(), value.to_string()));
        self.members.truncate(MAX_MEMBERS);
        Ok(())
    }

    /// A builder-style version of `insert`.
    pub fn with(mut self, key: &str, value: &str) -> Result<TraceState, InvalidMemberError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Removes a key, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.members.iter().position(|(k, _)| k == key)?;
        Some(self.members.remove(idx).1)
    }

    /// Returns an iterator over the members in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.members.iter().map(|(k, v)| (&**k, &**v))
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Determines if the list has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl fmt::Display for TraceState {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.members.iter().enumerate() {
            if i > 0 {
                fmt.write_str(",")?;
            }
            write!(fmt, "{}={}", key, value)?;
        }
        Ok(())
    }
}

fn valid_key(key: &str) -> bool {
    let bytes = key.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_KEY_LEN {
        return false;
    }
    if !(bytes[0].is_ascii_lowercase() || bytes[0].is_ascii_digit()) {
        return false;
    }
    if bytes.iter().filter(|b| **b == b'@').count() > 1 {
        return false;
    }

    bytes.iter().all(|b| {
        b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'-' | b'*' | b'/' | b'@')
    })
}

fn valid_value(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_VALUE_LEN || bytes[bytes.len() - 1] == b' ' {
        return false;
    }

    bytes
        .iter()
        .all(|b| (0x20..=0x7e).contains(b) && *b != b',' && *b != b'=')
}

/// The error returned when inserting a malformed member into a `TraceState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidMemberError {
    /// The key does not follow the W3C key grammar.
    Key(String),
    /// The value does not follow the W3C value grammar.
    Value(String),
}

impl fmt::Display for InvalidMemberError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidMemberError::Key(key) => write!(fmt, "invalid tracestate key `{}`", key),
            InvalidMemberError::Value(value) => {
                write!(fmt, "invalid tracestate value `{}`", value)
            }
        }
    }
}

impl Error for InvalidMemberError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_keeps_order() {
        let state = TraceState::parse("rojo=00f067aa0ba902b7,congo=t61rcWkgMzE");
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("rojo"), Some("00f067aa0ba902b7"));
        assert_eq!(state.get("congo"), Some("t61rcWkgMzE"));
        assert_eq!(state.to_string(), "rojo=00f067aa0ba902b7,congo=t61rcWkgMzE");
    }

    #[test]
    fn parse_drops_malformed_members() {
        let state = TraceState::parse("Upper=1, ,novalue,ok=1,dup=a,dup=b,bad=a=b");
        assert_eq!(state.to_string(), "ok=1,dup=a");
    }

    #[test]
    fn multi_tenant_keys() {
        let state = TraceState::parse("tenant@vendor=x,a@b@c=y");
        assert_eq!(state.get("tenant@vendor"), Some("x"));
        assert_eq!(state.get("a@b@c"), None);
    }

    #[test]
    fn insert_moves_to_front() {
        let mut state = TraceState::parse("a=1,sw=old,b=2");
        state.insert("sw", "new").unwrap();
        assert_eq!(state.to_string(), "sw=new,a=1,b=2");
    }

    #[test]
    fn insert_rejects_bad_members() {
        let mut state = TraceState::new();
        assert_eq!(
            state.insert("sw", "a,b"),
            Err(InvalidMemberError::Value("a,b".to_string()))
        );
        assert!(state.insert("SW", "x").is_err());
        assert!(state.is_empty());
    }

    #[test]
    fn member_limit() {
        let header = (0..40)
            .map(|i| format!("k{}=v", i))
            .collect::<Vec<_>>()
            .join(",");
        let mut state = TraceState::parse(&header);
        assert_eq!(state.len(), 32);
        state.insert("sw", "x").unwrap();
        assert_eq!(state.len(), 32);
        assert_eq!(state.iter().next(), Some(("sw", "x")));
        assert_eq!(state.get("k31"), None);
    }

    #[test]
    fn remove() {
        let mut state = TraceState::parse("a=1,b=2");
        assert_eq!(state.remove("a"), Some("1".to_string()));
        assert_eq!(state.remove("a"), None);
        assert_eq!(state.to_string(), "b=2");
    }
}
