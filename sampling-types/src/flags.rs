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

//! Settings flags.
use bitmask_enum::bitmask;
use std::fmt;

/// Capabilities granted by sampling settings.
///
/// The values match the ones used on the wire by the collector so that a
/// merged set of flags can be logged and compared against remote payloads.
#[bitmask(u32)]
#[bitmask_config(vec_debug)]
pub enum Flags {
    /// Remote settings take precedence over local configuration.
    Override = 0x2,

    /// New traces may be started.
    SampleStart = 0x4,

    /// Decisions made upstream are honored.
    SampleThroughAlways = 0x10,

    /// Trigger trace requests are accepted.
    TriggeredTrace = 0x20,
}

impl Default for Flags {
    fn default() -> Self {
        Self::none()
    }
}

impl Flags {
    /// Parses the comma or colon separated flag list sent by the collector.
    ///
    /// Unknown names are skipped. `TRIGGER_TRACE` is accepted as an alias
    /// of `TRIGGERED_TRACE`.
    pub fn parse_list(s: &str) -> Flags {
        s.split([',', ':'])
            .map(str::trim)
            .fold(Flags::none(), |flags, name| match name {
                "OVERRIDE" => flags | Flags::Override,
                "SAMPLE_START" => flags | Flags::SampleStart,
                "SAMPLE_THROUGH_ALWAYS" => flags | Flags::SampleThroughAlways,
                "TRIGGER_TRACE" | "TRIGGERED_TRACE" => flags | Flags::TriggeredTrace,
                _ => flags,
            })
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names = Vec::new();

        if self.contains(Self::Override) {
            names.push("OVERRIDE");
        }

        if self.contains(Self::SampleStart) {
            names.push("SAMPLE_START");
        }

        if self.contains(Self::SampleThroughAlways) {
            names.push("SAMPLE_THROUGH_ALWAYS");
        }

        if self.contains(Self::TriggeredTrace) {
            names.push("TRIGGER_TRACE");
        }

        write!(f, "{}", names.join(","))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_list() {
        let flags = Flags::parse_list("SAMPLE_START,SAMPLE_THROUGH_ALWAYS,TRIGGER_TRACE");
        assert!(flags.contains(Flags::SampleStart));
        assert!(flags.contains(Flags::SampleThroughAlways));
        assert!(flags.contains(Flags::TriggeredTrace));
        assert!(!flags.contains(Flags::Override));
    }

    #[test]
    fn unknown_names_are_skipped() {
        let flags = Flags::parse_list("OVERRIDE,BOGUS,,SAMPLE_START");
        assert_eq!(flags, Flags::Override | Flags::SampleStart);
        assert_eq!(Flags::parse_list(""), Flags::none());
    }

    #[test]
    fn colon_separated() {
        assert_eq!(
            Flags::parse_list("SAMPLE_START:TRIGGER_TRACE"),
            Flags::SampleStart | Flags::TriggeredTrace
        );
    }

    #[test]
    fn display_round_trips() {
        let flags = Flags::Override | Flags::TriggeredTrace;
        assert_eq!(flags.to_string(), "OVERRIDE,TRIGGER_TRACE");
        assert_eq!(Flags::parse_list(&flags.to_string()), flags);
    }
}
