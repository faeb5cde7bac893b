//! Value types for process-state events.
//!
//! [`ProcessState`] is the closed vocabulary of supervisor process states,
//! [`HeaderMap`] is the ordered `key:value` listing the supervisor uses both
//! for envelope headers and for event payloads, and [`EventRecord`] is the
//! typed, immutable result of parsing one process-state event.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GroupName, MalformedEvent, ProcessName};

/// Prefix the supervisor puts in front of every process-state event name.
pub const PROCESS_STATE_PREFIX: &str = "PROCESS_STATE_";

// ---------------------------------------------------------------------------
// Process state vocabulary
// ---------------------------------------------------------------------------

/// A process state as reported by the supervisor.
///
/// The set is fixed: anything outside it is rejected at parse time and never
/// reaches the batch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    Starting,
    Running,
    Backoff,
    Stopping,
    Fatal,
    Exited,
    Stopped,
    Unknown,
}

impl ProcessState {
    /// Every state, in the order the supervisor documents them.
    pub const ALL: [ProcessState; 8] = [
        ProcessState::Starting,
        ProcessState::Running,
        ProcessState::Backoff,
        ProcessState::Stopping,
        ProcessState::Fatal,
        ProcessState::Exited,
        ProcessState::Stopped,
        ProcessState::Unknown,
    ];

    /// The bare state name, e.g. `"EXITED"`.
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Starting => "STARTING",
            ProcessState::Running => "RUNNING",
            ProcessState::Backoff => "BACKOFF",
            ProcessState::Stopping => "STOPPING",
            ProcessState::Fatal => "FATAL",
            ProcessState::Exited => "EXITED",
            ProcessState::Stopped => "STOPPED",
            ProcessState::Unknown => "UNKNOWN",
        }
    }

    /// The event name used on the wire, e.g. `"PROCESS_STATE_EXITED"`.
    pub fn event_name(self) -> String {
        format!("{PROCESS_STATE_PREFIX}{}", self.as_str())
    }

    /// Looks up a state by name, case-insensitively.
    ///
    /// Accepts both the bare name (`exited`) and the prefixed event name
    /// (`PROCESS_STATE_EXITED`). Surrounding whitespace is ignored.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix(PROCESS_STATE_PREFIX).unwrap_or(&upper);
        Self::ALL.into_iter().find(|s| s.as_str() == bare)
    }
}

impl FromStr for ProcessState {
    type Err = MalformedEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| MalformedEvent::UnknownEvent {
            name: s.to_string(),
        })
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Ordered header map
// ---------------------------------------------------------------------------

/// An insertion-ordered `key -> value` map of supervisor header tokens.
///
/// Lookups are linear; supervisor header lines carry fewer than a dozen keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMap(Vec<(String, String)>);

impl HeaderMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a space-separated list of `key:value` tokens.
    ///
    /// Each token is split at its first `:`, so values may themselves contain
    /// colons (`server:host:9001`). A repeated key keeps its first position
    /// and takes the last value.
    pub fn parse(line: &str) -> Result<Self, MalformedEvent> {
        let mut map = Self::new();
        for token in line.split_whitespace() {
            let (key, value) = token
                .split_once(':')
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| MalformedEvent::InvalidToken {
                    token: token.to_string(),
                })?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Inserts or replaces `key`. Replacing keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Returns the value stored for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for HeaderMap {
    /// Renders the map back into wire form: `k1:v1 k2:v2`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{k}:{v}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Event record
// ---------------------------------------------------------------------------

/// One parsed process-state transition.
///
/// Built once per inbound event by [`parse_event_record`] and never mutated
/// afterwards. Fields are private so a record can only exist if it passed
/// validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    event: ProcessState,
    group_name: GroupName,
    process_name: ProcessName,
    from_state: ProcessState,
    headers: HeaderMap,
    received_at: Timestamp,
}

impl EventRecord {
    /// The state the process entered.
    pub fn event(&self) -> ProcessState {
        self.event
    }

    /// The wire event name, e.g. `PROCESS_STATE_EXITED`.
    pub fn event_name(&self) -> String {
        self.event.event_name()
    }

    pub fn group_name(&self) -> &GroupName {
        &self.group_name
    }

    pub fn process_name(&self) -> &ProcessName {
        &self.process_name
    }

    /// The state the process left.
    pub fn from_state(&self) -> ProcessState {
        self.from_state
    }

    /// Every payload header, in the order the supervisor sent them.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn received_at(&self) -> Timestamp {
        self.received_at
    }

    /// One-line summary used for the per-event log line:
    /// `group:process;FROM;PROCESS_STATE_TO;k:v k:v`.
    pub fn summary(&self) -> String {
        format!(
            "{}:{};{};{};{}",
            self.group_name,
            self.process_name,
            self.from_state,
            self.event_name(),
            self.headers
        )
    }
}

/// Builds an [`EventRecord`] from an envelope's `eventname` and its payload.
///
/// The payload's first line is a `key:value` listing; anything after the
/// first newline is event data the supervisor attaches to some event types
/// and is ignored here. `processname`, `groupname` and `from_state` are
/// required.
pub fn parse_event_record(
    event_name: &str,
    payload: &[u8],
    received_at: Timestamp,
) -> Result<EventRecord, MalformedEvent> {
    let event = event_name.parse::<ProcessState>()?;

    let text = std::str::from_utf8(payload).map_err(|_| MalformedEvent::NotUtf8)?;
    let header_line = text.split_once('\n').map_or(text, |(line, _)| line);
    let headers = HeaderMap::parse(header_line)?;

    let process_name = required(&headers, "processname").and_then(|v| {
        ProcessName::new(v).ok_or(MalformedEvent::EmptyValue { key: "processname" })
    })?;
    let group_name = required(&headers, "groupname").and_then(|v| {
        GroupName::new(v).ok_or(MalformedEvent::EmptyValue { key: "groupname" })
    })?;
    let from_state = required(&headers, "from_state").and_then(|v| {
        ProcessState::from_name(v).ok_or_else(|| MalformedEvent::InvalidState {
            key: "from_state",
            value: v.to_string(),
        })
    })?;

    Ok(EventRecord {
        event,
        group_name,
        process_name,
        from_state,
        headers,
        received_at,
    })
}

fn required<'a>(headers: &'a HeaderMap, key: &'static str) -> Result<&'a str, MalformedEvent> {
    headers.get(key).ok_or(MalformedEvent::MissingKey { key })
}
