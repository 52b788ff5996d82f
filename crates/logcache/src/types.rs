//! Core types for the tail and query engine.
//!
//! This module provides:
//! - [`Envelope`] — One observed data point for a source
//! - [`Payload`] — The type-specific body of an envelope
//! - [`EnvelopeType`] — The five envelope kinds log-cache stores
//! - [`TimeRange`] — Half-open nanosecond interval
//! - [`QueryFilter`] — Filter and paging options for one logical fetch

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Largest `line_limit` the remote service accepts for one read.
pub const MAX_LINE_LIMIT: usize = 1000;

/// Default number of envelopes a tail returns.
pub const DEFAULT_LINE_LIMIT: usize = 10;

/// The kind of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    /// A log line
    Log,
    /// A monotonically increasing counter
    Counter,
    /// A set of point-in-time values
    Gauge,
    /// A start/stop duration
    Timer,
    /// A titled event
    Event,
}

impl EnvelopeType {
    /// All envelope types, in display order.
    pub const ALL: [Self; 5] = [Self::Log, Self::Counter, Self::Gauge, Self::Timer, Self::Event];

    /// Returns the lowercase name used on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Timer => "timer",
            Self::Event => "event",
        }
    }

    /// Returns the uppercase label used in text output and read requests.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Log => "LOG",
            Self::Counter => "COUNTER",
            Self::Gauge => "GAUGE",
            Self::Timer => "TIMER",
            Self::Event => "EVENT",
        }
    }
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvelopeType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                EngineError::InvalidInput(format!(
                    "unknown envelope type '{s}', expected one of: log, counter, gauge, timer, event"
                ))
            })
    }
}

/// Which output stream a log line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    /// Standard output
    #[default]
    Out,
    /// Standard error
    Err,
}

impl LogStream {
    /// Returns the uppercase label used in text output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Out => "OUT",
            Self::Err => "ERR",
        }
    }
}

/// One named value inside a gauge envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeValue {
    /// Unit of measurement (may be empty)
    #[serde(default)]
    pub unit: String,
    /// The value
    pub value: f64,
}

/// Type-specific body of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    /// A log line.
    Log {
        /// Decoded log text
        body: String,
        /// Stream the line was written to
        #[serde(default)]
        stream: LogStream,
    },
    /// A counter sample.
    Counter {
        /// Counter name
        name: String,
        /// Increment since the previous sample
        #[serde(default)]
        delta: u64,
        /// Running total
        #[serde(default)]
        total: u64,
    },
    /// A gauge sample with one or more named values.
    Gauge {
        /// Values keyed by metric name
        metrics: BTreeMap<String, GaugeValue>,
    },
    /// A timer with start and stop instants in nanoseconds.
    Timer {
        /// Timer name
        name: String,
        /// Start instant
        start: i64,
        /// Stop instant
        stop: i64,
    },
    /// A titled event.
    Event {
        /// Event title
        title: String,
        /// Event body
        #[serde(default)]
        body: String,
    },
}

/// One observed data point for a source.
///
/// Envelopes are immutable once fetched. Timestamps are not unique, so the
/// identity used for deduplication is `(source_id, timestamp, fingerprint)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Source (application or component) that emitted the envelope
    pub source_id: String,
    /// Instance of the source, often an index
    #[serde(default)]
    pub instance_id: String,
    /// Nanoseconds since the UNIX epoch
    pub timestamp: i64,
    /// Free-form tags
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Type-specific body
    pub payload: Payload,
}

/// Identity of an envelope for at-most-once emission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvelopeIdentity {
    /// Source of the envelope
    pub source_id: String,
    /// Timestamp in nanoseconds
    pub timestamp: i64,
    /// Hash over instance, tags and payload
    pub fingerprint: [u8; 32],
}

impl Envelope {
    /// Creates an envelope with no instance id and no tags.
    #[must_use]
    pub fn new(source_id: impl Into<String>, timestamp: i64, payload: Payload) -> Self {
        Self {
            source_id: source_id.into(),
            instance_id: String::new(),
            timestamp,
            tags: BTreeMap::new(),
            payload,
        }
    }

    /// Convenience constructor for a stdout log envelope.
    #[must_use]
    pub fn log(source_id: impl Into<String>, timestamp: i64, body: impl Into<String>) -> Self {
        Self::new(
            source_id,
            timestamp,
            Payload::Log {
                body: body.into(),
                stream: LogStream::Out,
            },
        )
    }

    /// Sets the instance id.
    #[must_use]
    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Returns the kind of this envelope.
    #[must_use]
    pub const fn envelope_type(&self) -> EnvelopeType {
        match self.payload {
            Payload::Log { .. } => EnvelopeType::Log,
            Payload::Counter { .. } => EnvelopeType::Counter,
            Payload::Gauge { .. } => EnvelopeType::Gauge,
            Payload::Timer { .. } => EnvelopeType::Timer,
            Payload::Event { .. } => EnvelopeType::Event,
        }
    }

    /// Returns the counter or timer name, if the payload has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.payload {
            Payload::Counter { name, .. } | Payload::Timer { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Hashes everything except source and timestamp.
    #[must_use]
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.instance_id.as_bytes());
        hasher.update(&[0]);
        for (key, value) in &self.tags {
            hasher.update(key.as_bytes());
            hasher.update(&[0]);
            hasher.update(value.as_bytes());
            hasher.update(&[0]);
        }
        // Payload serialization only fails on non-string map keys, which it has none of.
        let payload = serde_json::to_vec(&self.payload).unwrap_or_default();
        hasher.update(&payload);
        *hasher.finalize().as_bytes()
    }

    /// Returns the deduplication identity of this envelope.
    #[must_use]
    pub fn identity(&self) -> EnvelopeIdentity {
        EnvelopeIdentity {
            source_id: self.source_id.clone(),
            timestamp: self.timestamp,
            fingerprint: self.fingerprint(),
        }
    }
}

/// Half-open time interval `[start, end)` in nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start of the range (inclusive)
    pub start: i64,
    /// End of the range (exclusive)
    pub end: i64,
}

impl TimeRange {
    /// Creates a new range. A reversed range is allowed and is simply empty.
    #[must_use]
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// A range with no upper bound.
    #[must_use]
    pub const fn since(start: i64) -> Self {
        Self { start, end: i64::MAX }
    }

    /// Returns true if no timestamp falls within this range.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns true if `start > end`.
    #[must_use]
    pub const fn is_reversed(&self) -> bool {
        self.start > self.end
    }

    /// Checks if a timestamp falls within this range.
    #[must_use]
    pub const fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Rejects reversed bounds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] if `start > end`.
    pub fn validate(&self) -> Result<()> {
        if self.is_reversed() {
            return Err(EngineError::InvalidInput(format!(
                "start time {} is after end time {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Filter and paging options for one logical fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Restrict to one envelope kind
    pub envelope_type: Option<EnvelopeType>,
    /// Restrict counters by name (implies counter)
    pub counter_name: Option<String>,
    /// Restrict gauges by metric name (implies gauge)
    pub gauge_name: Option<String>,
    /// Maximum envelopes per fetch, and per tail unless `exhaustive`
    pub line_limit: usize,
    /// Keep polling past the range
    pub follow: bool,
    /// Page through the whole range instead of stopping at `line_limit`
    pub exhaustive: bool,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_LIMIT)
    }
}

impl QueryFilter {
    /// Creates a filter that matches every envelope.
    #[must_use]
    pub const fn new(line_limit: usize) -> Self {
        Self {
            envelope_type: None,
            counter_name: None,
            gauge_name: None,
            line_limit,
            follow: false,
            exhaustive: false,
        }
    }

    /// Restricts to one envelope kind.
    #[must_use]
    pub const fn with_envelope_type(mut self, envelope_type: EnvelopeType) -> Self {
        self.envelope_type = Some(envelope_type);
        self
    }

    /// Restricts counters by name.
    #[must_use]
    pub fn with_counter_name(mut self, name: impl Into<String>) -> Self {
        self.counter_name = Some(name.into());
        self
    }

    /// Restricts gauges by metric name.
    #[must_use]
    pub fn with_gauge_name(mut self, name: impl Into<String>) -> Self {
        self.gauge_name = Some(name.into());
        self
    }

    /// Enables follow mode.
    #[must_use]
    pub const fn with_follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Lifts the total cap so the whole range is paged through.
    #[must_use]
    pub const fn exhaustive(mut self) -> Self {
        self.exhaustive = true;
        self
    }

    /// Checks the filter for conflicting or out-of-range options.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] if both name filters are set or
    /// `line_limit` is outside `1..=MAX_LINE_LIMIT`.
    pub fn validate(&self) -> Result<()> {
        if self.counter_name.is_some() && self.gauge_name.is_some() {
            return Err(EngineError::InvalidInput(
                "counter name and gauge name filters are mutually exclusive".to_string(),
            ));
        }
        if self.line_limit == 0 {
            return Err(EngineError::InvalidInput(
                "line limit must be greater than 0".to_string(),
            ));
        }
        if self.line_limit > MAX_LINE_LIMIT {
            return Err(EngineError::InvalidInput(format!(
                "line limit cannot be greater than {MAX_LINE_LIMIT}"
            )));
        }
        Ok(())
    }

    /// Returns the envelope type actually requested.
    ///
    /// A name filter overrides any explicit envelope type.
    #[must_use]
    pub const fn effective_type(&self) -> Option<EnvelopeType> {
        if self.counter_name.is_some() {
            Some(EnvelopeType::Counter)
        } else if self.gauge_name.is_some() {
            Some(EnvelopeType::Gauge)
        } else {
            self.envelope_type
        }
    }

    /// Returns the active name filter, if any.
    #[must_use]
    pub fn name_filter(&self) -> Option<&str> {
        self.counter_name.as_deref().or(self.gauge_name.as_deref())
    }

    /// Checks if an envelope passes this filter.
    #[must_use]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        if let Some(kind) = self.effective_type() {
            if envelope.envelope_type() != kind {
                return false;
            }
        }

        if let Some(ref wanted) = self.counter_name {
            return envelope.name() == Some(wanted.as_str());
        }

        if let Some(ref wanted) = self.gauge_name {
            return match &envelope.payload {
                Payload::Gauge { metrics } => metrics.contains_key(wanted),
                _ => false,
            };
        }

        true
    }
}
