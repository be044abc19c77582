use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use super::helpers::CaseInsensitiveSet;

/// Separator between the device part and the signal part of a signal key.
/// Never appears inside a device or signal token.
pub const SIGNAL_KEY_SEPARATOR: &str = "::";

/// Timestamp rendering used for diagnostics and summaries
pub const DISPLAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Signal value kinds
#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumString, Eq, Hash, PartialEq, Serialize)]
#[strum(ascii_case_insensitive)]
pub enum SignalType {
    Boolean,
    Integer,
    #[strum(to_string = "Text", serialize = "String")]
    Text,
}

/// Value carried by a reading or an interval
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Value {
    Bool(bool),
    Integer(i32),
    Text(String),
}

impl Value {
    pub fn signal_type(&self) -> SignalType {
        match self {
            Value::Bool(_) => SignalType::Boolean,
            Value::Integer(_) => SignalType::Integer,
            Value::Text(_) => SignalType::Text,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i32(*i),
            Value::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Inclusive `[start, end]` time bound
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct TimeSpan {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeSpan {
    /// Build a span, returning `None` when `end` precedes `start`
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// Widen the span so it covers `timestamp`
    pub fn include(&mut self, timestamp: NaiveDateTime) {
        if timestamp < self.start {
            self.start = timestamp;
        }
        if timestamp > self.end {
            self.end = timestamp;
        }
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format(DISPLAY_TIMESTAMP_FORMAT),
            self.end.format(DISPLAY_TIMESTAMP_FORMAT)
        )
    }
}

/// One timestamped observation extracted from a single log line.
///
/// The type tag is derived from the value, so the two can never disagree.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reading {
    pub device_id: String,
    /// `device[@unit]::signal`
    pub signal_key: String,
    /// Human-readable signal name (the part after the last `::`)
    pub signal_name: String,
    pub timestamp: NaiveDateTime,
    pub value: Value,
}

impl Reading {
    pub fn signal_type(&self) -> SignalType {
        self.value.signal_type()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} = {}",
            self.timestamp.format(DISPLAY_TIMESTAMP_FORMAT),
            self.signal_key,
            self.value
        )
    }
}

/// Reason a single line could not be turned into a reading
#[derive(Clone, Debug, Error, PartialEq)]
pub enum LineError {
    #[error("Line does not match expected format.")]
    NoMatch,
    #[error("Invalid timestamp '{0}'.")]
    Timestamp(String),
    #[error("Path segment missing.")]
    MissingPath,
    #[error("Device id segment missing.")]
    MissingDevice,
    #[error("Unable to extract device id from '{0}'.")]
    DeviceId(String),
    #[error("Signal name missing.")]
    MissingSignal,
    #[error("Token '{0}' contains the reserved '::' separator.")]
    ReservedSeparator(String),
    #[error("Missing {0} column.")]
    MissingColumn(&'static str),
    #[error("Unable to parse boolean value '{0}'.")]
    InvalidBoolean(String),
    #[error("Unable to parse integer value '{0}'.")]
    InvalidInteger(String),
}

/// Diagnostic for one line that failed to parse
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParseError {
    pub file_path: Option<PathBuf>,
    /// 1-based line number
    pub line: u64,
    /// Full raw line text
    pub content: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(
        file_path: Option<&Path>,
        line: u64,
        content: impl Into<String>,
        reason: &LineError,
    ) -> Self {
        Self {
            file_path: file_path.map(Path::to_path_buf),
            line,
            content: content.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self
            .file_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        write!(
            f,
            "[{}] Line {}: {} | {}",
            file, self.line, self.reason, self.content
        )
    }
}

/// Progress notification for the file currently being read
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParseProgress {
    pub file_path: PathBuf,
    pub lines_read: u64,
    pub total_lines: Option<u64>,
    pub emitted_at: DateTime<Utc>,
}

impl ParseProgress {
    pub fn new(file_path: impl Into<PathBuf>, lines_read: u64, total_lines: Option<u64>) -> Self {
        Self {
            file_path: file_path.into(),
            lines_read,
            total_lines,
            emitted_at: Utc::now(),
        }
    }

    /// Completion percentage, 0 when the total is unknown
    pub fn percent(&self) -> f64 {
        match self.total_lines {
            Some(total) if total > 0 && self.lines_read > 0 => {
                (self.lines_read as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        }
    }

    pub fn is_final(&self) -> bool {
        self.total_lines.is_some()
    }
}

/// Aggregate of all readings from one or more files.
///
/// Never empty; `span` bounds every reading's timestamp.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParsedLog {
    readings: Vec<Reading>,
    devices: Vec<String>,
    signals: Vec<String>,
    span: TimeSpan,
}

impl ParsedLog {
    /// Build a log from readings in any order, computing devices, signals and
    /// span. Returns `None` when `readings` is empty.
    pub fn from_readings(readings: Vec<Reading>) -> Option<Self> {
        let first = readings.first()?.timestamp;
        let mut span = TimeSpan {
            start: first,
            end: first,
        };
        let mut devices = CaseInsensitiveSet::default();
        let mut signals = CaseInsensitiveSet::default();
        for reading in &readings {
            span.include(reading.timestamp);
            devices.insert(&reading.device_id);
            signals.insert(&reading.signal_key);
        }
        Some(Self::from_parts(readings, devices, signals, span))
    }

    /// Assemble a log from pre-tracked sets and span. Readings are sorted
    /// by timestamp (stable, so same-timestamp readings keep input order).
    pub(crate) fn from_parts(
        mut readings: Vec<Reading>,
        devices: CaseInsensitiveSet,
        signals: CaseInsensitiveSet,
        span: TimeSpan,
    ) -> Self {
        readings.sort_by_key(|r| r.timestamp);
        debug_assert!(!readings.is_empty());
        debug_assert!(readings.iter().all(|r| span.contains(r.timestamp)));
        Self {
            readings,
            devices: devices.into_sorted_vec(),
            signals: signals.into_sorted_vec(),
            span,
        }
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    pub fn signals(&self) -> &[String] {
        &self.signals
    }

    pub fn span(&self) -> TimeSpan {
        self.span
    }

    pub fn entry_count(&self) -> usize {
        self.readings.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn into_readings(self) -> Vec<Reading> {
        self.readings
    }
}

/// Result of parsing one file, or of merging several.
///
/// Success means at least one reading was produced; errors may be present
/// either way.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ParseOutcome {
    pub log: Option<ParsedLog>,
    pub errors: Vec<ParseError>,
}

impl ParseOutcome {
    pub fn new(log: ParsedLog, errors: Vec<ParseError>) -> Self {
        Self {
            log: Some(log),
            errors,
        }
    }

    pub fn failed(errors: Vec<ParseError>) -> Self {
        Self { log: None, errors }
    }

    pub fn success(&self) -> bool {
        self.log.is_some()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
