//! Session data types.
//!
//! The dataset currently loaded, the outcome of a load operation and the
//! summary counts shown in status displays.

use serde::Serialize;
use std::path::PathBuf;

use crate::config::DEFAULT_WINDOW_SECS;
use crate::parsers::types::DISPLAY_TIMESTAMP_FORMAT;
use crate::parsers::{ParseError, ParseProgress, ParsedLog, TimeSpan};

/// Bounds for a user-chosen window duration, in seconds
pub const MIN_WINDOW_SECS: f64 = 0.1;
pub const MAX_WINDOW_SECS: f64 = 86_400.0;

// ============================================================================
// Core Types
// ============================================================================

/// The merged result of one successful load
#[derive(Clone, Debug, Serialize)]
pub struct LoadedDataset {
    /// Files in the order they were parsed
    pub files: Vec<PathBuf>,
    pub log: ParsedLog,
    /// Line diagnostics from every file
    pub errors: Vec<ParseError>,
}

/// Result of a load operation
#[derive(Debug)]
pub enum LoadResult {
    Success(Box<LoadedDataset>),
    /// No file produced a reading; carries every line diagnostic
    Failed(Vec<ParseError>),
}

impl LoadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, LoadResult::Success(_))
    }

    pub fn errors(&self) -> &[ParseError] {
        match self {
            LoadResult::Success(dataset) => &dataset.errors,
            LoadResult::Failed(errors) => errors,
        }
    }
}

/// What a load did to the session
#[derive(Clone, Debug, PartialEq)]
pub enum LoadSummary {
    /// The dataset was replaced
    Loaded(LogStats),
    /// Nothing was loaded; carries every line diagnostic
    Failed(Vec<ParseError>),
}

/// Current state of file loading
#[derive(Clone, Debug, Default, PartialEq)]
pub enum LoadingState {
    /// No loading in progress
    #[default]
    Idle,
    /// Loading a file (contains the file name being read)
    Loading(String),
}

impl LoadingState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadingState::Loading(_))
    }
}

/// Messages sent from a background load to its session
#[derive(Debug)]
pub enum LoadMessage {
    /// A file started parsing
    FileStarted(PathBuf),
    Progress(ParseProgress),
}

/// Summary counts for the loaded dataset
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LogStats {
    pub files: usize,
    pub entries: usize,
    pub devices: usize,
    pub signals: usize,
    pub errors: usize,
    /// `start - end`, absent when nothing is loaded
    pub time_range: Option<String>,
    pub duration_secs: f64,
}

impl LogStats {
    pub fn from_dataset(dataset: &LoadedDataset) -> Self {
        let span = dataset.log.span();
        Self {
            files: dataset.files.len(),
            entries: dataset.log.entry_count(),
            devices: dataset.log.device_count(),
            signals: dataset.log.signal_count(),
            errors: dataset.errors.len(),
            time_range: Some(span.to_string()),
            duration_secs: span.duration().num_milliseconds() as f64 / 1000.0,
        }
    }
}

/// Format a visible range with its length, e.g.
/// `2024-01-01 00:00:00.000 - 2024-01-01 00:00:10.000  (10.00s)`
pub fn format_range(span: TimeSpan) -> String {
    let seconds = span.duration().num_milliseconds() as f64 / 1000.0;
    format!(
        "{} - {}  ({:.2}s)",
        span.start.format(DISPLAY_TIMESTAMP_FORMAT),
        span.end.format(DISPLAY_TIMESTAMP_FORMAT),
        seconds
    )
}

/// Clamp a requested window duration, mapping non-finite input to the
/// default
pub fn normalize_window_secs(secs: f64) -> f64 {
    if secs.is_finite() {
        secs.clamp(MIN_WINDOW_SECS, MAX_WINDOW_SECS)
    } else {
        DEFAULT_WINDOW_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::{Reading, Value};
    use chrono::NaiveDate;

    #[test]
    fn test_normalize_window_secs() {
        assert_eq!(normalize_window_secs(0.0), 0.1);
        assert_eq!(normalize_window_secs(5.0), 5.0);
        assert_eq!(normalize_window_secs(1e9), 86_400.0);
        assert_eq!(normalize_window_secs(f64::NAN), 10.0);
        assert_eq!(normalize_window_secs(f64::INFINITY), 10.0);
    }

    #[test]
    fn test_load_result_errors() {
        let error = ParseError::new(
            Some(std::path::Path::new("a.log")),
            3,
            "junk".to_string(),
            &crate::parsers::LineError::NoMatch,
        );
        let failed = LoadResult::Failed(vec![error.clone()]);
        assert!(!failed.is_success());
        assert_eq!(failed.errors(), &[error]);
    }

    #[test]
    fn test_stats_and_range_text() {
        let at = |sec: u32| {
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, sec)
                .unwrap()
        };
        let reading = |sec: u32| Reading {
            device_id: "Line-2".to_string(),
            signal_key: "Line-2::Speed".to_string(),
            signal_name: "Speed".to_string(),
            timestamp: at(sec),
            value: Value::Integer(sec as i32),
        };
        let dataset = LoadedDataset {
            files: vec![PathBuf::from("a.log")],
            log: ParsedLog::from_readings(vec![reading(0), reading(10)]).unwrap(),
            errors: Vec::new(),
        };

        let stats = LogStats::from_dataset(&dataset);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.signals, 1);
        assert_eq!(stats.duration_secs, 10.0);
        assert_eq!(
            format_range(TimeSpan::new(at(0), at(10)).unwrap()),
            "2024-01-01 00:00:00.000 - 2024-01-01 00:00:10.000  (10.00s)"
        );
    }
}
