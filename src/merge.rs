//! Combine per-file parse outcomes into one aggregate.

use std::path::PathBuf;

use crate::parsers::helpers::CaseInsensitiveSet;
use crate::parsers::{ParseOutcome, ParsedLog, TimeSpan};

/// Merge outcomes keyed by the file they came from.
///
/// Readings are concatenated and re-sorted by timestamp when the aggregate
/// is built. Errors keep their own file path and inherit the key's path
/// when they carry none. Zero readings overall is a failed outcome, with
/// every error preserved.
pub fn merge<I>(results: I) -> ParseOutcome
where
    I: IntoIterator<Item = (PathBuf, ParseOutcome)>,
{
    let mut readings = Vec::new();
    let mut errors = Vec::new();
    let mut devices = CaseInsensitiveSet::default();
    let mut signals = CaseInsensitiveSet::default();
    let mut span: Option<TimeSpan> = None;
    let mut files = 0usize;

    for (path, outcome) in results {
        files += 1;
        if let Some(log) = outcome.log {
            for reading in log.into_readings() {
                devices.insert(&reading.device_id);
                signals.insert(&reading.signal_key);
                match span.as_mut() {
                    Some(span) => span.include(reading.timestamp),
                    None => {
                        span = Some(TimeSpan {
                            start: reading.timestamp,
                            end: reading.timestamp,
                        })
                    }
                }
                readings.push(reading);
            }
        }

        errors.extend(outcome.errors.into_iter().map(|mut error| {
            if error.file_path.is_none() {
                error.file_path = Some(path.clone());
            }
            error
        }));
    }

    let outcome = match span {
        Some(span) => ParseOutcome::new(
            ParsedLog::from_parts(readings, devices, signals, span),
            errors,
        ),
        None => ParseOutcome::failed(errors),
    };

    tracing::info!(
        files,
        entries = outcome.log.as_ref().map_or(0, |l| l.entry_count()),
        errors = outcome.errors.len(),
        "merged parse results"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::{LineError, ParseError, Reading, Value};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::path::Path;

    fn ts(sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, sec)
            .unwrap()
    }

    fn reading(device: &str, sec: u32, value: i32) -> Reading {
        Reading {
            device_id: device.to_string(),
            signal_key: format!("{}::Speed", device),
            signal_name: "Speed".to_string(),
            timestamp: ts(sec),
            value: Value::Integer(value),
        }
    }

    fn outcome(readings: Vec<Reading>, errors: Vec<ParseError>) -> ParseOutcome {
        match ParsedLog::from_readings(readings) {
            Some(log) => ParseOutcome::new(log, errors),
            None => ParseOutcome::failed(errors),
        }
    }

    #[test]
    fn test_merge_single_file_is_identity() {
        let single = outcome(
            vec![reading("Line-2", 2, 20), reading("Line-2", 0, 10)],
            vec![ParseError::new(Some(Path::new("a.log")), 4, "junk", &LineError::NoMatch)],
        );
        let merged = merge([(PathBuf::from("a.log"), single.clone())]);
        assert_eq!(merged, single);
    }

    #[test]
    fn test_merge_interleaves_and_unions() {
        let a = outcome(vec![reading("Line-2", 0, 1), reading("Line-2", 4, 2)], vec![]);
        let b = outcome(vec![reading("LINE-2", 2, 3), reading("Press-4", 6, 4)], vec![]);
        let merged = merge([(PathBuf::from("a.log"), a), (PathBuf::from("b.log"), b)]);

        let log = merged.log.unwrap();
        let times: Vec<_> = log.readings().iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![ts(0), ts(2), ts(4), ts(6)]);
        assert_eq!(log.devices(), &["Line-2".to_string(), "Press-4".to_string()]);
        assert_eq!(log.signal_count(), 2);
        assert_eq!(log.span(), TimeSpan::new(ts(0), ts(6)).unwrap());
    }

    #[test]
    fn test_merge_without_readings_fails_and_keeps_errors() {
        let a = ParseOutcome::failed(vec![ParseError::new(None, 1, "x", &LineError::NoMatch)]);
        let b = ParseOutcome::failed(vec![ParseError::new(
            Some(Path::new("other.log")),
            2,
            "y",
            &LineError::NoMatch,
        )]);
        let merged = merge([(PathBuf::from("a.log"), a), (PathBuf::from("b.log"), b)]);

        assert!(!merged.success());
        assert_eq!(merged.errors.len(), 2);
        assert_eq!(merged.errors[0].file_path.as_deref(), Some(Path::new("a.log")));
        assert_eq!(merged.errors[1].file_path.as_deref(), Some(Path::new("other.log")));
    }

    #[test]
    fn test_merge_nothing() {
        let merged = merge(Vec::new());
        assert_eq!(merged, ParseOutcome::default());
    }
}
