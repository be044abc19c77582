//! Tab-delimited PLC log parser.
//!
//! Lines look like:
//!
//! ```text
//! 2024-01-01 00:00:00.123456 [INFO] /Area-1/Mixer@B\tRunning\tBOOL\tON
//! ```
//!
//! Columns after the level are path, signal, type hint, value and an
//! optional alternate value used when the value column is blank. A line
//! that contains a TAB is always split on TABs. Lines without any TAB are
//! split on runs of two or more whitespace characters.

use chrono::NaiveDateTime;
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;
use strum::EnumString;

use super::format::LineFormat;
use super::helpers::{
    compose_signal_key, convert_value, extract_device_id, infer_signal_type, parse_bool,
    split_device_path,
};
use super::types::{LineError, Reading, SignalType};

/// Detection pattern: a timestamp at the start of the line
static DETECT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d{3,6}.*$")
        .expect("Failed to compile regex")
});

static LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?<ts>\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d{3,6})\s*\[(?<level>[^\]]*)\]\s*(?<rest>.*)$",
    )
    .expect("Failed to compile regex")
});

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("Failed to compile regex"));

static DEVICE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9_-]+)(?:@[^\]]+)?$").expect("Failed to compile regex")
});

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Clone, Copy, Debug, EnumString, PartialEq)]
#[strum(ascii_case_insensitive)]
enum TypeHint {
    #[strum(
        serialize = "BOOL",
        serialize = "BOOLEAN",
        serialize = "DIGITAL",
        serialize = "IN",
        serialize = "OUT"
    )]
    Digital,
    #[strum(
        serialize = "INT",
        serialize = "INTEGER",
        serialize = "DINT",
        serialize = "WORD",
        serialize = "DWORD"
    )]
    Integer,
}

/// Digital hints are also used for analog I/O channels, so a digital hint
/// with a non-boolean value is inferred. Unknown hints mean text.
fn resolve_type(hint: &str, value: &str) -> SignalType {
    let hint = hint.trim();
    if hint.is_empty() {
        return infer_signal_type(value);
    }
    match TypeHint::from_str(hint) {
        Ok(TypeHint::Digital) if parse_bool(value).is_some() => SignalType::Boolean,
        Ok(TypeHint::Digital) => infer_signal_type(value),
        Ok(TypeHint::Integer) => SignalType::Integer,
        Err(_) => SignalType::Text,
    }
}

/// True for `YYYY-MM-DD<ws>HH:MM:SS.f{3,6}` with ASCII digits
fn is_timestamp_shape(token: &str) -> bool {
    fn shaped(bytes: &[u8], pattern: &[u8]) -> bool {
        bytes.len() == pattern.len()
            && bytes.iter().zip(pattern).all(|(b, p)| match p {
                b'd' => b.is_ascii_digit(),
                other => b == other,
            })
    }

    let Some(date) = token.get(..10) else {
        return false;
    };
    if !shaped(date.as_bytes(), b"dddd-dd-dd") {
        return false;
    }
    let after_date = &token[10..];
    let time = after_date.trim_start();
    if time.len() == after_date.len() {
        return false;
    }
    let Some((clock, fraction)) = time.split_once('.') else {
        return false;
    };
    shaped(clock.as_bytes(), b"dd:dd:dd")
        && (3..=6).contains(&fraction.len())
        && fraction.bytes().all(|b| b.is_ascii_digit())
}

/// Raw columns of one tab line, before conversion
struct TabColumns<'a> {
    timestamp: &'a str,
    path: &'a str,
    signal: &'a str,
    hint: &'a str,
    value: &'a str,
    alternate: Option<&'a str>,
}

impl<'a> TabColumns<'a> {
    /// Assign split columns `[path, signal, hint, value, alt?]`
    fn from_split(timestamp: &'a str, columns: &[&'a str]) -> Result<Self, LineError> {
        let column = |idx: usize, name: &'static str| {
            columns.get(idx).copied().ok_or(LineError::MissingColumn(name))
        };
        Ok(Self {
            timestamp,
            path: column(0, "path")?,
            signal: column(1, "signal")?,
            hint: column(2, "type")?,
            value: column(3, "value")?,
            alternate: columns.get(4).copied(),
        })
    }
}

/// Tab-delimited PLC log parser
#[derive(Clone, Copy, Debug, Default)]
pub struct PlcTab;

impl PlcTab {
    pub const NAME: &'static str = "plc_tab";

    pub fn new() -> Self {
        Self
    }

    /// Index-based tokenizer for TAB-separated lines
    fn tokenize(line: &str) -> Option<TabColumns<'_>> {
        let level_start = line.find('[')?;
        let timestamp = line[..level_start].trim_end();
        if !is_timestamp_shape(timestamp) {
            return None;
        }

        let level_end = level_start + 1 + line[level_start + 1..].find(']')?;
        let rest = line[level_end + 1..].trim_start();
        let (path, remainder) = rest.split_once('\t')?;

        let mut columns = vec![path.trim()];
        columns.extend(remainder.split('\t').map(str::trim));
        TabColumns::from_split(timestamp, &columns).ok()
    }

    fn split_rest(rest: &str) -> Vec<&str> {
        if rest.contains('\t') {
            rest.split('\t').map(str::trim).collect()
        } else {
            WHITESPACE_RUN
                .split(rest)
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .collect()
        }
    }

    fn parse_timestamp(token: &str) -> Result<NaiveDateTime, LineError> {
        // The date/time gap may be any whitespace run
        let mut parts = token.split_whitespace();
        let normalized = match (parts.next(), parts.next(), parts.next()) {
            (Some(date), Some(time), None) => format!("{} {}", date, time),
            _ => return Err(LineError::Timestamp(token.to_string())),
        };
        NaiveDateTime::parse_from_str(&normalized, TIMESTAMP_FORMAT)
            .map_err(|_| LineError::Timestamp(token.to_string()))
    }

    fn build_reading(columns: &TabColumns<'_>) -> Result<Reading, LineError> {
        let timestamp = Self::parse_timestamp(columns.timestamp)?;
        let (segment, unit) = split_device_path(columns.path)?;
        let device_id = extract_device_id(segment, &DEVICE_REGEX)?;
        let signal = columns.signal.trim();
        let signal_key = compose_signal_key(&device_id, unit, signal)?;

        let mut value = columns.value.trim();
        if value.is_empty() {
            value = columns.alternate.map(str::trim).unwrap_or_default();
        }
        if value.is_empty() {
            return Err(LineError::MissingColumn("value"));
        }

        let signal_type = resolve_type(columns.hint, value);
        let value = convert_value(value, signal_type)?;

        Ok(Reading {
            device_id,
            signal_key,
            signal_name: signal.to_string(),
            timestamp,
            value,
        })
    }
}

impl LineFormat for PlcTab {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn line_pattern(&self) -> &Regex {
        &DETECT_REGEX
    }

    fn parse_line_fast(&self, line: &str) -> Option<Reading> {
        let columns = Self::tokenize(line)?;
        Self::build_reading(&columns).ok()
    }

    fn parse_line_fallback(&self, line: &str) -> Result<Reading, LineError> {
        let caps = LINE_REGEX.captures(line).ok_or(LineError::NoMatch)?;
        let timestamp = caps.name("ts").map(|m| m.as_str()).unwrap_or_default();
        let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or_default();
        let split = Self::split_rest(rest);
        let columns = TabColumns::from_split(timestamp, &split)?;
        Self::build_reading(&columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::types::Value;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn parse(line: &str) -> Result<Reading, LineError> {
        PlcTab::new().parse_line(line)
    }

    #[test]
    fn test_parse_tab_line() {
        let r = parse("2024-01-01 00:00:00.123456 [INFO] /Area-1/Mixer@B\tRunning\tBOOL\tON")
            .unwrap();
        assert_eq!(r.device_id, "Mixer");
        assert_eq!(r.signal_key, "Mixer@B::Running");
        assert_eq!(r.value, Value::Bool(true));
        assert_eq!(
            r.timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_micro_opt(0, 0, 0, 123_456)
                .unwrap()
        );
    }

    #[test]
    fn test_digital_hint_requires_bool_value() {
        let r = parse("2024-01-01 00:00:00.000 [INFO] /Line-2\tState\tDIGITAL\tSTOPPED").unwrap();
        assert_eq!(r.value, Value::Text("STOPPED".to_string()));
        let r = parse("2024-01-01 00:00:00.000 [INFO] /Line-2\tState\tIN\t7").unwrap();
        assert_eq!(r.value, Value::Integer(7));
    }

    #[test]
    fn test_integer_hint_forces_integer() {
        let r = parse("2024-01-01 00:00:00.000 [INFO] /Line-2\tCount\tWORD\t1").unwrap();
        assert_eq!(r.value, Value::Integer(1));
        assert_eq!(
            parse("2024-01-01 00:00:00.000 [INFO] /Line-2\tCount\tDWORD\tabc"),
            Err(LineError::InvalidInteger("abc".to_string()))
        );
    }

    #[test]
    fn test_unknown_hint_is_text() {
        let r = parse("2024-01-01 00:00:00.000 [INFO] /Line-2\tMode\tSTRING\t1").unwrap();
        assert_eq!(r.value, Value::Text("1".to_string()));
        let r = parse("2024-01-01 00:00:00.000 [INFO] /Line-2\tLevel\tREAL\t42").unwrap();
        assert_eq!(r.value, Value::Text("42".to_string()));
        let r = parse("2024-01-01 00:00:00.000 [INFO] /Line-2\tLevel\t\t42").unwrap();
        assert_eq!(r.value, Value::Integer(42));
    }

    #[test]
    fn test_blank_value_uses_alternate() {
        let r = parse("2024-01-01 00:00:00.000 [INFO] /Line-2\tMode\tSTRING\t \tAUTO").unwrap();
        assert_eq!(r.value, Value::Text("AUTO".to_string()));
        assert_eq!(
            parse("2024-01-01 00:00:00.000 [INFO] /Line-2\tMode\tSTRING\t "),
            Err(LineError::MissingColumn("value"))
        );
    }

    #[test]
    fn test_whitespace_run_fallback() {
        let format = PlcTab::new();
        let line = "2024-01-01 00:00:00.500 [WARN] /Area/Press-4  Pressure  INT  120";
        assert!(format.parse_line_fast(line).is_none());
        let r = format.parse_line(line).unwrap();
        assert_eq!(r.signal_key, "Press-4::Pressure");
        assert_eq!(r.value, Value::Integer(120));
    }

    #[test]
    fn test_tab_split_takes_precedence() {
        // Double spaces inside a TAB line belong to the column text
        let r = parse("2024-01-01 00:00:00.000 [INFO] /Line-2\tDoor  Open\tBOOL\t0").unwrap();
        assert_eq!(r.signal_name, "Door  Open");
        assert_eq!(r.value, Value::Bool(false));
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(parse("no timestamp here"), Err(LineError::NoMatch));
        assert_eq!(
            parse("2024-01-01 00:00:00.000 [INFO] /Line-2\tSpeed"),
            Err(LineError::MissingColumn("type"))
        );
        assert_eq!(
            parse("2024-02-30 00:00:00.000 [INFO] /Line-2\tSpeed\tINT\t1"),
            Err(LineError::Timestamp("2024-02-30 00:00:00.000".to_string()))
        );
    }

    #[test]
    fn test_detection_pattern() {
        let format = PlcTab::new();
        let lines = vec![
            "2024-01-01 00:00:00.000 [INFO] /Line-2\tSpeed\tINT\t1".to_string(),
            "2024-01-01   00:00:00.12 broken".to_string(),
            "2024-01-01 00:00:01.000000 [INFO] /Line-2\tSpeed\tINT\t2".to_string(),
        ];
        assert!(format.can_handle(&lines));
    }

    proptest! {
        #[test]
        fn prop_fast_path_matches_fallback(
            fraction in "[0-9]{3,6}",
            gap in "[ \t]{1,2}",
            level in "[A-Z]{0,5}",
            path in "[A-Za-z0-9_/@ -]{1,16}",
            signal in "[A-Za-z0-9 _]{1,10}",
            hint in prop::sample::select(vec!["BOOL", "IN", "INT", "WORD", "STRING", ""]),
            value in "[A-Za-z0-9 _,]{0,8}",
            alternate in proptest::option::of("[A-Za-z0-9]{1,6}"),
        ) {
            let mut line = format!(
                "2024-05-06{gap}07:08:09.{fraction} [{level}]{gap}{path}\t{signal}\t{hint}\t{value}"
            );
            if let Some(alt) = alternate {
                line.push('\t');
                line.push_str(&alt);
            }
            let format = PlcTab::new();
            if let Some(fast) = format.parse_line_fast(&line) {
                prop_assert_eq!(Ok(fast), format.parse_line_fallback(&line));
            }
        }
    }
}
