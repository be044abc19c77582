//! PLC debug trace parser.
//!
//! Parses bracketed single-line trace output of the form:
//!
//! ```text
//! 2024-01-01 00:00:00.000 [INFO] [/Area-1/Line-2@U1] [Speed] (INT): 10
//! ```
//!
//! The timestamp always has millisecond precision and occupies the first
//! 23 characters of the line.

use chrono::NaiveDateTime;
use regex::{Captures, Regex};
use std::sync::LazyLock;

use super::format::LineFormat;
use super::helpers::{
    compose_signal_key, convert_value, extract_device_id, resolve_declared_type,
    split_device_path, DEFAULT_DEVICE_REGEX,
};
use super::types::{LineError, Reading};

static LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?<ts>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3})\s+\[(?<level>[^\]]+)\]\s+\[(?<path>[^\]]+)\]\s+\[(?<signal>[^\]]+)\]\s+\((?<dtype>[^)]+)\)\s*:\s*(?<value>.+?)\s*$",
    )
    .expect("Failed to compile regex")
});

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMP_LEN: usize = 23;

/// Raw tokens of one debug line, before conversion
struct DebugTokens<'a> {
    timestamp: &'a str,
    path: &'a str,
    signal: &'a str,
    dtype: &'a str,
    value: &'a str,
}

/// Forward-only scanner over a line, used by the fast path
struct Scanner<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    /// Skip whitespace and return how many bytes were skipped
    fn skip_whitespace(&mut self) -> usize {
        let rest = &self.line[self.pos..];
        let skipped = rest.len() - rest.trim_start().len();
        self.pos += skipped;
        skipped
    }

    /// Consume `open`, a non-empty run without `close`, then `close`
    fn delimited(&mut self, open: char, close: char) -> Option<&'a str> {
        let rest = self.line[self.pos..].strip_prefix(open)?;
        let end = rest.find(close)?;
        if end == 0 {
            return None;
        }
        let inner = &rest[..end];
        self.pos += open.len_utf8() + end + close.len_utf8();
        Some(inner)
    }

    fn expect(&mut self, c: char) -> Option<()> {
        self.line[self.pos..].strip_prefix(c)?;
        self.pos += c.len_utf8();
        Some(())
    }

    fn rest(&self) -> &'a str {
        &self.line[self.pos..]
    }
}

/// True for `YYYY-MM-DD HH:MM:SS.fff` with ASCII digits
fn is_timestamp_shape(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == TIMESTAMP_LEN
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            10 => *b == b' ',
            13 | 16 => *b == b':',
            19 => *b == b'.',
            _ => b.is_ascii_digit(),
        })
}

/// PLC debug trace parser
#[derive(Clone, Copy, Debug, Default)]
pub struct PlcDebug;

impl PlcDebug {
    pub const NAME: &'static str = "plc_debug";

    pub fn new() -> Self {
        Self
    }

    /// Positional tokenizer. Accepts exactly the lines the line regex
    /// accepts whose timestamp is ASCII, and yields the same tokens.
    fn tokenize(line: &str) -> Option<DebugTokens<'_>> {
        if !line.is_char_boundary(TIMESTAMP_LEN) {
            return None;
        }
        let timestamp = &line[..TIMESTAMP_LEN];
        if !is_timestamp_shape(timestamp) {
            return None;
        }

        let mut scanner = Scanner {
            line,
            pos: TIMESTAMP_LEN,
        };
        if scanner.skip_whitespace() == 0 {
            return None;
        }
        scanner.delimited('[', ']')?;
        if scanner.skip_whitespace() == 0 {
            return None;
        }
        let path = scanner.delimited('[', ']')?;
        if scanner.skip_whitespace() == 0 {
            return None;
        }
        let signal = scanner.delimited('[', ']')?;
        if scanner.skip_whitespace() == 0 {
            return None;
        }
        let dtype = scanner.delimited('(', ')')?;
        scanner.skip_whitespace();
        scanner.expect(':')?;
        scanner.skip_whitespace();

        let value = scanner.rest().trim_end();
        if value.is_empty() {
            return None;
        }

        Some(DebugTokens {
            timestamp,
            path,
            signal,
            dtype,
            value,
        })
    }

    fn tokens_from_captures<'a>(caps: &Captures<'a>) -> DebugTokens<'a> {
        let group = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or_default();
        DebugTokens {
            timestamp: group("ts"),
            path: group("path"),
            signal: group("signal"),
            dtype: group("dtype"),
            value: group("value"),
        }
    }

    fn build_reading(tokens: &DebugTokens<'_>) -> Result<Reading, LineError> {
        let timestamp = NaiveDateTime::parse_from_str(tokens.timestamp, TIMESTAMP_FORMAT)
            .map_err(|_| LineError::Timestamp(tokens.timestamp.to_string()))?;
        let (segment, unit) = split_device_path(tokens.path)?;
        let device_id = extract_device_id(segment, &DEFAULT_DEVICE_REGEX)?;
        let signal = tokens.signal.trim();
        let signal_key = compose_signal_key(&device_id, unit, signal)?;
        let signal_type = resolve_declared_type(tokens.dtype, tokens.value);
        let value = convert_value(tokens.value, signal_type)?;

        Ok(Reading {
            device_id,
            signal_key,
            signal_name: signal.to_string(),
            timestamp,
            value,
        })
    }
}

impl LineFormat for PlcDebug {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn line_pattern(&self) -> &Regex {
        &LINE_REGEX
    }

    fn parse_line_fast(&self, line: &str) -> Option<Reading> {
        let tokens = Self::tokenize(line)?;
        Self::build_reading(&tokens).ok()
    }

    fn parse_line_fallback(&self, line: &str) -> Result<Reading, LineError> {
        let caps = LINE_REGEX.captures(line).ok_or(LineError::NoMatch)?;
        Self::build_reading(&Self::tokens_from_captures(&caps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::types::{SignalType, Value};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn parse(line: &str) -> Result<Reading, LineError> {
        PlcDebug::new().parse_line(line)
    }

    #[test]
    fn test_parse_basic_line() {
        let r = parse("2024-01-01 00:00:01.250 [INFO] [/Area-1/Line-2] [Speed] (INT): 10").unwrap();
        assert_eq!(r.device_id, "Line-2");
        assert_eq!(r.signal_key, "Line-2::Speed");
        assert_eq!(r.signal_name, "Speed");
        assert_eq!(r.value, Value::Integer(10));
        assert_eq!(r.signal_type(), SignalType::Integer);
        assert_eq!(
            r.timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_milli_opt(0, 0, 1, 250)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_unit_and_bool() {
        let r = parse(
            "2024-03-05 10:20:30.000 [DEBUG] [/Plant/Area-3/Conveyor-7@Unit1] [Running] (BOOL): ON",
        )
        .unwrap();
        assert_eq!(r.device_id, "Conveyor-7");
        assert_eq!(r.signal_key, "Conveyor-7@Unit1::Running");
        assert_eq!(r.value, Value::Bool(true));
    }

    #[test]
    fn test_unknown_type_token_is_text() {
        let r = parse("2024-01-01 00:00:00.000 [INFO] [/Line-2] [Mode] (STRING):   AUTO  ")
            .unwrap();
        assert_eq!(r.value, Value::Text("AUTO".to_string()));
    }

    #[test]
    fn test_declared_type_mismatch_is_error() {
        assert_eq!(
            parse("2024-01-01 00:00:00.000 [INFO] [/Line-2] [Run] (BOOL): maybe"),
            Err(LineError::InvalidBoolean("maybe".to_string()))
        );
        assert_eq!(
            parse("2024-01-01 00:00:00.000 [INFO] [/Line-2] [Count] (DINT): 99999999999"),
            Err(LineError::InvalidInteger("99999999999".to_string()))
        );
    }

    #[test]
    fn test_blank_type_token_infers() {
        let r = parse("2024-01-01 00:00:00.000 [INFO] [/Line-2] [Count] ( ): 0x1F").unwrap();
        assert_eq!(r.value, Value::Integer(31));
    }

    #[test]
    fn test_device_pattern_applied() {
        let r = parse("2024-01-01 00:00:00.000 [INFO] [/Area/Robot_Arm-12x] [Pos] (INT): 3")
            .unwrap();
        assert_eq!(r.device_id, "Robot_Arm-12");
        assert!(matches!(
            parse("2024-01-01 00:00:00.000 [INFO] [/Area/Robot] [Pos] (INT): 3"),
            Err(LineError::DeviceId(_))
        ));
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(parse("hello world"), Err(LineError::NoMatch));
        assert_eq!(
            parse("2024-01-01 00:00:00.000 [INFO] [/Line-2] [Speed] INT: 10"),
            Err(LineError::NoMatch)
        );
        assert_eq!(
            parse("2024-13-01 00:00:00.000 [INFO] [/Line-2] [Speed] (INT): 10"),
            Err(LineError::Timestamp("2024-13-01 00:00:00.000".to_string()))
        );
        assert_eq!(
            parse("2024-01-01 00:00:00.000 [INFO] [/Line-2] [A::B] (INT): 10"),
            Err(LineError::ReservedSeparator("A::B".to_string()))
        );
    }

    #[test]
    fn test_fast_path_rejects_what_regex_rejects() {
        let format = PlcDebug::new();
        // Missing whitespace between brackets
        let line = "2024-01-01 00:00:00.000 [INFO][/Line-2] [Speed] (INT): 10";
        assert!(format.parse_line_fast(line).is_none());
        assert!(format.parse_line_fallback(line).is_err());
    }

    #[test]
    fn test_fast_and_fallback_agree_on_samples() {
        let format = PlcDebug::new();
        for line in [
            "2024-01-01 00:00:00.000 [INFO] [/Area-1/Line-2] [Speed] (INT): 10",
            "2024-01-01 00:00:00.000\t[WARN]  [ Area-1/Press-4@B ]\t[Door Open] (BOOL) :  low ",
            "2024-01-01 00:00:00.000 [INFO] [/Line-2] [Msg] (STRING): a: b [c] (d)",
        ] {
            let fast = format.parse_line_fast(line).expect(line);
            assert_eq!(Ok(fast), format.parse_line_fallback(line), "{}", line);
        }
    }

    proptest! {
        #[test]
        fn prop_fast_path_matches_fallback(
            level in "[A-Z]{1,6}",
            area in "[A-Za-z ]{0,6}",
            device in "[A-Za-z_]{1,8}-[0-9]{1,3}",
            unit in proptest::option::of("[A-Za-z0-9]{1,4}"),
            signal in "[A-Za-z0-9 _.\\[]{1,12}",
            dtype in prop::sample::select(vec!["INT", "BOOL", "DINT", "STRING", "REAL", " "]),
            value in "[A-Za-z0-9 ,_-]{1,10}",
            gap in "[ \t]{1,3}",
        ) {
            let unit = unit.map(|u| format!("@{}", u)).unwrap_or_default();
            let line = format!(
                "2024-06-30 23:59:59.999{gap}[{level}]{gap}[/{area}/{device}{unit}]{gap}[{signal}]{gap}({dtype}):{gap}{value}"
            );
            let format = PlcDebug::new();
            if let Some(fast) = format.parse_line_fast(&line) {
                prop_assert_eq!(Ok(fast), format.parse_line_fallback(&line));
            }
        }
    }
}
