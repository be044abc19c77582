//! Token-level helpers shared by every log format: value parsing, type
//! inference, device path splitting and signal key composition.

use regex::Regex;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;
use strum::EnumString;

use super::types::{LineError, SignalType, Value, SIGNAL_KEY_SEPARATOR};

/// Default device-id pattern: a token immediately followed by `-<digits>`
pub static DEFAULT_DEVICE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_-]+-\d+").expect("Failed to compile regex"));

/// Set of strings that are distinct ignoring case. The first spelling seen
/// wins.
#[derive(Clone, Debug, Default)]
pub struct CaseInsensitiveSet {
    items: BTreeMap<String, String>,
}

impl CaseInsensitiveSet {
    pub fn insert(&mut self, value: &str) {
        self.items
            .entry(value.to_lowercase())
            .or_insert_with(|| value.to_string());
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Values ordered case-insensitively
    pub fn into_sorted_vec(self) -> Vec<String> {
        self.items.into_values().collect()
    }
}

/// Parse a PLC-style boolean token, case-insensitively
pub fn parse_bool(input: &str) -> Option<bool> {
    let token = input.trim();
    if token.is_empty() {
        return None;
    }
    match token.to_ascii_uppercase().as_str() {
        "1" | "TRUE" | "ON" | "HIGH" | "SET" => Some(true),
        "0" | "FALSE" | "OFF" | "LOW" | "RESET" => Some(false),
        _ => None,
    }
}

/// Parse a 32-bit signed integer token.
///
/// Accepts an optional sign, `,`/`_` digit separators and `0x`/`0b`/`0o`
/// radix prefixes. Values outside the `i32` range are rejected.
pub fn parse_int(input: &str) -> Option<i32> {
    let token = input.trim();
    let (negative, unsigned) = match token.as_bytes().first()? {
        b'-' => (true, &token[1..]),
        b'+' => (false, &token[1..]),
        _ => (false, token),
    };

    let digits: String = unsigned.chars().filter(|c| *c != ',' && *c != '_').collect();
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest)
    } else {
        (10, lower.as_str())
    };

    // from_str_radix would otherwise accept a second sign after the prefix
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }

    let magnitude = i64::from_str_radix(body, radix).ok()?;
    let value = if negative { -magnitude } else { magnitude };
    i32::try_from(value).ok()
}

/// Infer a type from a bare value token: boolean, then integer, then text
pub fn infer_signal_type(value: &str) -> SignalType {
    if parse_bool(value).is_some() {
        SignalType::Boolean
    } else if parse_int(value).is_some() {
        SignalType::Integer
    } else {
        SignalType::Text
    }
}

/// Explicit PLC data type tokens
#[derive(Clone, Copy, Debug, EnumString, PartialEq)]
#[strum(ascii_case_insensitive)]
enum DeclaredType {
    #[strum(serialize = "BOOL", serialize = "BOOLEAN")]
    Boolean,
    #[strum(
        serialize = "INT",
        serialize = "INTEGER",
        serialize = "DINT",
        serialize = "UINT16",
        serialize = "UINT32"
    )]
    Integer,
}

/// Resolve a signal type from an explicit type token, inferring from the
/// value when the token is blank. Unrecognized tokens mean text.
pub fn resolve_declared_type(type_token: &str, value: &str) -> SignalType {
    let token = type_token.trim();
    if token.is_empty() {
        return infer_signal_type(value);
    }
    match DeclaredType::from_str(token) {
        Ok(DeclaredType::Boolean) => SignalType::Boolean,
        Ok(DeclaredType::Integer) => SignalType::Integer,
        Err(_) => SignalType::Text,
    }
}

/// Convert a value token into the requested type
pub fn convert_value(token: &str, signal_type: SignalType) -> Result<Value, LineError> {
    match signal_type {
        SignalType::Boolean => parse_bool(token)
            .map(Value::Bool)
            .ok_or_else(|| LineError::InvalidBoolean(token.to_string())),
        SignalType::Integer => parse_int(token)
            .map(Value::Integer)
            .ok_or_else(|| LineError::InvalidInteger(token.to_string())),
        SignalType::Text => Ok(Value::Text(token.trim().to_string())),
    }
}

/// Split a path-like token (`/Area-3/Line-2@Unit1`) into its device
/// segment and optional unit.
pub fn split_device_path(raw_path: &str) -> Result<(&str, Option<&str>), LineError> {
    let path = raw_path.trim().trim_matches('/').trim();
    if path.is_empty() {
        return Err(LineError::MissingPath);
    }

    let segment = path.rsplit('/').next().unwrap_or(path).trim();
    let (device, unit) = match segment.split_once('@') {
        Some((device, unit)) => {
            let unit = unit.trim();
            (device.trim(), (!unit.is_empty()).then_some(unit))
        }
        None => (segment, None),
    };

    if device.is_empty() {
        return Err(LineError::MissingDevice);
    }
    Ok((device, unit))
}

/// Extract the device id from a device segment.
///
/// A segment that already ends in `-<digits>` is taken verbatim. Otherwise
/// `pattern` is applied; its first capture group is used when present,
/// the whole match otherwise.
pub fn extract_device_id(segment: &str, pattern: &Regex) -> Result<String, LineError> {
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return Err(LineError::MissingDevice);
    }

    if let Some(dash) = trimmed.rfind('-') {
        let suffix = &trimmed[dash + 1..];
        if dash > 0 && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(trimmed.to_string());
        }
    }

    let captures = pattern
        .captures(trimmed)
        .ok_or_else(|| LineError::DeviceId(trimmed.to_string()))?;
    let found = captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|m| m.as_str())
        .unwrap_or_default();
    if found.is_empty() {
        return Err(LineError::DeviceId(trimmed.to_string()));
    }
    Ok(found.to_string())
}

/// Compose `device[@unit]::signal`, rejecting tokens that contain `::`
pub fn compose_signal_key(
    device_id: &str,
    unit: Option<&str>,
    signal: &str,
) -> Result<String, LineError> {
    if device_id.trim().is_empty() {
        return Err(LineError::MissingDevice);
    }
    if signal.trim().is_empty() {
        return Err(LineError::MissingSignal);
    }
    for token in [Some(device_id), unit, Some(signal)].into_iter().flatten() {
        if token.contains(SIGNAL_KEY_SEPARATOR) {
            return Err(LineError::ReservedSeparator(token.to_string()));
        }
    }

    Ok(match unit {
        Some(unit) => format!("{}@{}{}{}", device_id, unit, SIGNAL_KEY_SEPARATOR, signal),
        None => format!("{}{}{}", device_id, SIGNAL_KEY_SEPARATOR, signal),
    })
}

/// Recover the display name from a signal key (text after the last `::`,
/// falling back to the last `/` segment)
pub fn display_name_from_key(key: &str) -> &str {
    if let Some(idx) = key.rfind(SIGNAL_KEY_SEPARATOR) {
        let name = &key[idx + SIGNAL_KEY_SEPARATOR.len()..];
        if !name.is_empty() {
            return name;
        }
    }
    match key.rfind('/') {
        Some(idx) if idx + 1 < key.len() => &key[idx + 1..],
        _ => key,
    }
}

/// Shorten a line for log output without touching the stored text
pub fn preview(line: &str, max_chars: usize) -> String {
    match line.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        for token in ["1", "true", "ON", "High", "set", " TRUE "] {
            assert_eq!(parse_bool(token), Some(true), "{}", token);
        }
        for token in ["0", "False", "off", "LOW", "Reset"] {
            assert_eq!(parse_bool(token), Some(false), "{}", token);
        }
        assert_eq!(parse_bool(""), None);
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("-17"), Some(-17));
        assert_eq!(parse_int("+8"), Some(8));
        assert_eq!(parse_int("1,234"), Some(1234));
        assert_eq!(parse_int("1_000_000"), Some(1_000_000));
        assert_eq!(parse_int("0xFF"), Some(255));
        assert_eq!(parse_int("-0x10"), Some(-16));
        assert_eq!(parse_int("0b1010"), Some(10));
        assert_eq!(parse_int("0o17"), Some(15));
        assert_eq!(parse_int("2147483647"), Some(i32::MAX));
        assert_eq!(parse_int("-2147483648"), Some(i32::MIN));
    }

    #[test]
    fn test_parse_int_rejects() {
        assert_eq!(parse_int("2147483648"), None);
        assert_eq!(parse_int("0x"), None);
        assert_eq!(parse_int("0x+5"), None);
        assert_eq!(parse_int("12.5"), None);
        assert_eq!(parse_int("abc"), None);
        assert_eq!(parse_int("-"), None);
        assert_eq!(parse_int(""), None);
    }

    #[test]
    fn test_infer_signal_type() {
        assert_eq!(infer_signal_type("ON"), SignalType::Boolean);
        assert_eq!(infer_signal_type("1"), SignalType::Boolean);
        assert_eq!(infer_signal_type("12"), SignalType::Integer);
        assert_eq!(infer_signal_type("0x1F"), SignalType::Integer);
        assert_eq!(infer_signal_type("RUNNING"), SignalType::Text);
    }

    #[test]
    fn test_resolve_declared_type() {
        assert_eq!(resolve_declared_type("BOOL", "1"), SignalType::Boolean);
        assert_eq!(resolve_declared_type("dint", "5"), SignalType::Integer);
        assert_eq!(resolve_declared_type("UINT32", "5"), SignalType::Integer);
        assert_eq!(resolve_declared_type("REAL", "1.5"), SignalType::Text);
        assert_eq!(resolve_declared_type("STRING", "1"), SignalType::Text);
        assert_eq!(resolve_declared_type("  ", "off"), SignalType::Boolean);
    }

    #[test]
    fn test_convert_value() {
        assert_eq!(convert_value("on", SignalType::Boolean), Ok(Value::Bool(true)));
        assert_eq!(convert_value("7", SignalType::Integer), Ok(Value::Integer(7)));
        assert_eq!(
            convert_value("  idle ", SignalType::Text),
            Ok(Value::Text("idle".to_string()))
        );
        assert_eq!(
            convert_value("maybe", SignalType::Boolean),
            Err(LineError::InvalidBoolean("maybe".to_string()))
        );
    }

    #[test]
    fn test_split_device_path() {
        assert_eq!(split_device_path("/Area-1/Line-2"), Ok(("Line-2", None)));
        assert_eq!(
            split_device_path(" /Area-3/Conveyor-7@Unit1/ "),
            Ok(("Conveyor-7", Some("Unit1")))
        );
        assert_eq!(split_device_path("Press-4@"), Ok(("Press-4", None)));
        assert_eq!(split_device_path("//"), Err(LineError::MissingPath));
        assert_eq!(split_device_path("/a/@U1"), Err(LineError::MissingDevice));
    }

    #[test]
    fn test_extract_device_id() {
        let re = &*DEFAULT_DEVICE_REGEX;
        assert_eq!(extract_device_id("Line-2", re), Ok("Line-2".to_string()));
        assert_eq!(
            extract_device_id("Robot_Arm-12x", re),
            Ok("Robot_Arm-12".to_string())
        );
        assert!(matches!(
            extract_device_id("Conveyor", re),
            Err(LineError::DeviceId(_))
        ));

        let tab = Regex::new(r"([A-Za-z0-9_-]+)(?:@[^\]]+)?$").unwrap();
        assert_eq!(extract_device_id("Mixer", &tab), Ok("Mixer".to_string()));
    }

    #[test]
    fn test_compose_signal_key() {
        assert_eq!(
            compose_signal_key("Line-2", None, "Speed"),
            Ok("Line-2::Speed".to_string())
        );
        assert_eq!(
            compose_signal_key("Line-2", Some("U1"), "Speed"),
            Ok("Line-2@U1::Speed".to_string())
        );
        assert_eq!(
            compose_signal_key("Line-2", None, "A::B"),
            Err(LineError::ReservedSeparator("A::B".to_string()))
        );
        assert_eq!(compose_signal_key("Line-2", None, " "), Err(LineError::MissingSignal));
    }

    #[test]
    fn test_display_name_from_key() {
        assert_eq!(display_name_from_key("Line-2@U1::Speed"), "Speed");
        assert_eq!(display_name_from_key("plant/line/Motor"), "Motor");
        assert_eq!(display_name_from_key("Motor"), "Motor");
    }

    #[test]
    fn test_preview_caps_length() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("abc", 3), "abc");
    }

    #[test]
    fn test_case_insensitive_set() {
        let mut set = CaseInsensitiveSet::default();
        set.insert("Line-2");
        set.insert("LINE-2");
        set.insert("area-1");
        assert_eq!(set.len(), 2);
        assert_eq!(set.into_sorted_vec(), vec!["area-1", "Line-2"]);
    }
}
