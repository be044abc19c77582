//! User-declared line formats.
//!
//! A template is a single regex with named groups plus a `chrono`
//! timestamp format. There is no positional fast path: the regex is the
//! only extraction path.

use chrono::NaiveDateTime;
use regex::Regex;

use super::format::LineFormat;
use super::helpers::{
    compose_signal_key, convert_value, extract_device_id, resolve_declared_type,
    split_device_path, DEFAULT_DEVICE_REGEX,
};
use super::types::{LineError, Reading};
use crate::config::TemplateSettings;
use crate::error::{Error, Result};

const REQUIRED_GROUPS: [&str; 4] = ["ts", "path", "signal", "value"];

#[derive(Debug)]
pub struct TemplateFormat {
    name: String,
    line_regex: Regex,
    timestamp_format: String,
    device_regex: Option<Regex>,
}

impl TemplateFormat {
    pub fn new(
        name: &str,
        line_regex: &str,
        timestamp_format: &str,
        device_regex: Option<&str>,
    ) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|source| Error::Pattern {
                name: name.to_string(),
                source,
            })
        };

        let line_regex = compile(line_regex)?;
        let groups: Vec<&str> = line_regex.capture_names().flatten().collect();
        for group in REQUIRED_GROUPS {
            if !groups.contains(&group) {
                return Err(Error::MissingCaptureGroup {
                    name: name.to_string(),
                    group,
                });
            }
        }
        let device_regex = device_regex.map(compile).transpose()?;

        Ok(Self {
            name: name.to_string(),
            line_regex,
            timestamp_format: timestamp_format.to_string(),
            device_regex,
        })
    }

    pub fn from_settings(settings: &TemplateSettings) -> Result<Self> {
        Self::new(
            &settings.name,
            &settings.line_regex,
            &settings.timestamp_format,
            settings.device_regex.as_deref(),
        )
    }

    pub fn timestamp_format(&self) -> &str {
        &self.timestamp_format
    }
}

impl LineFormat for TemplateFormat {
    fn name(&self) -> &str {
        &self.name
    }

    fn line_pattern(&self) -> &Regex {
        &self.line_regex
    }

    fn parse_line_fallback(&self, line: &str) -> Result<Reading, LineError> {
        let caps = self.line_regex.captures(line).ok_or(LineError::NoMatch)?;
        let group = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or_default();

        let ts = group("ts").trim();
        let timestamp = NaiveDateTime::parse_from_str(ts, &self.timestamp_format)
            .map_err(|_| LineError::Timestamp(ts.to_string()))?;

        let (segment, unit) = split_device_path(group("path"))?;
        let pattern = self.device_regex.as_ref().unwrap_or(&*DEFAULT_DEVICE_REGEX);
        let device_id = extract_device_id(segment, pattern)?;

        let signal = group("signal").trim();
        let signal_key = compose_signal_key(&device_id, unit, signal)?;

        let value = group("value");
        let signal_type = resolve_declared_type(group("dtype"), value);
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
