//! TOML settings.
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```toml
//! [parsing]
//! progress_interval = 1000
//! sample_lines = 10
//! format = ""            # empty: auto-detect per file
//!
//! [viewport]
//! zoom_step = 1.25
//! pan_fraction = 0.25
//! default_window_secs = 10.0
//!
//! [[formats]]
//! name = "line_csv"
//! line_regex = '^(?<ts>[^,]+),(?<path>[^,]+),(?<signal>[^,]+),(?<value>.*)$'
//! timestamp_format = "%Y-%m-%dT%H:%M:%S%.f"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::parsers::stream::DEFAULT_PROGRESS_INTERVAL;

pub const DEFAULT_SAMPLE_LINES: usize = 10;
pub const DEFAULT_ZOOM_STEP: f64 = 1.25;
pub const DEFAULT_PAN_FRACTION: f64 = 0.25;
pub const DEFAULT_WINDOW_SECS: f64 = 10.0;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Settings {
    pub parsing: ParsingSettings,
    pub viewport: ViewportSettings,
    pub formats: Vec<TemplateSettings>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ParsingSettings {
    /// Lines between progress reports
    pub progress_interval: u64,
    /// Non-blank lines read for format detection
    pub sample_lines: usize,
    /// Format used for every file; empty means detect per file
    pub format: String,
}

impl Default for ParsingSettings {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            sample_lines: DEFAULT_SAMPLE_LINES,
            format: String::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ViewportSettings {
    pub zoom_step: f64,
    /// Fraction of the visible width moved by one pan step
    pub pan_fraction: f64,
    /// Window applied after every successful load
    pub default_window_secs: f64,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            zoom_step: DEFAULT_ZOOM_STEP,
            pan_fraction: DEFAULT_PAN_FRACTION,
            default_window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

/// A user-declared line format.
///
/// `line_regex` must define the named groups `ts`, `path`, `signal` and
/// `value`; `dtype` is optional.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TemplateSettings {
    pub name: String,
    pub line_regex: String,
    /// `chrono` format string for the `ts` group
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    /// Device-id pattern; the built-in `<name>-<digits>` rule when absent
    #[serde(default)]
    pub device_regex: Option<String>,
}

fn default_timestamp_format() -> String {
    "%Y-%m-%d %H:%M:%S%.f".to_string()
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let settings = Self::from_toml_str(&text)?;
        tracing::debug!(
            path = %path.display(),
            formats = settings.formats.len(),
            "loaded settings"
        );
        Ok(settings)
    }
}
