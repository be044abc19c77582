//! Caller-owned collection of log formats with one designated default.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::format::{LineFormat, LogFormat};
use super::plc_debug::PlcDebug;
use super::plc_tab::PlcTab;
use super::stream::{CancellationToken, ParseOptions, ProgressSink};
use super::template::TemplateFormat;
use super::types::ParseOutcome;
use crate::config::{Settings, DEFAULT_SAMPLE_LINES};
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct ParserRegistry {
    formats: Vec<LogFormat>,
    default: usize,
    options: ParseOptions,
    sample_lines: usize,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserRegistry {
    /// An empty registry. At least one format must be registered before
    /// anything can be parsed.
    pub fn new() -> Self {
        Self {
            formats: Vec::new(),
            default: 0,
            options: ParseOptions::default(),
            sample_lines: DEFAULT_SAMPLE_LINES,
        }
    }

    /// `plc_debug` (default) and `plc_tab`
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.formats.push(PlcDebug::new().into());
        registry.formats.push(PlcTab::new().into());
        registry
    }

    /// Built-in formats plus every `[[formats]]` template in `settings`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut registry = Self::builtin();
        registry.options.progress_interval = settings.parsing.progress_interval;
        registry.sample_lines = settings.parsing.sample_lines.max(1);
        for template in &settings.formats {
            registry.register(TemplateFormat::from_settings(template)?, false)?;
        }
        Ok(registry)
    }

    /// Add a format. The first registered format is the default until
    /// another is registered with `is_default`.
    pub fn register(&mut self, format: impl Into<LogFormat>, is_default: bool) -> Result<()> {
        let format = format.into();
        if self.lookup(format.name()).is_some() {
            return Err(Error::DuplicateFormat(format.name().to_string()));
        }
        tracing::debug!(format = format.name(), is_default, "registering format");
        self.formats.push(format);
        if is_default {
            self.default = self.formats.len() - 1;
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.formats.iter().map(|f| f.name()).collect()
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn default_format(&self) -> Result<&LogFormat> {
        self.formats.get(self.default).ok_or(Error::EmptyRegistry)
    }

    /// Case-insensitive lookup by name
    pub fn lookup(&self, name: &str) -> Option<&LogFormat> {
        self.formats
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name.trim()))
    }

    /// The named format, or the default when `name` is blank or unknown
    pub fn resolve(&self, name: &str) -> Result<&LogFormat> {
        if name.trim().is_empty() {
            return self.default_format();
        }
        match self.lookup(name) {
            Some(format) => Ok(format),
            None => self.default_format(),
        }
    }

    /// Pick a format from the first non-blank lines of `path`
    pub fn detect(&self, path: &Path) -> Result<&LogFormat> {
        let default = self.default_format()?;
        tracing::debug!(path = %path.display(), "detecting format");
        let sample = read_sample_lines(path, self.sample_lines)?;

        for format in &self.formats {
            tracing::debug!(format = format.name(), "testing format");
            if format.can_handle(&sample) {
                tracing::debug!(format = format.name(), "format can parse the file");
                return Ok(format);
            }
        }

        tracing::debug!(format = default.name(), "falling back to default format");
        Ok(default)
    }

    /// Parse `path` with the requested format.
    ///
    /// A blank name selects the default format. A name that matches no
    /// registered format triggers detection.
    pub fn parse<P: ProgressSink + ?Sized>(
        &self,
        path: &Path,
        requested: &str,
        cancel: &CancellationToken,
        progress: &P,
    ) -> Result<ParseOutcome> {
        tracing::debug!(
            path = %path.display(),
            requested = if requested.is_empty() { "(default)" } else { requested },
            "parse requested"
        );

        let format = if requested.trim().is_empty() {
            self.default_format()?
        } else {
            match self.lookup(requested) {
                Some(format) => format,
                None => {
                    tracing::debug!("requested format unavailable, detecting");
                    self.detect(path)?
                }
            }
        };
        tracing::debug!(format = format.name(), "resolved format");

        let outcome = format.parse_file(path, &self.options, cancel, progress)?;
        tracing::debug!(
            format = format.name(),
            success = outcome.success(),
            entries = outcome.log.as_ref().map_or(0, |l| l.entry_count()),
            errors = outcome.errors.len(),
            "parse completed"
        );
        Ok(outcome)
    }

    /// Detect the format of `path`, then parse it
    pub fn parse_detected<P: ProgressSink + ?Sized>(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        progress: &P,
    ) -> Result<ParseOutcome> {
        let format = self.detect(path)?;
        format.parse_file(path, &self.options, cancel, progress)
    }
}

/// Read up to `max_lines` non-blank lines
fn read_sample_lines(path: &Path, max_lines: usize) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut lines = Vec::with_capacity(max_lines);
    let mut buf = Vec::new();

    while lines.len() < max_lines {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| Error::io(path, e))?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_start_matches('\u{feff}').trim_end_matches(['\r', '\n']);
        if !line.trim().is_empty() {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateSettings;
    use crate::parsers::stream::NoProgress;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DEBUG_LINE: &str = "2024-01-01 00:00:00.000 [INFO] [/Area-1/Line-2] [Speed] (INT): 10";
    const TAB_LINE: &str = "2024-01-01 00:00:00.000000 [INFO] /Area-1/Line-2\tSpeed\tINT\t10";

    fn write_log(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    fn csv_template(name: &str) -> TemplateSettings {
        TemplateSettings {
            name: name.to_string(),
            line_regex: r"^(?<ts>[^,]+),(?<path>[^,]+),(?<signal>[^,]+),(?<value>.*)$".to_string(),
            timestamp_format: "%Y-%m-%d %H:%M:%S%.f".to_string(),
            device_regex: None,
        }
    }

    #[test]
    fn test_builtin_registry() {
        let registry = ParserRegistry::builtin();
        assert_eq!(registry.names(), vec!["plc_debug", "plc_tab"]);
        assert_eq!(registry.resolve("").unwrap().name(), "plc_debug");
        assert_eq!(registry.resolve("PLC_TAB").unwrap().name(), "plc_tab");
        assert_eq!(registry.resolve("nope").unwrap().name(), "plc_debug");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ParserRegistry::builtin();
        let result = registry.register(PlcTab::new(), false);
        assert!(matches!(result, Err(Error::DuplicateFormat(name)) if name == "plc_tab"));

        let mut settings = Settings::default();
        settings.formats.push(csv_template("csv"));
        settings.formats.push(csv_template("CSV"));
        let result = ParserRegistry::from_settings(&settings);
        assert!(matches!(result, Err(Error::DuplicateFormat(_))));
    }

    #[test]
    fn test_register_default() {
        let mut registry = ParserRegistry::new();
        assert!(matches!(registry.resolve(""), Err(Error::EmptyRegistry)));
        registry.register(PlcDebug::new(), false).unwrap();
        registry.register(PlcTab::new(), true).unwrap();
        assert_eq!(registry.default_format().unwrap().name(), "plc_tab");
    }

    #[test]
    fn test_from_settings_adds_templates() {
        let mut settings = Settings::default();
        settings.formats.push(csv_template("csv"));
        settings.parsing.progress_interval = 50;
        let registry = ParserRegistry::from_settings(&settings).unwrap();
        assert_eq!(registry.names(), vec!["plc_debug", "plc_tab", "csv"]);
        assert_eq!(registry.options().progress_interval, 50);
    }

    #[test]
    fn test_detect_picks_matching_format() {
        let registry = ParserRegistry::builtin();
        let tab = write_log(&["", TAB_LINE, TAB_LINE, "trailer"]);
        assert_eq!(registry.detect(tab.path()).unwrap().name(), "plc_tab");

        let debug = write_log(&[DEBUG_LINE, DEBUG_LINE]);
        assert_eq!(registry.detect(debug.path()).unwrap().name(), "plc_debug");

        let unknown = write_log(&["hello", "world"]);
        assert_eq!(registry.detect(unknown.path()).unwrap().name(), "plc_debug");
    }

    #[test]
    fn test_parse_unknown_name_detects() {
        let registry = ParserRegistry::builtin();
        let tab = write_log(&[TAB_LINE, TAB_LINE]);
        let outcome = registry
            .parse(tab.path(), "mystery", &CancellationToken::new(), &NoProgress)
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.log.unwrap().entry_count(), 2);
        assert!(outcome.errors.is_empty());

        // A blank name goes straight to the default format
        let outcome = registry
            .parse(tab.path(), "", &CancellationToken::new(), &NoProgress)
            .unwrap();
        assert!(!outcome.success());
        assert_eq!(outcome.errors.len(), 2);
    }

    #[test]
    fn test_parse_named_template() {
        let mut settings = Settings::default();
        settings.formats.push(csv_template("csv"));
        let registry = ParserRegistry::from_settings(&settings).unwrap();
        let file = write_log(&["2024-01-01 00:00:00.000,/Line-2,Speed,5"]);
        let outcome = registry
            .parse(file.path(), "csv", &CancellationToken::new(), &NoProgress)
            .unwrap();
        assert_eq!(outcome.log.unwrap().signals(), &["Line-2::Speed".to_string()]);
    }
}
