use regex::Regex;
use std::path::Path;

use super::plc_debug::PlcDebug;
use super::plc_tab::PlcTab;
use super::stream::{self, CancellationToken, ParseOptions, ProgressSink};
use super::template::TemplateFormat;
use super::types::{LineError, ParseOutcome, Reading};
use crate::error::Result;

/// Number of non-blank sample lines a format inspects when detecting
pub const DETECTION_INSPECT_LINES: usize = 5;

/// Capability contract of one log line format.
///
/// A format may provide two extraction paths: a positional fast path for
/// the common case and a pattern-based fallback. For any line the fast path
/// accepts, the fallback must produce an identical reading.
pub trait LineFormat {
    fn name(&self) -> &str;

    /// Pattern that identifies lines of this format during detection
    fn line_pattern(&self) -> &Regex;

    /// Positional extraction. `None` means "not handled here", never a
    /// parse failure.
    fn parse_line_fast(&self, _line: &str) -> Option<Reading> {
        None
    }

    /// Pattern-based extraction, the authority on failure reasons
    fn parse_line_fallback(&self, line: &str) -> Result<Reading, LineError>;

    fn parse_line(&self, line: &str) -> Result<Reading, LineError> {
        match self.parse_line_fast(line) {
            Some(reading) => Ok(reading),
            None => self.parse_line_fallback(line),
        }
    }

    /// Claim the format when at least 60% (rounded up) of up to five
    /// non-blank sample lines match [`line_pattern`](Self::line_pattern)
    fn can_handle(&self, sample_lines: &[String]) -> bool {
        let mut inspected = 0usize;
        let mut matches = 0usize;
        for line in sample_lines.iter().filter(|l| !l.trim().is_empty()) {
            inspected += 1;
            if self.line_pattern().is_match(line) {
                matches += 1;
            }
            if inspected >= DETECTION_INSPECT_LINES {
                break;
            }
        }

        if inspected == 0 {
            return false;
        }
        // ceil(0.6 * inspected) in integer arithmetic
        let threshold = ((inspected * 3 + 4) / 5).max(1);
        matches >= threshold
    }
}

/// The closed set of supported log formats
#[derive(Debug)]
pub enum LogFormat {
    PlcDebug(PlcDebug),
    PlcTab(PlcTab),
    Template(TemplateFormat),
}

impl LogFormat {
    /// Stream `path` through this format
    pub fn parse_file<P: ProgressSink + ?Sized>(
        &self,
        path: &Path,
        options: &ParseOptions,
        cancel: &CancellationToken,
        progress: &P,
    ) -> Result<ParseOutcome> {
        stream::parse_file(self, path, options, cancel, progress)
    }
}

impl LineFormat for LogFormat {
    fn name(&self) -> &str {
        match self {
            LogFormat::PlcDebug(f) => f.name(),
            LogFormat::PlcTab(f) => f.name(),
            LogFormat::Template(f) => f.name(),
        }
    }

    fn line_pattern(&self) -> &Regex {
        match self {
            LogFormat::PlcDebug(f) => f.line_pattern(),
            LogFormat::PlcTab(f) => f.line_pattern(),
            LogFormat::Template(f) => f.line_pattern(),
        }
    }

    fn parse_line_fast(&self, line: &str) -> Option<Reading> {
        match self {
            LogFormat::PlcDebug(f) => f.parse_line_fast(line),
            LogFormat::PlcTab(f) => f.parse_line_fast(line),
            LogFormat::Template(f) => f.parse_line_fast(line),
        }
    }

    fn parse_line_fallback(&self, line: &str) -> Result<Reading, LineError> {
        match self {
            LogFormat::PlcDebug(f) => f.parse_line_fallback(line),
            LogFormat::PlcTab(f) => f.parse_line_fallback(line),
            LogFormat::Template(f) => f.parse_line_fallback(line),
        }
    }

    fn can_handle(&self, sample_lines: &[String]) -> bool {
        match self {
            LogFormat::PlcDebug(f) => f.can_handle(sample_lines),
            LogFormat::PlcTab(f) => f.can_handle(sample_lines),
            LogFormat::Template(f) => f.can_handle(sample_lines),
        }
    }
}

impl From<PlcDebug> for LogFormat {
    fn from(format: PlcDebug) -> Self {
        LogFormat::PlcDebug(format)
    }
}

impl From<PlcTab> for LogFormat {
    fn from(format: PlcTab) -> Self {
        LogFormat::PlcTab(format)
    }
}

impl From<TemplateFormat> for LogFormat {
    fn from(format: TemplateFormat) -> Self {
        LogFormat::Template(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBUG_LINE: &str = "2024-01-01 00:00:00.000 [INFO] [/Area-1/Line-2] [Speed] (INT): 10";

    fn sample(matching: usize, other: usize) -> Vec<String> {
        let mut lines = vec![DEBUG_LINE.to_string(); matching];
        lines.extend(std::iter::repeat("not a log line".to_string()).take(other));
        lines
    }

    #[test]
    fn test_can_handle_threshold() {
        let format = LogFormat::from(PlcDebug::new());
        assert!(format.can_handle(&sample(3, 2)));
        assert!(!format.can_handle(&sample(2, 3)));
        assert!(format.can_handle(&sample(1, 0)));
        assert!(!format.can_handle(&[]));
    }

    #[test]
    fn test_can_handle_ignores_blank_and_extra_lines() {
        let format = LogFormat::from(PlcDebug::new());
        let mut lines = vec!["   ".to_string(), String::new()];
        lines.extend(sample(3, 2));
        // Lines past the fifth non-blank one are never inspected
        lines.extend(std::iter::repeat("junk".to_string()).take(10));
        assert!(format.can_handle(&lines));
        assert!(!format.can_handle(&["  ".to_string(), "\t".to_string()]));
    }

    #[test]
    fn test_dispatch_names() {
        assert_eq!(LogFormat::from(PlcDebug::new()).name(), "plc_debug");
        assert_eq!(LogFormat::from(PlcTab::new()).name(), "plc_tab");
    }
}
