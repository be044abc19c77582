//! Streaming line loop shared by every format.
//!
//! Files are read forward-only through a buffered reader, one line at a
//! time. Cancellation is checked once per line and progress is throttled to
//! a fixed line interval plus one final report.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, SyncSender};
use std::sync::Arc;
use std::time::Instant;

use super::format::LineFormat;
use super::helpers::{preview, CaseInsensitiveSet};
use super::types::{ParseError, ParseOutcome, ParseProgress, ParsedLog, TimeSpan};
use crate::error::{Error, Result};

/// Default number of lines between progress reports
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1000;

/// Read buffer size for log files
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Rough bytes per reading, used only to pre-size the reading buffer
const BYTES_PER_READING_ESTIMATE: u64 = 48;
const MIN_READING_CAPACITY: usize = 1024;

/// Longest line snippet written to the debug log
const PREVIEW_CHARS: usize = 200;

/// Cooperative cancellation flag shared between a parse and its owner
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Returns [`Error::Cancelled`] once cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Fire-and-forget receiver of progress notifications. Implementations
/// must not block the parse loop.
pub trait ProgressSink {
    fn report(&self, progress: ParseProgress);
}

/// Sink that discards every report
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: ParseProgress) {}
}

impl ProgressSink for Sender<ParseProgress> {
    fn report(&self, progress: ParseProgress) {
        // A dropped receiver just means nobody is listening anymore
        let _ = self.send(progress);
    }
}

impl ProgressSink for SyncSender<ParseProgress> {
    fn report(&self, progress: ParseProgress) {
        // Drop the report rather than wait on a slow consumer
        let _ = self.try_send(progress);
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &S {
    fn report(&self, progress: ParseProgress) {
        (**self).report(progress)
    }
}

/// Tunables for the streaming loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseOptions {
    /// Lines between progress reports; 0 disables intermediate reports
    pub progress_interval: u64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// Open `path` and stream it through `format`
pub fn parse_file<F, P>(
    format: &F,
    path: &Path,
    options: &ParseOptions,
    cancel: &CancellationToken,
    progress: &P,
) -> Result<ParseOutcome>
where
    F: LineFormat + ?Sized,
    P: ProgressSink + ?Sized,
{
    tracing::debug!(format = format.name(), path = %path.display(), "starting parse");
    let file = File::open(path).map_err(|e| Error::io(path, e))?;

    let capacity = match file.metadata() {
        Ok(meta) => {
            tracing::debug!(bytes = meta.len(), "file size");
            let approx = (meta.len() / BYTES_PER_READING_ESTIMATE).max(1);
            usize::try_from(approx)
                .unwrap_or(usize::MAX)
                .max(MIN_READING_CAPACITY)
        }
        Err(e) => {
            tracing::debug!("unable to determine file size: {}", e);
            MIN_READING_CAPACITY
        }
    };

    let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
    parse_reader(format, reader, path, capacity, options, cancel, progress)
}

/// Stream any buffered reader through `format`, attributing readings,
/// errors and progress to `path`.
///
/// Blank lines are skipped without being counted as errors. Every other
/// line yields exactly one reading or exactly one [`ParseError`].
pub fn parse_reader<F, R, P>(
    format: &F,
    mut reader: R,
    path: &Path,
    capacity_hint: usize,
    options: &ParseOptions,
    cancel: &CancellationToken,
    progress: &P,
) -> Result<ParseOutcome>
where
    F: LineFormat + ?Sized,
    R: BufRead,
    P: ProgressSink + ?Sized,
{
    let started = Instant::now();
    // Cap the up-front allocation; the vector still grows as needed
    let mut readings = Vec::with_capacity(capacity_hint.min(1 << 20));
    let mut errors = Vec::new();
    let mut devices = CaseInsensitiveSet::default();
    let mut signals = CaseInsensitiveSet::default();
    let mut span: Option<TimeSpan> = None;

    let mut buf = Vec::with_capacity(256);
    let mut line_number: u64 = 0;

    loop {
        cancel.check()?;

        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| Error::io(path, e))?;
        if read == 0 {
            break;
        }
        line_number += 1;

        let mut bytes = buf.as_slice();
        if line_number == 1 {
            bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        }
        bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
        bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        let line = String::from_utf8_lossy(bytes);

        if !line.trim().is_empty() {
            match format.parse_line(&line) {
                Ok(reading) => {
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
                Err(reason) => {
                    tracing::debug!(
                        line = line_number,
                        snippet = %preview(&line, PREVIEW_CHARS),
                        "error parsing line: {}",
                        reason
                    );
                    errors.push(ParseError::new(
                        Some(path),
                        line_number,
                        line.into_owned(),
                        &reason,
                    ));
                }
            }
        }

        if options.progress_interval > 0 && line_number % options.progress_interval == 0 {
            progress.report(ParseProgress::new(path, line_number, None));
        }
    }

    progress.report(ParseProgress::new(path, line_number, Some(line_number)));

    tracing::info!(
        format = format.name(),
        path = %path.display(),
        lines = line_number,
        entries = readings.len(),
        errors = errors.len(),
        elapsed = ?started.elapsed(),
        "parse finished"
    );

    Ok(match span {
        Some(span) => ParseOutcome::new(
            ParsedLog::from_parts(readings, devices, signals, span),
            errors,
        ),
        None => ParseOutcome::failed(errors),
    })
}
