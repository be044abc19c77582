//! Error types shared across the crate.
//!
//! Per-line failures never surface here: they are recorded as
//! [`ParseError`](crate::parsers::ParseError) diagnostics and parsing
//! continues. [`Error`] covers whole-operation failures, configuration
//! defects and cancellation.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The caller cancelled the operation. No outcome was produced.
    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("format `{0}` is already registered")]
    DuplicateFormat(String),

    #[error("no log formats are registered")]
    EmptyRegistry,

    #[error("invalid pattern for format `{name}`: {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("template format `{name}` is missing the `{group}` capture group")]
    MissingCaptureGroup { name: String, group: &'static str },

    #[error("invalid range: end {end} precedes start {start}")]
    InvalidRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("failed to parse settings: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("a load is already in progress")]
    LoadInProgress,

    #[error("background load ended without a result")]
    LoadAborted,

    #[error("none of the given paths is a readable file")]
    NoUsablePaths,
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the operation stopped because of a cancellation request
    /// rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
