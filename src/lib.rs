//! plcwave - A fast PLC log parser and signal timeline engine written in Rust
//!
//! This library streams PLC text logs into timestamped readings, merges
//! several files into one dataset and derives per-signal value intervals
//! for timeline views.
//!
//! ## Module Structure
//!
//! - [`parsers`] - Log line formats, format detection and the streaming reader
//! - [`merge`] - Merging per-file results into one dataset
//! - [`signals`] - Signal grouping, state intervals and the lazy signal catalog
//! - [`viewport`] - Visible time range and zoom state with change events
//! - [`filter`] - Signal list search and type toggles
//! - [`session`] - Load pipeline and the owning session
//! - [`state`] - Session data types and summary statistics
//! - [`config`] - TOML settings
//! - [`error`] - Crate error type

pub mod config;
pub mod error;
pub mod filter;
pub mod merge;
pub mod parsers;
pub mod session;
pub mod signals;
pub mod state;
pub mod viewport;

pub use config::Settings;
pub use error::{Error, Result};
pub use parsers::{CancellationToken, ParserRegistry};
pub use session::LogSession;
