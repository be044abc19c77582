use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use tracing_subscriber::EnvFilter;

// Import from the library
use plcwave::parsers::{ParseError, ParseProgress, ProgressSink};
use plcwave::session::LogSession;
use plcwave::state::LoadSummary;
use plcwave::{CancellationToken, ParserRegistry, Settings};

/// Load PLC log files and print a summary of what was parsed
#[derive(Parser, Debug)]
#[command(name = "inspect_log")]
struct Args {
    /// Log files to load, merged in the order given
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Format name to parse with; detected per file when omitted
    #[arg(long)]
    format: Option<String>,

    /// TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the load statistics as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(format) = args.format {
        settings.parsing.format = format;
    }

    let registry = Arc::new(ParserRegistry::from_settings(&settings)?);
    let mut session = LogSession::new(registry, settings);

    let sink = ClosureSink(|p: ParseProgress| {
        if p.is_final() {
            tracing::info!(path = %p.file_path.display(), lines = p.lines_read, "file read");
        }
    });
    let summary = session.load_files(&args.paths, &CancellationToken::new(), &sink)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&session.stats())?);
        if let LoadSummary::Failed(errors) = &summary {
            bail!(
                "no readings in {} file(s), {} error(s)",
                args.paths.len(),
                errors.len()
            );
        }
        return Ok(());
    }

    match summary {
        LoadSummary::Loaded(stats) => {
            println!("=== Load Results ===");
            println!("Files: {}", stats.files);
            println!("Entries: {}", stats.entries);
            println!("Devices: {}", stats.devices);
            println!("Signals: {}", stats.signals);
            println!("Errors: {}", stats.errors);
            if let Some(range) = &stats.time_range {
                println!("Time range: {} ({:.3}s)", range, stats.duration_secs);
            }
        }
        LoadSummary::Failed(errors) => {
            println!("=== No data loaded ===");
            print_errors(&errors);
            bail!("no readings in {} file(s)", args.paths.len());
        }
    }

    if let Some(catalog) = session.catalog() {
        println!("\n=== First 15 Signals ===");
        for (i, entry) in catalog.entries().iter().take(15).enumerate() {
            let changes = if entry.has_changes() { "" } else { " (constant)" };
            println!(
                "  {:2}. {} [{}] {} readings{}",
                i + 1,
                entry.display_name(),
                entry.signal_type(),
                entry.readings().len(),
                changes
            );
        }
        if catalog.len() > 15 {
            println!("  ... and {} more signals", catalog.len() - 15);
        }
    }

    if let Some(dataset) = session.dataset() {
        println!("\n=== Sample Readings (first 5) ===");
        for reading in dataset.log.readings().iter().take(5) {
            println!("  {}", reading);
        }
        if !dataset.errors.is_empty() {
            print_errors(&dataset.errors);
        }
    }

    if let Some(range) = session.visible_range_text() {
        println!("\nDefault view: {}", range);
    }
    Ok(())
}

fn print_errors(errors: &[ParseError]) {
    println!("\n=== First 10 Errors ===");
    for error in errors.iter().take(10) {
        println!("  {}", error);
    }
    if errors.len() > 10 {
        println!("  ... and {} more errors", errors.len() - 10);
    }
}

/// Adapts a closure to the library's progress sink
struct ClosureSink<F>(F);

impl<F: Fn(ParseProgress)> ProgressSink for ClosureSink<F> {
    fn report(&self, progress: ParseProgress) {
        (self.0)(progress)
    }
}
