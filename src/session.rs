//! The owning session: one loaded dataset at a time, its signal catalog,
//! viewport and filter, plus the load pipeline that feeds them.
//!
//! Files are parsed one after another in the order given, then merged.
//! A background load runs the same pipeline on a worker thread and reports
//! through channels; the session applies the result when polled.

use chrono::{NaiveDateTime, TimeDelta};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::filter::SignalFilter;
use crate::merge::merge;
use crate::parsers::{
    CancellationToken, NoProgress, ParseProgress, ParserRegistry, ProgressSink, TimeSpan,
};
use crate::signals::{CatalogEntry, SignalCatalog};
use crate::state::{
    format_range, normalize_window_secs, LoadMessage, LoadResult, LoadSummary, LoadedDataset,
    LoadingState, LogStats,
};
use crate::viewport::{scale, Viewport};

/// Drop blank and missing paths, make the rest absolute and remove
/// duplicates (the same file reached twice). Order is preserved.
pub fn normalize_paths<I, P>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.to_string_lossy().trim().is_empty() {
            continue;
        }
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "skipping missing file");
            continue;
        }
        let absolute = match std::path::absolute(path) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %path.display(), "skipping unresolvable path: {}", e);
                continue;
            }
        };
        if seen.insert(dedup_key(&absolute)) {
            result.push(absolute);
        }
    }
    result
}

/// Identity of a file for de-duplication: the canonical path, folded to
/// lowercase only where the filesystem ignores case
fn dedup_key(absolute: &Path) -> PathBuf {
    let canonical = std::fs::canonicalize(absolute).unwrap_or_else(|_| absolute.to_path_buf());
    if cfg!(windows) {
        PathBuf::from(canonical.to_string_lossy().to_lowercase())
    } else {
        canonical
    }
}

/// Parse `paths` sequentially and merge them.
///
/// A blank `format` detects the format of each file; otherwise the named
/// format is used (with detection when the name is unknown). `on_file` is
/// called before each file is opened.
pub fn load_dataset<P, F>(
    registry: &ParserRegistry,
    format: &str,
    paths: &[PathBuf],
    cancel: &CancellationToken,
    progress: &P,
    mut on_file: F,
) -> Result<LoadResult>
where
    P: ProgressSink + ?Sized,
    F: FnMut(&Path),
{
    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
        cancel.check()?;
        on_file(path);
        tracing::debug!(path = %path.display(), "parsing file");
        let outcome = if format.trim().is_empty() {
            registry.parse_detected(path, cancel, progress)?
        } else {
            registry.parse(path, format, cancel, progress)?
        };
        tracing::debug!(
            path = %path.display(),
            success = outcome.success(),
            errors = outcome.errors.len(),
            "finished parsing file"
        );
        results.push((path.clone(), outcome));
    }

    let merged = merge(results);
    Ok(match merged.log {
        Some(log) => LoadResult::Success(Box::new(LoadedDataset {
            files: paths.to_vec(),
            log,
            errors: merged.errors,
        })),
        None => {
            tracing::debug!("merge did not produce data");
            LoadResult::Failed(merged.errors)
        }
    })
}

/// Forwards parse progress from a worker thread
struct ChannelProgress(Sender<LoadMessage>);

impl ProgressSink for ChannelProgress {
    fn report(&self, progress: ParseProgress) {
        let _ = self.0.send(LoadMessage::Progress(progress));
    }
}

/// A load running on a worker thread
#[derive(Debug)]
pub struct LoadHandle {
    cancel: CancellationToken,
    messages: Receiver<LoadMessage>,
    result: Receiver<Result<LoadResult>>,
    thread: Option<JoinHandle<()>>,
}

impl LoadHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("load thread panicked");
            }
        }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[derive(Debug)]
pub struct LogSession {
    registry: Arc<ParserRegistry>,
    settings: Settings,
    dataset: Option<LoadedDataset>,
    catalog: Option<SignalCatalog>,
    viewport: Viewport,
    filter: SignalFilter,
    loading_state: LoadingState,
    pending: Option<LoadHandle>,
    last_progress: Option<ParseProgress>,
    window_secs: f64,
}

impl LogSession {
    pub fn new(registry: Arc<ParserRegistry>, settings: Settings) -> Self {
        let window_secs = normalize_window_secs(settings.viewport.default_window_secs);
        Self {
            registry,
            settings,
            dataset: None,
            catalog: None,
            viewport: Viewport::new(),
            filter: SignalFilter::default(),
            loading_state: LoadingState::Idle,
            pending: None,
            last_progress: None,
            window_secs,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn dataset(&self) -> Option<&LoadedDataset> {
        self.dataset.as_ref()
    }

    pub fn has_data(&self) -> bool {
        self.dataset.is_some()
    }

    pub fn catalog(&self) -> Option<&SignalCatalog> {
        self.catalog.as_ref()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Direct access, e.g. to subscribe to viewport changes
    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn filter(&self) -> &SignalFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: SignalFilter) {
        self.filter = filter;
    }

    /// Catalog entries that pass the current filter
    pub fn filtered_signals(&self) -> Vec<&CatalogEntry> {
        match &self.catalog {
            Some(catalog) => self.filter.apply(catalog),
            None => Vec::new(),
        }
    }

    pub fn loading_state(&self) -> &LoadingState {
        &self.loading_state
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Most recent progress report of the background load
    pub fn last_progress(&self) -> Option<&ParseProgress> {
        self.last_progress.as_ref()
    }

    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    pub fn stats(&self) -> LogStats {
        self.dataset
            .as_ref()
            .map(LogStats::from_dataset)
            .unwrap_or_default()
    }

    /// Visible range with its length, for status displays
    pub fn visible_range_text(&self) -> Option<String> {
        self.has_data()
            .then(|| format_range(self.viewport.visible_range()))
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Load `paths` on the calling thread, replacing the current dataset.
    ///
    /// On cancellation the session is left as it was and
    /// [`Error::Cancelled`] is returned.
    pub fn load_files<I, Q, P>(
        &mut self,
        paths: I,
        cancel: &CancellationToken,
        progress: &P,
    ) -> Result<LoadSummary>
    where
        I: IntoIterator<Item = Q>,
        Q: AsRef<Path>,
        P: ProgressSink + ?Sized,
    {
        if self.is_busy() {
            return Err(Error::LoadInProgress);
        }
        let paths = normalize_paths(paths);
        if paths.is_empty() {
            tracing::warn!("no usable paths to load");
            return Ok(LoadSummary::Failed(Vec::new()));
        }

        let result = load_dataset(
            &self.registry,
            &self.settings.parsing.format,
            &paths,
            cancel,
            progress,
            |path| tracing::debug!(path = %path.display(), "loading"),
        );
        match result {
            Ok(result) => self.apply_result(result),
            Err(e) => {
                if e.is_cancelled() {
                    tracing::info!("load cancelled");
                }
                Err(e)
            }
        }
    }

    /// Start loading `paths` on a worker thread. Call
    /// [`poll_load`](Self::poll_load) to pick up the result.
    ///
    /// Fails with [`Error::NoUsablePaths`] when no path names an existing
    /// file; no load is started and the session is unchanged.
    pub fn start_loading<I, Q>(&mut self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = Q>,
        Q: AsRef<Path>,
    {
        if self.is_busy() {
            tracing::debug!("load already in progress, ignoring request");
            return Err(Error::LoadInProgress);
        }
        let paths = normalize_paths(paths);
        let Some(first) = paths.first() else {
            tracing::warn!("no usable paths to load");
            return Err(Error::NoUsablePaths);
        };
        self.loading_state = LoadingState::Loading(file_label(first));
        self.last_progress = None;

        let cancel = CancellationToken::new();
        let (message_tx, message_rx) = channel();
        let (result_tx, result_rx) = channel();
        let registry = Arc::clone(&self.registry);
        let format = self.settings.parsing.format.clone();
        let token = cancel.clone();

        let thread = thread::spawn(move || {
            let progress = ChannelProgress(message_tx.clone());
            let result = load_dataset(&registry, &format, &paths, &token, &progress, |path| {
                let _ = message_tx.send(LoadMessage::FileStarted(path.to_path_buf()));
            });
            let _ = result_tx.send(result);
        });

        self.pending = Some(LoadHandle {
            cancel,
            messages: message_rx,
            result: result_rx,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Request cancellation of the background load, if any
    pub fn cancel_loading(&self) {
        if let Some(handle) = &self.pending {
            handle.cancel();
        }
    }

    fn drain_messages(&mut self) {
        let Some(handle) = &self.pending else {
            return;
        };
        for message in handle.messages.try_iter() {
            match message {
                LoadMessage::FileStarted(path) => {
                    self.loading_state = LoadingState::Loading(file_label(&path));
                }
                LoadMessage::Progress(progress) => self.last_progress = Some(progress),
            }
        }
    }

    /// Apply the background load's result if it has finished. Returns
    /// `None` while it is still running or when nothing is loading.
    pub fn poll_load(&mut self) -> Option<Result<LoadSummary>> {
        self.drain_messages();
        let received = match &self.pending {
            Some(handle) => match handle.result.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => Err(Error::LoadAborted),
            },
            None => return None,
        };
        Some(self.finish_pending(received))
    }

    /// Block until the background load finishes and apply its result
    pub fn wait_for_load(&mut self) -> Option<Result<LoadSummary>> {
        let received = match &self.pending {
            Some(handle) => handle.result.recv().unwrap_or(Err(Error::LoadAborted)),
            None => return None,
        };
        self.drain_messages();
        Some(self.finish_pending(received))
    }

    fn finish_pending(&mut self, received: Result<LoadResult>) -> Result<LoadSummary> {
        if let Some(mut handle) = self.pending.take() {
            handle.join();
        }
        self.loading_state = LoadingState::Idle;
        match received {
            Ok(result) => self.apply_result(result),
            Err(e) => {
                if e.is_cancelled() {
                    tracing::info!("load cancelled");
                } else {
                    tracing::warn!("load failed: {}", e);
                }
                Err(e)
            }
        }
    }

    fn apply_result(&mut self, result: LoadResult) -> Result<LoadSummary> {
        tracing::debug!(
            success = result.is_success(),
            errors = result.errors().len(),
            "applying load result"
        );
        match result {
            LoadResult::Success(dataset) => {
                let span = dataset.log.span();
                self.catalog = Some(SignalCatalog::from_log(&dataset.log));
                self.dataset = Some(*dataset);
                self.viewport.set_full_range(span.start, span.end)?;
                self.window_secs =
                    normalize_window_secs(self.settings.viewport.default_window_secs);
                self.apply_window(self.window_secs, 0.0)?;

                let stats = self.stats();
                tracing::info!(
                    files = stats.files,
                    entries = stats.entries,
                    signals = stats.signals,
                    errors = stats.errors,
                    "load completed"
                );
                Ok(LoadSummary::Loaded(stats))
            }
            LoadResult::Failed(errors) => {
                tracing::info!(errors = errors.len(), "load produced no data");
                self.clear_data();
                Ok(LoadSummary::Failed(errors))
            }
        }
    }

    fn clear_data(&mut self) {
        self.dataset = None;
        self.catalog = None;
        // Keeps subscribers; an empty range is always valid
        let epoch = NaiveDateTime::default();
        let _ = self.viewport.set_full_range(epoch, epoch);
    }

    /// Drop the dataset, catalog and filter and reset the viewport
    pub fn clear(&mut self) {
        self.clear_data();
        self.filter = SignalFilter::default();
        self.window_secs = normalize_window_secs(self.settings.viewport.default_window_secs);
        self.last_progress = None;
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    fn apply_window(&mut self, duration_secs: f64, position: f64) -> Result<()> {
        let window = TimeDelta::milliseconds((duration_secs * 1000.0).round() as i64);
        self.viewport.set_window(window, position)
    }

    /// Show `duration_secs` of data (clamped to [0.1, 86400] s and to the
    /// loaded span) at `position` in [0, 1]
    pub fn set_window(&mut self, duration_secs: f64, position: f64) -> Result<()> {
        self.window_secs = normalize_window_secs(duration_secs);
        if !self.has_data() {
            return Ok(());
        }
        self.apply_window(self.window_secs, position)
    }

    pub fn zoom_in(&mut self) -> Result<()> {
        if !self.has_data() {
            return Ok(());
        }
        self.viewport.zoom_in(self.settings.viewport.zoom_step);
        self.viewport.apply_zoom()
    }

    pub fn zoom_out(&mut self) -> Result<()> {
        if !self.has_data() {
            return Ok(());
        }
        self.viewport.zoom_out(self.settings.viewport.zoom_step);
        self.viewport.apply_zoom()
    }

    /// Pan by `fraction` of the visible width; negative pans left
    pub fn pan_by_fraction(&mut self, fraction: f64) -> Result<()> {
        let width = self.viewport.visible_range().duration();
        if !self.has_data() || width <= TimeDelta::zero() || !fraction.is_finite() {
            return Ok(());
        }
        self.viewport.pan(scale(width, fraction))
    }

    pub fn pan_left(&mut self) -> Result<()> {
        self.pan_by_fraction(-self.settings.viewport.pan_fraction)
    }

    pub fn pan_right(&mut self) -> Result<()> {
        self.pan_by_fraction(self.settings.viewport.pan_fraction)
    }

    /// Center the view on `center`. Without an explicit window the current
    /// visible width is kept, or the configured window when the view is
    /// empty.
    pub fn jump_to(&mut self, center: NaiveDateTime, window: Option<TimeDelta>) -> Result<()> {
        if !self.has_data() {
            return Ok(());
        }
        let visible = self.viewport.visible_range().duration();
        let window = window.unwrap_or_else(|| {
            if visible > TimeDelta::zero() {
                visible
            } else {
                TimeDelta::milliseconds((self.window_secs * 1000.0).round() as i64)
            }
        });
        self.viewport.jump_to(center, Some(window))
    }

    /// Zoom 1 and the whole loaded span visible
    pub fn reset_view(&mut self) -> Result<()> {
        if !self.has_data() {
            return Ok(());
        }
        self.viewport.reset()
    }

    pub fn full_range(&self) -> Option<TimeSpan> {
        self.has_data().then(|| self.viewport.full_range())
    }
}

impl Drop for LogSession {
    fn drop(&mut self) {
        if let Some(mut handle) = self.pending.take() {
            handle.cancel();
            handle.join();
        }
    }
}

/// Load `paths` with a throwaway session, mostly for tools and tests
pub fn load_once<I, Q>(
    registry: Arc<ParserRegistry>,
    settings: Settings,
    paths: I,
) -> Result<(LogSession, LoadSummary)>
where
    I: IntoIterator<Item = Q>,
    Q: AsRef<Path>,
{
    let mut session = LogSession::new(registry, settings);
    let summary = session.load_files(paths, &CancellationToken::new(), &NoProgress)?;
    Ok((session, summary))
}
