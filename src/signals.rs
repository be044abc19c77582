//! Signal state engine.
//!
//! Groups readings by signal and turns each signal's readings into a
//! gapless run of intervals: every reading holds its value until the next
//! reading, and the last one holds until the end of the observation span.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::cell::OnceCell;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::parsers::{ParsedLog, Reading, SignalType, TimeSpan, Value};

/// A span of time during which a signal held one value
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalState {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub value: Value,
}

impl SignalState {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, value: Value) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self { start, end, value })
    }

    pub fn signal_type(&self) -> SignalType {
        self.value.signal_type()
    }

    pub fn span(&self) -> TimeSpan {
        TimeSpan {
            start: self.start,
            end: self.end,
        }
    }
}

/// Readings of one signal, ascending by timestamp
#[derive(Clone, Debug, PartialEq)]
pub struct SignalGroup {
    /// First spelling of the signal key
    pub key: String,
    pub readings: Vec<Reading>,
}

/// Partition readings by signal key, ignoring case. Groups are ordered by
/// key, readings within a group by timestamp.
pub fn group_by_signal(log: &ParsedLog) -> Vec<SignalGroup> {
    let mut groups: BTreeMap<String, SignalGroup> = BTreeMap::new();
    for reading in log.readings() {
        groups
            .entry(reading.signal_key.to_lowercase())
            .or_insert_with(|| SignalGroup {
                key: reading.signal_key.clone(),
                readings: Vec::new(),
            })
            .readings
            .push(reading.clone());
    }

    groups
        .into_values()
        .map(|mut group| {
            group.readings.sort_by_key(|r| r.timestamp);
            group
        })
        .collect()
}

/// Derive the interval sequence for one signal.
///
/// `readings` must be sorted ascending. Intervals are contiguous; two
/// readings sharing a timestamp yield a zero-length interval.
pub fn derive_states(readings: &[Reading], observation: TimeSpan) -> Vec<SignalState> {
    let mut states = Vec::with_capacity(readings.len());
    for (i, reading) in readings.iter().enumerate() {
        let end = match readings.get(i + 1) {
            Some(next) => next.timestamp,
            None => observation.end.max(reading.timestamp),
        };
        debug_assert!(end >= reading.timestamp, "readings must be sorted");
        states.push(SignalState {
            start: reading.timestamp,
            end,
            value: reading.value.clone(),
        });
    }
    states
}

/// Readings and derived intervals of one signal
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalData {
    pub key: String,
    pub device_id: String,
    pub name: String,
    pub signal_type: SignalType,
    pub readings: Vec<Reading>,
    pub states: Vec<SignalState>,
}

impl SignalData {
    fn from_readings(key: String, readings: Vec<Reading>, observation: TimeSpan) -> Option<Self> {
        let first = readings.first()?;
        let device_id = first.device_id.clone();
        let name = first.signal_name.clone();
        let signal_type = first.signal_type();
        let states = derive_states(&readings, observation);
        Some(Self {
            key,
            device_id,
            name,
            signal_type,
            readings,
            states,
        })
    }
}

/// Build interval data for every signal in `log`, ordered by key
pub fn build_signal_data(log: &ParsedLog) -> Vec<SignalData> {
    let span = log.span();
    group_by_signal(log)
        .into_iter()
        .filter_map(|group| SignalData::from_readings(group.key, group.readings, span))
        .collect()
}

fn has_changes(readings: &[Reading]) -> bool {
    readings.windows(2).any(|w| w[0].value != w[1].value)
}

/// One signal in a [`SignalCatalog`]. Its [`SignalData`] is derived on
/// first access and cached until the readings change.
#[derive(Debug)]
pub struct CatalogEntry {
    key: String,
    device_id: String,
    name: String,
    signal_type: SignalType,
    readings: Vec<Reading>,
    has_changes: bool,
    data: OnceCell<SignalData>,
}

impl CatalogEntry {
    fn new(group: SignalGroup) -> Option<Self> {
        let first = group.readings.first()?;
        Some(Self {
            device_id: first.device_id.clone(),
            name: first.signal_name.clone(),
            signal_type: first.signal_type(),
            has_changes: has_changes(&group.readings),
            key: group.key,
            readings: group.readings,
            data: OnceCell::new(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Device: Signal`, as shown in signal lists
    pub fn display_name(&self) -> String {
        format!("{}: {}", self.device_id, self.name)
    }

    pub fn signal_type(&self) -> SignalType {
        self.signal_type
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// True when the value changes at least once
    pub fn has_changes(&self) -> bool {
        self.has_changes
    }

    pub fn is_cached(&self) -> bool {
        self.data.get().is_some()
    }
}

/// Per-signal view of a loaded log
#[derive(Debug)]
pub struct SignalCatalog {
    entries: Vec<CatalogEntry>,
    span: TimeSpan,
}

impl SignalCatalog {
    pub fn from_log(log: &ParsedLog) -> Self {
        let entries: Vec<_> = group_by_signal(log)
            .into_iter()
            .filter_map(CatalogEntry::new)
            .collect();
        tracing::debug!(signals = entries.len(), "built signal catalog");
        Self {
            entries,
            span: log.span(),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn span(&self) -> TimeSpan {
        self.span
    }

    /// Case-insensitive lookup by signal key
    pub fn position(&self, key: &str) -> Option<usize> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .position(|e| e.key.to_lowercase() == key)
    }

    pub fn get(&self, key: &str) -> Option<&CatalogEntry> {
        self.position(key).map(|idx| &self.entries[idx])
    }

    /// Interval data for the entry at `index`, derived on first call
    pub fn data(&self, index: usize) -> Option<&SignalData> {
        let entry = self.entries.get(index)?;
        if let Some(data) = entry.data.get() {
            return Some(data);
        }
        let data = SignalData::from_readings(entry.key.clone(), entry.readings.clone(), self.span)?;
        Some(entry.data.get_or_init(|| data))
    }

    pub fn data_for(&self, key: &str) -> Option<&SignalData> {
        self.data(self.position(key)?)
    }

    /// Replace the readings of signal `key`, dropping its cached data.
    ///
    /// The observation span widens to cover the new readings; when it does,
    /// every cached entry is dropped. Returns `false` when `key` is unknown
    /// or `readings` is empty.
    pub fn replace_readings(&mut self, key: &str, mut readings: Vec<Reading>) -> bool {
        let Some(index) = self.position(key) else {
            return false;
        };
        if readings.is_empty() {
            return false;
        }
        readings.sort_by_key(|r| r.timestamp);

        let before = self.span;
        for reading in &readings {
            self.span.include(reading.timestamp);
        }
        if self.span != before {
            for entry in &mut self.entries {
                entry.data.take();
            }
        }

        let entry = &mut self.entries[index];
        entry.signal_type = readings[0].signal_type();
        entry.has_changes = has_changes(&readings);
        entry.readings = readings;
        entry.data.take();
        true
    }
}
