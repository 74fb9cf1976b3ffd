//! Consumer-facing row access: field splitting, a decoded-row cache, and
//! per-minute / per-level aggregates over a row view.

use crate::config::RowConfig;
use crate::file_handler::MappedLogFile;
use crate::index::{strip_level_marker, strip_timestamp, Level, LineIndex};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;

/// A row split into display fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFields {
    /// First 19 characters when they parse as a timestamp, else empty
    pub timestamp: String,
    /// Level recorded in the index, empty when unknown
    pub level: &'static str,
    pub message: String,
}

/// Split `row` into timestamp, level, and message
///
/// The message drops the timestamp, the separators after it, and a leading
/// marker for the row's own level. Out-of-range rows give empty fields.
pub fn read_row(index: &LineIndex, file: &MappedLogFile, row: u64, config: &RowConfig) -> RowFields {
    let Some(offset) = index.offset_of(row) else {
        return RowFields::default();
    };
    let line = file.read_line_at(offset, config.line_limit);
    let (timestamp, message) = strip_timestamp(&line);
    let level = index.level_of(row);
    let message = match level {
        Some(level) => strip_level_marker(message, level),
        None => message,
    };

    RowFields {
        timestamp: timestamp.unwrap_or_default().to_string(),
        level: level.map_or("", Level::as_str),
        message: message.to_string(),
    }
}

/// Full text of `row` for detail views, bounded by `raw_line_limit`
pub fn read_row_raw_text(index: &LineIndex, file: &MappedLogFile, row: u64, config: &RowConfig) -> String {
    index
        .offset_of(row)
        .map(|offset| file.read_line_at(offset, config.raw_line_limit).into_owned())
        .unwrap_or_default()
}

/// LRU cache of decoded rows keyed by row number.
///
/// Must be cleared whenever the index or file it was filled from changes.
#[derive(Debug)]
pub struct RowCache {
    cache: Mutex<LruCache<u64, RowFields>>,
}

impl RowCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached fields for `row`, decoding and inserting them on a miss
    pub fn get_or_read(
        &self,
        index: &LineIndex,
        file: &MappedLogFile,
        row: u64,
        config: &RowConfig,
    ) -> RowFields {
        if let Some(fields) = self.cache.lock().get(&row) {
            return fields.clone();
        }
        // Decode without holding the lock
        let fields = read_row(index, file, row, config);
        self.cache.lock().put(row, fields.clone());
        fields
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row count for one minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineBin {
    pub minute_key: u64,
    pub count: u64,
}

/// Per-minute row counts over `rows`, ascending by minute
///
/// Rows without a timestamp are left out.
pub fn timeline_bins(index: &LineIndex, rows: &[u64]) -> Vec<TimelineBin> {
    let mut counts: BTreeMap<u64, u64> = BTreeMap::new();
    for &row in rows {
        if let Some(minute_key) = index.minute_key_of(row) {
            *counts.entry(minute_key).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .map(|(minute_key, count)| TimelineBin { minute_key, count })
        .collect()
}

/// Per-level row counts over `rows`, most frequent first; `None` is unknown
pub fn level_counts(index: &LineIndex, rows: &[u64]) -> Vec<(Option<Level>, u64)> {
    let mut counts = [0u64; Level::ALL.len() + 1];
    for &row in rows {
        let slot = index.level_of(row).map_or(Level::ALL.len(), |l| usize::from(l.code()));
        counts[slot] += 1;
    }

    let mut result: Vec<(Option<Level>, u64)> = Level::ALL
        .iter()
        .map(|&level| Some(level))
        .chain(std::iter::once(None))
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .collect();
    result.sort_by(|a, b| b.1.cmp(&a.1));
    result
}
