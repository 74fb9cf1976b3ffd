//! Template clustering over a row view.
//!
//! Each kept row is reduced to a template key by [`normalize_message`]; rows
//! sharing a key form one cluster. Clusters are ranked by size, with ties kept
//! in the order their key was first seen.

pub mod normalize;

pub use normalize::{normalize_message, MAX_KEY_CHARS};

use crate::config::ClusterConfig;
use crate::file_handler::MappedLogFile;
use crate::index::{strip_timestamp, LineIndex};
use crate::task::{percent_of, CancelToken, Outcome, Progress};
use std::collections::HashMap;

/// Substrings that mark a line without an error level as error-like
const ERROR_MARKERS: [&str; 4] = ["EXCEPTION", "TRACEBACK", "FAILED", "ERROR"];

/// One template cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEntry {
    pub count: u64,
    pub template_key: String,
    /// First full line seen for this key, bounded in length
    pub sample_line: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterOptions {
    /// Only cluster rows that look like errors
    pub errors_only: bool,
    /// Number of clusters returned
    pub max_clusters: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            errors_only: false,
            max_clusters: ClusterConfig::default().default_max_clusters,
        }
    }
}

/// Whether `row` counts as an error for the errors-only mode
///
/// Rows with an error-like level always qualify; other rows qualify when
/// their prefix mentions an exception, traceback, failure, or error.
pub fn looks_like_error(index: &LineIndex, file: &MappedLogFile, row: u64, prefix_bytes: usize) -> bool {
    if index.level_of(row).is_some_and(|level| level.is_error_like()) {
        return true;
    }
    let Some(offset) = index.offset_of(row) else {
        return false;
    };
    let prefix = file.read_line_at(offset, prefix_bytes).to_uppercase();
    ERROR_MARKERS.iter().any(|marker| prefix.contains(marker))
}

/// Counts keys while remembering first-seen order.
#[derive(Debug, Default)]
struct ClusterCounter {
    positions: HashMap<String, usize>,
    entries: Vec<ClusterEntry>,
}

impl ClusterCounter {
    fn add(&mut self, key: String, sample: impl FnOnce() -> String) {
        match self.positions.get(&key) {
            Some(&position) => self.entries[position].count += 1,
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push(ClusterEntry {
                    count: 1,
                    template_key: key,
                    sample_line: sample(),
                });
            }
        }
    }

    fn distinct(&self) -> usize {
        self.entries.len()
    }

    fn into_ranked(self, max_clusters: usize) -> Vec<ClusterEntry> {
        let mut entries = self.entries;
        // Stable sort keeps first-seen order among equal counts
        entries.sort_by(|a, b| b.count.cmp(&a.count));
        entries.truncate(max_clusters);
        entries
    }
}

/// Cluster the given rows
///
/// # Arguments
/// * `rows` - Row view to cluster, usually a filter result
/// * `options` - Errors-only switch and number of clusters to return
/// * `cancel` - Polled before every row
/// * `progress` - Called every `config.progress_every` rows and once at the end
///
/// # Returns
/// `Completed` with at most `options.max_clusters` entries sorted by
/// descending count, or `Cancelled` with an empty list.
pub fn run_cluster(
    rows: &[u64],
    file: &MappedLogFile,
    index: &LineIndex,
    options: &ClusterOptions,
    config: &ClusterConfig,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(Progress),
) -> Outcome<Vec<ClusterEntry>> {
    let total = rows.len() as u64;
    let report_every = config.progress_every.max(1);
    let mut counter = ClusterCounter::default();

    for (done, &row) in rows.iter().enumerate() {
        let done = done as u64;
        if done > 0 && done % report_every == 0 {
            let percent = percent_of(done, total);
            progress(Progress::new(
                percent,
                format!("Clustering... {}% | clusters {}", percent, counter.distinct()),
            ));
        }

        if cancel.is_cancelled() {
            log::debug!("clustering cancelled after {} of {} rows", done, total);
            return Outcome::Cancelled(Vec::new());
        }

        if options.errors_only && !looks_like_error(index, file, row, config.prefix_bytes) {
            continue;
        }
        let Some(offset) = index.offset_of(row) else {
            continue;
        };

        let line = file.read_line_at(offset, config.line_limit);
        let (_, message) = strip_timestamp(&line);
        let key = normalize_message(message);
        if key.is_empty() {
            continue;
        }
        counter.add(key, || truncate_at_char_boundary(&line, config.sample_bytes).to_string());
    }

    let distinct = counter.distinct();
    let clusters = counter.into_ranked(options.max_clusters);
    progress(Progress::new(
        100,
        format!("Clustering complete: {} clusters", distinct),
    ));
    log::info!(
        "clustered {} rows into {} templates (showing {})",
        total,
        distinct,
        clusters.len()
    );
    Outcome::Completed(clusters)
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
