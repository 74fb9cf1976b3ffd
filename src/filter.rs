//! Row filtering by level, minute bucket, and text.
//!
//! Predicates are checked cheapest first: level and minute bucket come
//! straight from the index arrays, and only rows that survive both are
//! decoded from the mapped file for the text query.

use crate::config::FilterConfig;
use crate::error::{LogsiftError, Result};
use crate::file_handler::MappedLogFile;
use crate::index::{Level, LineIndex};
use crate::task::{percent_of, CancelToken, Outcome, Progress};
use grep_matcher::Matcher;
use grep_regex::{RegexMatcher, RegexMatcherBuilder};
use std::collections::BTreeSet;

/// Text condition of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextQuery {
    pub pattern: String,
    /// Treat `pattern` as a regular expression instead of a literal
    pub regex: bool,
    pub case_insensitive: bool,
}

impl TextQuery {
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            regex: true,
            case_insensitive: false,
        }
    }

    pub fn literal(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            regex: false,
            case_insensitive: false,
        }
    }

    pub fn ignore_case(mut self) -> Self {
        self.case_insensitive = true;
        self
    }
}

/// Conjunction of up to three conditions; an absent condition always passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPredicate {
    /// Allowed levels; empty means every level
    pub levels: BTreeSet<Level>,
    /// Only rows stamped within this minute key
    pub minute_bucket: Option<u64>,
    pub text: Option<TextQuery>,
}

impl FilterPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_levels(mut self, levels: impl IntoIterator<Item = Level>) -> Self {
        self.levels = levels.into_iter().collect();
        self
    }

    pub fn with_minute_bucket(mut self, minute_key: u64) -> Self {
        self.minute_bucket = Some(minute_key);
        self
    }

    pub fn with_text(mut self, text: TextQuery) -> Self {
        self.text = Some(text);
        self
    }

    /// True when every row passes
    pub fn is_pass_through(&self) -> bool {
        self.levels.is_empty()
            && self.minute_bucket.is_none()
            && self.text.as_ref().map_or(true, |t| t.pattern.is_empty())
    }

    /// Validate and compile the predicate
    ///
    /// # Errors
    /// * `PatternSyntax` if the text query is not a valid expression
    pub fn compile(&self) -> Result<CompiledFilter> {
        let matcher = match &self.text {
            Some(query) if !query.pattern.is_empty() => Some(build_matcher(query)?),
            _ => None,
        };
        let level_mask = self
            .levels
            .iter()
            .fold(0u8, |mask, level| mask | (1 << level.code()));

        Ok(CompiledFilter {
            level_mask,
            minute_bucket: self.minute_bucket,
            matcher,
        })
    }
}

fn build_matcher(query: &TextQuery) -> Result<RegexMatcher> {
    let pattern = if query.regex {
        query.pattern.clone()
    } else {
        regex::escape(&query.pattern)
    };
    RegexMatcherBuilder::new()
        .case_insensitive(query.case_insensitive)
        .build(&pattern)
        .map_err(|e| LogsiftError::pattern_syntax(&query.pattern, e.to_string()))
}

/// A predicate ready to be evaluated against index rows.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    /// Bit `n` set when level code `n` is allowed; 0 allows every level
    level_mask: u8,
    minute_bucket: Option<u64>,
    matcher: Option<RegexMatcher>,
}

impl CompiledFilter {
    /// Filter that keeps every row
    pub fn pass_through() -> Self {
        Self {
            level_mask: 0,
            minute_bucket: None,
            matcher: None,
        }
    }

    pub fn is_pass_through(&self) -> bool {
        self.level_mask == 0 && self.minute_bucket.is_none() && self.matcher.is_none()
    }

    /// Level and minute checks, which need only the index
    ///
    /// Rows with no detected level are kept even when a level whitelist is set.
    #[inline]
    pub fn matches_metadata(&self, index: &LineIndex, row: u64) -> bool {
        if self.level_mask != 0 {
            if let Some(level) = index.level_of(row) {
                if self.level_mask & (1 << level.code()) == 0 {
                    return false;
                }
            }
        }
        match self.minute_bucket {
            Some(bucket) => index.minute_key_of(row) == Some(bucket),
            None => true,
        }
    }

    /// Full evaluation of `row`, decoding at most `line_limit` bytes
    pub fn matches(&self, index: &LineIndex, file: &MappedLogFile, row: u64, line_limit: usize) -> bool {
        if !self.matches_metadata(index, row) {
            return false;
        }
        let Some(matcher) = &self.matcher else {
            return true;
        };
        let Some(offset) = index.offset_of(row) else {
            return false;
        };
        let line = file.read_line_at(offset, line_limit);
        matcher.is_match(line.as_bytes()).unwrap_or(false)
    }
}

/// Evaluate `filter` over every row of `index`
///
/// # Arguments
/// * `cancel` - Polled before every row
/// * `progress` - Called every `config.progress_every` rows and once at the end
///
/// # Returns
/// Matching rows in ascending order. A cancelled run carries the rows matched
/// so far; it is never a final answer.
pub fn run_filter(
    index: &LineIndex,
    file: &MappedLogFile,
    filter: &CompiledFilter,
    config: &FilterConfig,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(Progress),
) -> Outcome<Vec<u64>> {
    let total = index.total_lines();
    let report_every = config.progress_every.max(1);
    let mut matched = Vec::new();

    for row in index.rows() {
        if row > 0 && row % report_every == 0 {
            let percent = percent_of(row, total);
            progress(Progress::new(
                percent,
                format!("Filtering... {}% | matches {}", percent, matched.len()),
            ));
        }

        if cancel.is_cancelled() {
            log::debug!("filter cancelled after {} of {} rows", row, total);
            return Outcome::Cancelled(matched);
        }

        if filter.matches(index, file, row, config.line_limit) {
            matched.push(row);
        }
    }

    progress(Progress::new(
        100,
        format!("Filter complete: {} of {} rows", matched.len(), total),
    ));
    log::info!("filter matched {} of {} rows", matched.len(), total);
    Outcome::Completed(matched)
}
