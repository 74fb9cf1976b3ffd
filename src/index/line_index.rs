//! Immutable per-line index over a log file.

use super::codec::{Level, UNKNOWN_LEVEL};
use std::ops::Range;

/// Stored minute key meaning "no timestamp"
pub const NO_MINUTE_KEY: u64 = 0;

/// Line start offsets plus per-line minute key and level code.
///
/// All three arrays have `total_lines + 1` slots. `offsets[r]` is where row
/// `r` starts and `offsets[total_lines]` is one past the last indexed LF.
/// The metadata arrays are shifted by one: slot 0 is a placeholder and the
/// metadata for row `r` sits in slot `r + 1`, next to the offset of the line
/// that follows it. Use [`LineIndex::level_of`] and
/// [`LineIndex::minute_key_of`] rather than indexing the raw slices.
///
/// Bytes after the final LF are not a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    offsets: Vec<u64>,
    minute_keys: Vec<u64>,
    level_codes: Vec<u8>,
    total_lines: u64,
    file_size: u64,
}

impl Default for LineIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl LineIndex {
    /// Index with zero rows, used for empty files and cancelled builds
    pub fn empty() -> Self {
        LineIndexBuilder::new(0).finish(0)
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    pub fn is_empty(&self) -> bool {
        self.total_lines == 0
    }

    /// Byte length of the source at build time
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Every row number, in file order
    pub fn rows(&self) -> Range<u64> {
        0..self.total_lines
    }

    /// Raw offset slots, `total_lines + 1` long
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Raw minute key slots; see the type docs for the layout
    pub fn minute_key_slots(&self) -> &[u64] {
        &self.minute_keys
    }

    /// Raw level code slots; see the type docs for the layout
    pub fn level_code_slots(&self) -> &[u8] {
        &self.level_codes
    }

    /// Start offset of `row`
    pub fn offset_of(&self, row: u64) -> Option<u64> {
        if row < self.total_lines {
            Some(self.offsets[row as usize])
        } else {
            None
        }
    }

    /// Byte range of `row` excluding its line feed
    pub fn line_range(&self, row: u64) -> Option<Range<u64>> {
        let start = self.offset_of(row)?;
        let next = self.offsets[row as usize + 1];
        Some(start..next.saturating_sub(1))
    }

    /// Level code of `row`, [`UNKNOWN_LEVEL`] when none was detected
    #[inline]
    pub fn level_code_of(&self, row: u64) -> u8 {
        if row < self.total_lines {
            self.level_codes[row as usize + 1]
        } else {
            UNKNOWN_LEVEL
        }
    }

    #[inline]
    pub fn level_of(&self, row: u64) -> Option<Level> {
        Level::from_code(self.level_code_of(row))
    }

    /// Minute key of `row`, `None` when the line had no timestamp
    #[inline]
    pub fn minute_key_of(&self, row: u64) -> Option<u64> {
        if row >= self.total_lines {
            return None;
        }
        match self.minute_keys[row as usize + 1] {
            NO_MINUTE_KEY => None,
            key => Some(key),
        }
    }
}

/// Append-only builder used by the indexer.
#[derive(Debug)]
pub struct LineIndexBuilder {
    offsets: Vec<u64>,
    minute_keys: Vec<u64>,
    level_codes: Vec<u8>,
}

impl LineIndexBuilder {
    /// Start a builder, reserving room for about `expected_lines` rows
    pub fn new(expected_lines: usize) -> Self {
        let capacity = expected_lines.saturating_add(1);
        let mut offsets = Vec::with_capacity(capacity);
        let mut minute_keys = Vec::with_capacity(capacity);
        let mut level_codes = Vec::with_capacity(capacity);
        offsets.push(0);
        minute_keys.push(NO_MINUTE_KEY);
        level_codes.push(UNKNOWN_LEVEL);
        Self {
            offsets,
            minute_keys,
            level_codes,
        }
    }

    /// Record the line that ends just before `next_line_start`
    pub fn push_line(&mut self, next_line_start: u64, minute_key: Option<u64>, level: Option<Level>) {
        self.offsets.push(next_line_start);
        self.minute_keys.push(minute_key.unwrap_or(NO_MINUTE_KEY));
        self.level_codes.push(level.map_or(UNKNOWN_LEVEL, Level::code));
    }

    /// Rows recorded so far
    pub fn line_count(&self) -> u64 {
        (self.offsets.len() - 1) as u64
    }

    pub fn finish(self, file_size: u64) -> LineIndex {
        let total_lines = self.line_count();
        LineIndex {
            offsets: self.offsets,
            minute_keys: self.minute_keys,
            level_codes: self.level_codes,
            total_lines,
            file_size,
        }
    }
}
