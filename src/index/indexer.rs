//! Single-pass streaming index builder
//!
//! The file is read sequentially in large chunks; memchr finds the line
//! feeds. Only the first few hundred bytes of each line are kept around (they
//! are all the timestamp and level detectors look at), so memory use is
//! bounded by the chunk size no matter how long individual lines are.

use super::codec::{detect_level, parse_timestamp_prefix, Level};
use super::line_index::{LineIndex, LineIndexBuilder};
use crate::config::IndexConfig;
use crate::error::{LogsiftError, Result};
use crate::task::{percent_of, CancelToken, Outcome, Progress, ProgressThrottle};
use bstr::ByteSlice;
use memchr::memchr_iter;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Rough average line length used to pre-size the index arrays
const ESTIMATED_LINE_BYTES: u64 = 128;

/// Upper bound on rows reserved up front; the arrays grow past it as needed
const MAX_RESERVED_LINES: usize = 1 << 20;

/// Build the index for `path`
///
/// # Arguments
/// * `config` - Chunk size, per-line prefix length, and progress interval
/// * `cancel` - Polled once per chunk
/// * `progress` - Receives throttled reports and one final 100% report
///
/// # Returns
/// `Completed` with the index, or `Cancelled` with an empty index.
///
/// # Errors
/// * `FileError` if the file cannot be opened or read
pub fn build_index(
    path: &Path,
    config: &IndexConfig,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<Outcome<LineIndex>> {
    let mut file = File::open(path).map_err(|e| {
        LogsiftError::file_error(format!("Failed to open file: {}", path.display()), e)
    })?;
    let expected_size = file
        .metadata()
        .map_err(|e| LogsiftError::file_error("Failed to get file metadata", e))?
        .len();

    let mut builder = LineIndexBuilder::new(reserved_lines(expected_size));

    let prefix_cap = config.prefix_bytes;
    let mut chunk = vec![0u8; config.chunk_size.max(1)];
    let mut line_prefix: Vec<u8> = Vec::with_capacity(prefix_cap);
    let mut consumed: u64 = 0;
    let mut throttle = ProgressThrottle::new(config.progress_interval());

    progress(Progress::new(0, "Indexing file..."));

    loop {
        if cancel.is_cancelled() {
            log::debug!(
                "indexing of {} cancelled after {} lines",
                path.display(),
                builder.line_count()
            );
            return Ok(Outcome::Cancelled(LineIndex::empty()));
        }

        let read = match file.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(LogsiftError::file_error(
                    format!("Failed to read file: {}", path.display()),
                    e,
                ))
            }
        };
        let data = &chunk[..read];

        let mut line_start = 0;
        for newline in memchr_iter(b'\n', data) {
            append_prefix(&mut line_prefix, &data[line_start..newline], prefix_cap);
            let (minute_key, level) = line_metadata(&line_prefix);
            builder.push_line(consumed + newline as u64 + 1, minute_key, level);
            line_prefix.clear();
            line_start = newline + 1;
        }
        append_prefix(&mut line_prefix, &data[line_start..], prefix_cap);
        consumed += read as u64;

        if throttle.ready() {
            let percent = percent_of(consumed, expected_size);
            progress(Progress::new(
                percent,
                format!("Indexing... {}% | lines ~{}", percent, builder.line_count()),
            ));
        }
    }

    let index = builder.finish(consumed);
    progress(Progress::new(
        100,
        format!("Index complete: {} lines", index.total_lines()),
    ));
    log::info!(
        "indexed {} lines ({} bytes) from {}",
        index.total_lines(),
        index.file_size(),
        path.display()
    );
    Ok(Outcome::Completed(index))
}

/// Rows to reserve for a file of `file_size` bytes
fn reserved_lines(file_size: u64) -> usize {
    usize::try_from(file_size / ESTIMATED_LINE_BYTES)
        .unwrap_or(usize::MAX)
        .min(MAX_RESERVED_LINES)
}

/// Keep at most `cap` leading bytes of the current line across chunk boundaries
fn append_prefix(prefix: &mut Vec<u8>, bytes: &[u8], cap: usize) {
    let room = cap.saturating_sub(prefix.len());
    if room > 0 {
        prefix.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }
}

fn line_metadata(prefix: &[u8]) -> (Option<u64>, Option<Level>) {
    let text = prefix.to_str_lossy();
    let minute_key = parse_timestamp_prefix(&text).map(|keys| keys.minute_key);
    (minute_key, detect_level(&text))
}
