//! File validation utilities for ensuring files are suitable for processing.
//!
//! This module checks that a path is an acceptable log file before anything is
//! mapped or any background task starts.

use crate::error::{LogsiftError, Result};
use memchr::memchr;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes inspected by the binary-content check
pub const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// Required file name extension (compared case-insensitively)
pub const LOG_EXTENSION: &str = "log";

/// Validate that a path is a readable, text-based `.log` file
///
/// # Validations Performed
/// - Path exists (otherwise an I/O error)
/// - Path is not a symbolic link
/// - Path is a regular file
/// - File name ends in `.log`
/// - The first 8 KiB contain no NUL byte
///
/// Empty files are accepted; they simply index to zero lines.
pub fn validate_log_file(path: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| {
        LogsiftError::file_error(format!("Cannot inspect file: {}", path.display()), e)
    })?;

    if metadata.file_type().is_symlink() {
        return Err(LogsiftError::invalid_file(
            path,
            "symbolic links are not accepted",
        ));
    }

    if !metadata.is_file() {
        return Err(LogsiftError::invalid_file(path, "not a regular file"));
    }

    let has_log_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(LOG_EXTENSION));
    if !has_log_extension {
        return Err(LogsiftError::invalid_file(
            path,
            "only .log files are accepted",
        ));
    }

    let mut file = File::open(path)
        .map_err(|e| LogsiftError::file_error("Cannot open file for reading", e))?;
    let mut head = Vec::with_capacity(BINARY_SNIFF_BYTES);
    file.by_ref()
        .take(BINARY_SNIFF_BYTES as u64)
        .read_to_end(&mut head)
        .map_err(|e| LogsiftError::file_error("Cannot read file header", e))?;

    if memchr(0, &head).is_some() {
        return Err(LogsiftError::invalid_file(
            path,
            "file appears to be binary (NUL byte in header)",
        ));
    }

    Ok(())
}
