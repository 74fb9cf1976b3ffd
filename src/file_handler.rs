//! File handling with memory mapping and input validation.
//!
//! This module provides the read-only mapped accessor used by every engine and
//! the precondition check that runs before a file is opened.

pub mod mapped;
pub mod validation;

pub use mapped::MappedLogFile;
pub use validation::validate_log_file;

/// Read-only mapping of a log file, validated first.
///
/// This is the entry point a session uses: precondition failures surface as
/// `InvalidFile` before any mapping is attempted.
pub fn open_log_file(path: &std::path::Path) -> crate::error::Result<MappedLogFile> {
    validate_log_file(path)?;
    MappedLogFile::open_path(path)
}
