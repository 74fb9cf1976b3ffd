//! Memory-mapped log file accessor
//!
//! This module provides the MappedLogFile type that maps one file read-only and
//! resolves byte offsets to decoded lines on demand. Only the requested byte
//! ranges are ever touched; the OS page cache does the paging, so memory use is
//! independent of file size.

use crate::error::{LogsiftError, Result};
use bstr::ByteSlice;
use memchr::memchr;
use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Read-only mapping of a single log file.
///
/// At most one file is open per accessor. Opening a new path releases the
/// previous mapping first. All read operations are infallible: with no file
/// open they return empty results.
#[derive(Debug, Default)]
pub struct MappedLogFile {
    region: Option<MappedRegion>,
}

#[derive(Debug)]
struct MappedRegion {
    path: PathBuf,
    file_size: u64,
    /// `None` for zero-length files, which cannot be mapped on every platform
    mmap: Option<Mmap>,
    _file: File,
}

impl MappedLogFile {
    /// Create an accessor with no file open
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an accessor and open `path` in one step
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut mapped = Self::new();
        mapped.open(path)?;
        Ok(mapped)
    }

    /// Map `path` read-only, replacing any mapping that is already open
    ///
    /// # Errors
    /// * `FileError` if the file cannot be opened, inspected, or mapped
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.close();

        let file = File::open(path).map_err(|e| {
            LogsiftError::file_error(format!("Failed to open file: {}", path.display()), e)
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| LogsiftError::file_error("Failed to get file metadata", e))?
            .len();

        let mmap = if file_size == 0 {
            None
        } else {
            // SAFETY: the mapping is read-only; concurrent truncation of the
            // underlying file by another process is outside our control.
            let mmap = unsafe {
                Mmap::map(&file).map_err(|e| {
                    LogsiftError::file_error(
                        format!("Failed to memory map file: {}", path.display()),
                        e,
                    )
                })?
            };

            // Row lookups jump around the file, readahead only wastes page cache
            #[cfg(unix)]
            {
                if let Err(e) = mmap.advise(memmap2::Advice::Random) {
                    log::warn!("Failed to set mmap advice: {}", e);
                }
            }

            Some(mmap)
        };

        log::debug!("mapped {} ({} bytes)", path.display(), file_size);

        self.region = Some(MappedRegion {
            path: path.to_path_buf(),
            file_size,
            mmap,
            _file: file,
        });
        Ok(())
    }

    /// Release the mapping and file handle. Calling this twice is harmless.
    pub fn close(&mut self) {
        if let Some(region) = self.region.take() {
            log::debug!("unmapped {}", region.path.display());
        }
    }

    pub fn is_open(&self) -> bool {
        self.region.is_some()
    }

    /// Path of the open file, if any
    pub fn path(&self) -> Option<&Path> {
        self.region.as_ref().map(|r| r.path.as_path())
    }

    /// Size of the open file in bytes, 0 when nothing is open
    pub fn file_size(&self) -> u64 {
        self.region.as_ref().map_or(0, |r| r.file_size)
    }

    fn bytes(&self) -> &[u8] {
        self.region
            .as_ref()
            .and_then(|r| r.mmap.as_ref())
            .map_or(&[], |m| &m[..])
    }

    /// Decode the line starting at `offset`
    ///
    /// Scans forward for the next line feed, but never further than
    /// `max_bytes`, so a single pathological line cannot blow up memory.
    /// One trailing carriage return is removed. Invalid UTF-8 is replaced,
    /// and valid text is borrowed straight from the mapping.
    pub fn read_line_at(&self, offset: u64, max_bytes: usize) -> Cow<'_, str> {
        let data = self.bytes();
        let start = match usize::try_from(offset) {
            Ok(start) if start < data.len() => start,
            _ => return Cow::Borrowed(""),
        };

        let window_end = start.saturating_add(max_bytes).min(data.len());
        let end = memchr(b'\n', &data[start..window_end]).map_or(window_end, |pos| start + pos);

        let mut line = &data[start..end];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        line.to_str_lossy()
    }

    /// Raw bytes in `[start, min(end, file_size))`, empty for invalid ranges
    pub fn read_bytes(&self, start: u64, end: u64) -> &[u8] {
        let data = self.bytes();
        let len = data.len() as u64;
        if start >= end || start >= len {
            return &[];
        }
        &data[start as usize..end.min(len) as usize]
    }
}
