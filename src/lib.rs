//! # logsift - Log Indexing, Filtering, and Clustering Engine
//!
//! A memory-efficient engine for exploring very large plain-text log files.
//! Files are memory-mapped and indexed in one streaming pass; afterwards any
//! line can be fetched by row number and the whole file can be filtered or
//! clustered without reading more than the rows that matter.
//!
//! ## Features
//!
//! - **Streaming Index**: one sequential pass records line offsets, minute buckets, and levels
//! - **Cheap Filters First**: level and time filters never touch the file contents
//! - **Template Clustering**: numbers, ids, addresses, and paths are masked to group similar lines
//! - **Background Tasks**: every scan runs off the caller's thread with progress and cancellation
//!
//! ## Architecture
//!
//! - [`error`] - Centralized error types and handling
//! - [`config`] - Tunable limits, optionally loaded from TOML
//! - [`file_handler`] - Validation and memory-mapped file access
//! - [`index`] - Timestamp/level detection and the streaming indexer
//! - [`filter`] - Predicate compilation and row filtering
//! - [`cluster`] - Template normalization and clustering
//! - [`rows`] - Row field access, caching, and aggregates
//! - [`task`] - Background execution, progress, and cancellation
//! - [`app`] - Session state and stale-result handling

// Core modules
pub mod config;
pub mod error;
pub mod file_handler;

// Engines
pub mod cluster;
pub mod filter;
pub mod index;
pub mod rows;

// Orchestration
pub mod app;
pub mod task;

// Re-export commonly used types for convenience
pub use error::{LogsiftError, Result};

// Public API surface for external usage
pub use app::Session;
pub use cluster::{ClusterEntry, ClusterOptions};
pub use config::Config;
pub use file_handler::MappedLogFile;
pub use filter::{FilterPredicate, TextQuery};
pub use index::{Level, LineIndex};
pub use task::{CancelToken, Outcome, Progress, TaskEvent, TaskHandle, TaskKind};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
