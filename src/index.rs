//! Line indexing: one streaming pass that records where every line starts
//! plus its minute bucket and severity.
//!
//! - `codec`: timestamp and level detection on a line prefix
//! - `line_index`: the immutable index value and its builder
//! - `indexer`: the chunked, cancellable file scan

pub mod codec;
pub mod indexer;
pub mod line_index;

pub use codec::{
    detect_level, format_minute_key, parse_timestamp_prefix, strip_level_marker, strip_timestamp,
    Level, TimestampKeys, UNKNOWN_LEVEL,
};
pub use indexer::build_index;
pub use line_index::{LineIndex, LineIndexBuilder, NO_MINUTE_KEY};
