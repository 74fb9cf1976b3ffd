//! Background task plumbing: cancellation, progress, and per-run channels.

pub mod protocol;
pub mod runner;

pub use protocol::{
    percent_of, CancelToken, Outcome, Progress, ProgressThrottle, TaskEvent, TaskId, TaskKind,
};
pub use runner::{spawn_cluster, spawn_filter, spawn_index, spawn_task, TaskHandle};
