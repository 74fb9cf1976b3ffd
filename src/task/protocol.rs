//! Protocol definitions shared between background tasks and their consumer.

use crate::error::LogsiftError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Generation identifier attached to each task so stale results can be dropped.
pub type TaskId = u64;

/// The long-running operations a session schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Index,
    Filter,
    Cluster,
    /// Run by an external exporter; tracked only so it can be cancelled
    Export,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Index,
        TaskKind::Filter,
        TaskKind::Cluster,
        TaskKind::Export,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Index => "index",
            TaskKind::Filter => "filter",
            TaskKind::Cluster => "cluster",
            TaskKind::Export => "export",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative cancellation flag shared between a task and its owner.
///
/// Tasks poll it at a fixed point in their loop and return a clean
/// cancelled outcome; nothing is interrupted asynchronously.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A progress report: percentage plus a human-readable status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub percent: u8,
    pub message: String,
}

impl Progress {
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

/// Integer percentage of `done` over `total`; an empty total counts as done.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((u128::from(done.min(total)) * 100) / u128::from(total)) as u8
}

/// Rate limiter for progress reports.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Instant,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// True at most once per interval.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

/// How a task run ended when it did not fail.
///
/// `Cancelled` still carries a payload: an empty index, a partial row list, or
/// an empty cluster list, depending on the task. It is never a final answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled(T),
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Outcome::Completed(value) | Outcome::Cancelled(value) => value,
        }
    }

    /// The payload only when the run completed.
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Cancelled(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(value) => Outcome::Completed(f(value)),
            Outcome::Cancelled(value) => Outcome::Cancelled(f(value)),
        }
    }
}

/// Messages a running task emits to its consumer.
#[derive(Debug)]
pub enum TaskEvent<T> {
    Progress(Progress),
    Finished(T),
    Cancelled(T),
    Failed(LogsiftError),
}

impl<T> TaskEvent<T> {
    /// True for the last event a task sends.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskEvent::Progress(_))
    }
}
