//! Background execution of index, filter, and cluster runs.
//!
//! Every run gets a blocking-pool thread and its own event channel. The
//! consumer never blocks on the scan itself; it awaits events, which are
//! delivered in order and end with exactly one terminal event.

use super::protocol::{CancelToken, Outcome, Progress, TaskEvent, TaskId, TaskKind};
use crate::cluster::{run_cluster, ClusterEntry, ClusterOptions};
use crate::config::{ClusterConfig, FilterConfig, IndexConfig};
use crate::error::{LogsiftError, Result};
use crate::file_handler::MappedLogFile;
use crate::filter::{run_filter, CompiledFilter};
use crate::index::{build_index, LineIndex};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Consumer side of one background run.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    kind: TaskKind,
    cancel: CancelToken,
    events: UnboundedReceiver<TaskEvent<T>>,
    join: JoinHandle<()>,
}

impl<T> TaskHandle<T> {
    /// Generation this run was started with
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Ask the run to stop at its next check point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// True once the worker thread has returned
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Next event, or `None` after the terminal event has been taken
    pub async fn next_event(&mut self) -> Option<TaskEvent<T>> {
        self.events.recv().await
    }

    /// Wait for the terminal event, passing progress reports to `on_progress`
    ///
    /// # Errors
    /// The run's own failure, or `UnexpectedFailure` if the worker vanished
    /// without reporting.
    pub async fn wait_with(mut self, mut on_progress: impl FnMut(&Progress)) -> Result<Outcome<T>> {
        while let Some(event) = self.events.recv().await {
            match event {
                TaskEvent::Progress(progress) => on_progress(&progress),
                TaskEvent::Finished(value) => return Ok(Outcome::Completed(value)),
                TaskEvent::Cancelled(value) => return Ok(Outcome::Cancelled(value)),
                TaskEvent::Failed(error) => return Err(error),
            }
        }
        Err(LogsiftError::unexpected(format!(
            "{} task {} ended without a result",
            self.kind, self.id
        )))
    }

    /// Wait for the terminal event, discarding progress
    pub async fn wait(self) -> Result<Outcome<T>> {
        self.wait_with(|_| {}).await
    }

    /// All remaining events as a stream
    pub fn into_stream(self) -> UnboundedReceiverStream<TaskEvent<T>> {
        UnboundedReceiverStream::new(self.events)
    }
}

/// Run `body` on the blocking pool and report through a fresh channel
///
/// Panics inside `body` are caught here and surface as a `Failed` event.
/// Must be called from within a Tokio runtime.
pub fn spawn_task<T, F>(id: TaskId, kind: TaskKind, body: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken, &mut dyn FnMut(Progress)) -> Result<Outcome<T>> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancelToken::new();
    let token = cancel.clone();

    let join = tokio::task::spawn_blocking(move || {
        log::debug!("{} task {} started", kind, id);

        let progress_tx = tx.clone();
        let mut report = move |progress: Progress| {
            // The consumer may have dropped the handle; the run still finishes
            let _ = progress_tx.send(TaskEvent::Progress(progress));
        };

        let result = panic::catch_unwind(AssertUnwindSafe(move || body(&token, &mut report)));
        let event = match result {
            Ok(Ok(Outcome::Completed(value))) => TaskEvent::Finished(value),
            Ok(Ok(Outcome::Cancelled(value))) => {
                log::debug!("{} task {} cancelled", kind, id);
                TaskEvent::Cancelled(value)
            }
            Ok(Err(error)) => {
                log::warn!("{} task {} failed: {}", kind, id, error);
                TaskEvent::Failed(error)
            }
            Err(payload) => {
                let message = format!("{} task {} panicked: {}", kind, id, panic_message(&*payload));
                log::error!("{}", message);
                TaskEvent::Failed(LogsiftError::unexpected(message))
            }
        };
        let _ = tx.send(event);
    });

    TaskHandle {
        id,
        kind,
        cancel,
        events: rx,
        join,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Build the index for `path` in the background
pub fn spawn_index(id: TaskId, path: PathBuf, config: IndexConfig) -> TaskHandle<LineIndex> {
    spawn_task(id, TaskKind::Index, move |cancel, progress| {
        build_index(&path, &config, cancel, progress)
    })
}

/// Evaluate `filter` over every row of `index` in the background
pub fn spawn_filter(
    id: TaskId,
    index: Arc<LineIndex>,
    file: Arc<MappedLogFile>,
    filter: CompiledFilter,
    config: FilterConfig,
) -> TaskHandle<Vec<u64>> {
    spawn_task(id, TaskKind::Filter, move |cancel, progress| {
        Ok(run_filter(&index, &file, &filter, &config, cancel, progress))
    })
}

/// Cluster `rows` in the background
pub fn spawn_cluster(
    id: TaskId,
    rows: Arc<Vec<u64>>,
    index: Arc<LineIndex>,
    file: Arc<MappedLogFile>,
    options: ClusterOptions,
    config: ClusterConfig,
) -> TaskHandle<Vec<ClusterEntry>> {
    spawn_task(id, TaskKind::Cluster, move |cancel, progress| {
        Ok(run_cluster(&rows, &file, &index, &options, &config, cancel, progress))
    })
}
