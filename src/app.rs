//! Session orchestration layer
//!
//! A [`Session`] owns the open file, the current index, the current row view,
//! and the latest cluster list. It starts background runs and decides which of
//! their results may be published: every run carries a generation id, and
//! only the run a session most recently started for a task kind is current.
//! Results from superseded runs, and partial results from cancelled runs, are
//! dropped.

use crate::cluster::{ClusterEntry, ClusterOptions};
use crate::config::Config;
use crate::error::{LogsiftError, Result};
use crate::file_handler::{open_log_file, MappedLogFile};
use crate::filter::FilterPredicate;
use crate::index::LineIndex;
use crate::rows::{read_row_raw_text, timeline_bins, RowCache, RowFields, TimelineBin};
use crate::task::{
    spawn_cluster, spawn_filter, spawn_index, CancelToken, Outcome, TaskHandle, TaskId, TaskKind,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Run a session considers current for one task kind
#[derive(Debug)]
struct ActiveTask {
    id: TaskId,
    cancel: CancelToken,
}

/// State for one open log file.
#[derive(Debug)]
pub struct Session {
    config: Config,
    file: Option<Arc<MappedLogFile>>,
    index: Option<Arc<LineIndex>>,
    /// Rows currently visible, ascending
    view: Arc<Vec<u64>>,
    predicate: FilterPredicate,
    /// Predicate of the filter run in flight, applied when its result is published
    pending_predicate: Option<(TaskId, FilterPredicate)>,
    clusters: Arc<Vec<ClusterEntry>>,
    row_cache: RowCache,
    next_task_id: TaskId,
    active: HashMap<TaskKind, ActiveTask>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let row_cache = RowCache::new(config.rows.cache_capacity);
        Self {
            config,
            file: None,
            index: None,
            view: Arc::new(Vec::new()),
            predicate: FilterPredicate::default(),
            pending_predicate: None,
            clusters: Arc::new(Vec::new()),
            row_cache,
            next_task_id: 1,
            active: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate and map `path`, replacing whatever was open
    ///
    /// Every running task is cancelled first. The new file has no index until
    /// [`Session::start_index`] completes.
    ///
    /// # Errors
    /// * `InvalidFile` if the path fails the `.log` precondition checks
    /// * `FileError` if it cannot be inspected or mapped
    pub fn open(&mut self, path: &Path) -> Result<()> {
        let file = open_log_file(path)?;
        self.close();
        log::info!("opened {} ({} bytes)", path.display(), file.file_size());
        self.file = Some(Arc::new(file));
        Ok(())
    }

    /// Cancel every task and drop the file and everything derived from it
    pub fn close(&mut self) {
        self.cancel_all();
        self.file = None;
        self.index = None;
        self.view = Arc::new(Vec::new());
        self.predicate = FilterPredicate::default();
        self.pending_predicate = None;
        self.clusters = Arc::new(Vec::new());
        self.row_cache.clear();
    }

    pub fn file(&self) -> Option<&Arc<MappedLogFile>> {
        self.file.as_ref()
    }

    pub fn index(&self) -> Option<&Arc<LineIndex>> {
        self.index.as_ref()
    }

    /// Rows of the current view
    pub fn view(&self) -> &Arc<Vec<u64>> {
        &self.view
    }

    /// Predicate that produced the current view
    pub fn predicate(&self) -> &FilterPredicate {
        &self.predicate
    }

    pub fn clusters(&self) -> &Arc<Vec<ClusterEntry>> {
        &self.clusters
    }

    /// True when `id` is the run this session last started for `kind`
    pub fn is_current(&self, kind: TaskKind, id: TaskId) -> bool {
        self.active.get(&kind).is_some_and(|task| task.id == id)
    }

    /// Request cancellation of the current run of `kind`, if any
    pub fn cancel(&mut self, kind: TaskKind) {
        if let Some(task) = self.active.remove(&kind) {
            log::debug!("cancelling {} task {}", kind, task.id);
            task.cancel.cancel();
        }
    }

    pub fn cancel_all(&mut self) {
        for kind in TaskKind::ALL {
            self.cancel(kind);
        }
    }

    fn next_id(&mut self) -> TaskId {
        let id = self.next_task_id;
        self.next_task_id += 1;
        id
    }

    fn register<T>(&mut self, handle: &TaskHandle<T>) {
        self.active.insert(
            handle.kind(),
            ActiveTask {
                id: handle.id(),
                cancel: handle.cancel_token(),
            },
        );
    }

    /// Take the active slot for `kind` if `id` owns it
    fn settle(&mut self, kind: TaskKind, id: TaskId) -> bool {
        if self.is_current(kind, id) {
            self.active.remove(&kind);
            true
        } else {
            log::debug!("dropping result of stale {} task {}", kind, id);
            false
        }
    }

    fn require_file(&self) -> Result<Arc<MappedLogFile>> {
        self.file
            .clone()
            .ok_or_else(|| LogsiftError::invalid_argument("no file is open"))
    }

    fn require_index(&self) -> Result<(Arc<LineIndex>, Arc<MappedLogFile>)> {
        let file = self.require_file()?;
        let index = self
            .index
            .clone()
            .ok_or_else(|| LogsiftError::invalid_argument("the file has not been indexed"))?;
        Ok((index, file))
    }

    /// Index the open file in the background
    ///
    /// Cancels every running task, since all of them depend on the index.
    pub fn start_index(&mut self) -> Result<TaskHandle<LineIndex>> {
        let file = self.require_file()?;
        let path = file
            .path()
            .ok_or_else(|| LogsiftError::invalid_argument("no file is open"))?
            .to_path_buf();

        self.cancel_all();
        let id = self.next_id();
        let handle = spawn_index(id, path, self.config.index.clone());
        self.register(&handle);
        Ok(handle)
    }

    /// Install the index produced by run `id`
    ///
    /// The view resets to every row and any filter, cluster, or export run
    /// started against the previous index is cancelled. Returns false, leaving the session
    /// untouched, when the run is stale or was cancelled.
    pub fn publish_index(&mut self, id: TaskId, outcome: Outcome<LineIndex>) -> bool {
        if !self.settle(TaskKind::Index, id) {
            return false;
        }
        let Some(index) = outcome.completed() else {
            return false;
        };

        // Runs started during indexing were scanning the old index
        self.cancel(TaskKind::Filter);
        self.cancel(TaskKind::Cluster);
        self.cancel(TaskKind::Export);

        self.view = Arc::new(index.rows().collect());
        self.index = Some(Arc::new(index));
        self.predicate = FilterPredicate::default();
        self.pending_predicate = None;
        self.clusters = Arc::new(Vec::new());
        self.row_cache.clear();
        true
    }

    /// Filter the indexed file in the background
    ///
    /// The predicate is compiled first, so a malformed pattern fails here and
    /// nothing is cancelled. Otherwise any running filter, cluster, or export
    /// task is cancelled before the new run starts.
    ///
    /// # Errors
    /// * `PatternSyntax` for an invalid text query
    /// * `InvalidArgument` when there is no index yet
    pub fn start_filter(&mut self, predicate: FilterPredicate) -> Result<TaskHandle<Vec<u64>>> {
        let compiled = predicate.compile()?;
        let (index, file) = self.require_index()?;

        self.cancel(TaskKind::Filter);
        self.cancel(TaskKind::Cluster);
        self.cancel(TaskKind::Export);

        let id = self.next_id();
        let handle = spawn_filter(id, index, file, compiled, self.config.filter.clone());
        self.register(&handle);
        self.pending_predicate = Some((id, predicate));
        Ok(handle)
    }

    /// Install the rows produced by filter run `id` as the current view
    ///
    /// Clusters computed over the previous view are dropped, and cluster or
    /// export runs still working on it are cancelled.
    pub fn publish_view(&mut self, id: TaskId, outcome: Outcome<Vec<u64>>) -> bool {
        if !self.settle(TaskKind::Filter, id) {
            return false;
        }
        let Some(rows) = outcome.completed() else {
            return false;
        };

        // Cluster and export runs in flight cover the view being replaced
        self.cancel(TaskKind::Cluster);
        self.cancel(TaskKind::Export);

        if let Some((pending_id, predicate)) = self.pending_predicate.take() {
            if pending_id == id {
                self.predicate = predicate;
            }
        }
        self.view = Arc::new(rows);
        self.clusters = Arc::new(Vec::new());
        self.row_cache.clear();
        true
    }

    /// Cluster the current view in the background
    ///
    /// Cancels any running cluster or export task first.
    pub fn start_cluster(&mut self, options: ClusterOptions) -> Result<TaskHandle<Vec<ClusterEntry>>> {
        let (index, file) = self.require_index()?;

        self.cancel(TaskKind::Cluster);
        self.cancel(TaskKind::Export);

        let id = self.next_id();
        let handle = spawn_cluster(
            id,
            Arc::clone(&self.view),
            index,
            file,
            options,
            self.config.cluster.clone(),
        );
        self.register(&handle);
        Ok(handle)
    }

    pub fn publish_clusters(&mut self, id: TaskId, outcome: Outcome<Vec<ClusterEntry>>) -> bool {
        if !self.settle(TaskKind::Cluster, id) {
            return false;
        }
        match outcome.completed() {
            Some(clusters) => {
                self.clusters = Arc::new(clusters);
                true
            }
            None => false,
        }
    }

    /// Reserve the export slot for an external exporter
    ///
    /// Any running export is cancelled. The exporter polls the returned token
    /// and calls [`Session::finish_export`] when done.
    pub fn begin_export(&mut self) -> Result<(TaskId, CancelToken)> {
        self.require_index()?;
        self.cancel(TaskKind::Export);

        let id = self.next_id();
        let cancel = CancelToken::new();
        self.active.insert(
            TaskKind::Export,
            ActiveTask {
                id,
                cancel: cancel.clone(),
            },
        );
        Ok((id, cancel))
    }

    /// Release the export slot; false if the export was superseded
    pub fn finish_export(&mut self, id: TaskId) -> bool {
        self.settle(TaskKind::Export, id)
    }

    /// Number of rows in the current view
    pub fn view_len(&self) -> usize {
        self.view.len()
    }

    /// Display fields for position `view_row` of the current view
    pub fn row_fields(&self, view_row: usize) -> Option<RowFields> {
        let (index, file) = (self.index.as_ref()?, self.file.as_ref()?);
        let row = *self.view.get(view_row)?;
        Some(self.row_cache.get_or_read(index, file, row, &self.config.rows))
    }

    /// Full text for position `view_row` of the current view
    pub fn row_text(&self, view_row: usize) -> Option<String> {
        let (index, file) = (self.index.as_ref()?, self.file.as_ref()?);
        let row = *self.view.get(view_row)?;
        Some(read_row_raw_text(index, file, row, &self.config.rows))
    }

    /// Per-minute counts over the current view
    pub fn timeline(&self) -> Vec<TimelineBin> {
        self.index
            .as_ref()
            .map(|index| timeline_bins(index, &self.view))
            .unwrap_or_default()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::TextQuery;
    use crate::index::Level;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn create_log_file(content: &[u8]) -> NamedTempFile {
        let mut file = Builder::new()
            .suffix(".log")
            .tempfile()
            .expect("Failed to create temp file");
        file.write_all(content).expect("Failed to write test data");
        file.flush().expect("Failed to flush test data");
        file
    }

    const SAMPLE: &[u8] = b"2024-01-01 10:00:01 [INFO] Service started successfully\n\
2024-01-01 10:00:02 [ERROR] Failed to open file /var/data/file_42.dat\n\
2024-01-01 10:01:03 [ERROR] Failed to open file /var/data/file_43.dat\n";

    async fn indexed_session(content: &[u8]) -> (NamedTempFile, Session) {
        let temp = create_log_file(content);
        let mut session = Session::default();
        session.open(temp.path()).unwrap();
        let handle = session.start_index().unwrap();
        let id = handle.id();
        let outcome = handle.wait().await.unwrap();
        assert!(session.publish_index(id, outcome));
        (temp, session)
    }

    #[tokio::test]
    async fn test_index_resets_view_to_all_rows() {
        let (_temp, session) = indexed_session(SAMPLE).await;
        assert_eq!(session.view().as_slice(), &[0, 1, 2]);
        assert_eq!(session.index().unwrap().total_lines(), 3);

        let fields = session.row_fields(0).unwrap();
        assert_eq!(fields.timestamp, "2024-01-01 10:00:01");
        assert_eq!(fields.level, "INFO");
        assert_eq!(fields.message, "Service started successfully");
        assert_eq!(session.row_fields(3), None);
        assert_eq!(session.timeline().len(), 2);
    }

    #[tokio::test]
    async fn test_filter_then_cluster() {
        let (_temp, mut session) = indexed_session(SAMPLE).await;

        let predicate = FilterPredicate::new().with_levels([Level::Error]);
        let handle = session.start_filter(predicate.clone()).unwrap();
        let id = handle.id();
        let outcome = handle.wait().await.unwrap();
        assert!(session.publish_view(id, outcome));
        assert_eq!(session.view().as_slice(), &[1, 2]);
        assert_eq!(session.predicate(), &predicate);
        assert_eq!(
            session.row_text(0).unwrap(),
            "2024-01-01 10:00:02 [ERROR] Failed to open file /var/data/file_42.dat"
        );

        let handle = session.start_cluster(ClusterOptions::default()).unwrap();
        let id = handle.id();
        let outcome = handle.wait().await.unwrap();
        assert!(session.publish_clusters(id, outcome));
        assert_eq!(session.clusters().len(), 1);
        assert_eq!(session.clusters()[0].count, 2);
        assert_eq!(session.clusters()[0].template_key, "Failed to open file <path>");
    }

    #[tokio::test]
    async fn test_newer_filter_supersedes_older() {
        let (_temp, mut session) = indexed_session(SAMPLE).await;

        let first = session
            .start_filter(FilterPredicate::new().with_text(TextQuery::literal("Service")))
            .unwrap();
        let second = session
            .start_filter(FilterPredicate::new().with_text(TextQuery::literal("Failed")))
            .unwrap();
        assert!(first.cancel_token().is_cancelled());
        assert!(!session.is_current(TaskKind::Filter, first.id()));

        let (first_id, second_id) = (first.id(), second.id());
        let first_outcome = first.wait().await.unwrap();
        let second_outcome = second.wait().await.unwrap();

        assert!(!session.publish_view(first_id, first_outcome));
        assert!(session.publish_view(second_id, second_outcome));
        assert_eq!(session.view().as_slice(), &[1, 2]);
    }

    #[tokio::test]
    async fn test_invalid_pattern_fails_without_cancelling() {
        let (_temp, mut session) = indexed_session(SAMPLE).await;
        let (export_id, export_cancel) = session.begin_export().unwrap();

        let result = session.start_filter(FilterPredicate::new().with_text(TextQuery::regex("(")));
        assert!(matches!(result, Err(LogsiftError::PatternSyntax { .. })));
        assert!(!export_cancel.is_cancelled());
        assert!(session.finish_export(export_id));
    }

    #[tokio::test]
    async fn test_filter_cancels_cluster_and_export() {
        let (_temp, mut session) = indexed_session(SAMPLE).await;
        let cluster = session.start_cluster(ClusterOptions::default()).unwrap();
        let (export_id, export_cancel) = session.begin_export().unwrap();

        let filter = session.start_filter(FilterPredicate::new()).unwrap();

        assert!(cluster.cancel_token().is_cancelled());
        assert!(export_cancel.is_cancelled());
        assert!(!session.finish_export(export_id));
        assert!(session.is_current(TaskKind::Filter, filter.id()));
    }

    #[tokio::test]
    async fn test_new_view_rejects_cluster_over_previous_view() {
        let (_temp, mut session) = indexed_session(SAMPLE).await;

        let filter = session
            .start_filter(FilterPredicate::new().with_levels([Level::Info]))
            .unwrap();
        let filter_id = filter.id();
        // Started over the three-row view that the filter is about to replace
        let cluster = session.start_cluster(ClusterOptions::default()).unwrap();
        let cluster_id = cluster.id();
        let (export_id, export_cancel) = session.begin_export().unwrap();

        let outcome = filter.wait().await.unwrap();
        assert!(session.publish_view(filter_id, outcome));
        assert_eq!(session.view().as_slice(), &[0]);
        assert!(export_cancel.is_cancelled());
        assert!(!session.finish_export(export_id));

        let outcome = cluster.wait().await.unwrap();
        assert!(!session.publish_clusters(cluster_id, outcome));
        assert!(session.clusters().is_empty());
    }

    #[tokio::test]
    async fn test_new_index_rejects_runs_over_previous_index() {
        let (_temp, mut session) = indexed_session(SAMPLE).await;

        let index = session.start_index().unwrap();
        let index_id = index.id();
        let filter = session
            .start_filter(FilterPredicate::new().with_levels([Level::Error]))
            .unwrap();
        let filter_id = filter.id();
        let cluster = session.start_cluster(ClusterOptions::default()).unwrap();
        let cluster_id = cluster.id();

        let outcome = index.wait().await.unwrap();
        assert!(session.publish_index(index_id, outcome));
        assert!(filter.cancel_token().is_cancelled());
        assert!(cluster.cancel_token().is_cancelled());

        let outcome = filter.wait().await.unwrap();
        assert!(!session.publish_view(filter_id, outcome));
        let outcome = cluster.wait().await.unwrap();
        assert!(!session.publish_clusters(cluster_id, outcome));

        assert_eq!(session.view().as_slice(), &[0, 1, 2]);
        assert_eq!(session.predicate(), &FilterPredicate::default());
        assert!(session.clusters().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_outcome_is_not_published() {
        let (_temp, mut session) = indexed_session(SAMPLE).await;
        let handle = session.start_filter(FilterPredicate::new()).unwrap();
        let id = handle.id();

        assert!(!session.publish_view(id, Outcome::Cancelled(vec![0])));
        assert_eq!(session.view().as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn test_open_rejects_non_log_file() {
        let mut temp = Builder::new().suffix(".txt").tempfile().unwrap();
        temp.write_all(b"hello\n").unwrap();
        let mut session = Session::default();

        let err = session.open(temp.path()).unwrap_err();
        assert!(matches!(err, LogsiftError::InvalidFile { .. }));
        assert!(session.file().is_none());
    }

    #[test]
    fn test_operations_require_state() {
        let mut session = Session::default();
        assert!(session.start_index().is_err());
        assert!(session.start_filter(FilterPredicate::new()).is_err());
        assert!(session.start_cluster(ClusterOptions::default()).is_err());
        assert!(session.begin_export().is_err());
        assert!(session.row_fields(0).is_none());
        assert!(session.timeline().is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_session() {
        let (_temp, mut session) = indexed_session(b"").await;
        assert_eq!(session.view_len(), 0);

        let handle = session
            .start_filter(FilterPredicate::new().with_levels([Level::Error]))
            .unwrap();
        let id = handle.id();
        let outcome = handle.wait().await.unwrap();
        assert!(session.publish_view(id, outcome));
        assert_eq!(session.view_len(), 0);

        let handle = session.start_cluster(ClusterOptions::default()).unwrap();
        let id = handle.id();
        let outcome = handle.wait().await.unwrap();
        assert!(session.publish_clusters(id, outcome));
        assert!(session.clusters().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_clears_derived_state() {
        let (temp, mut session) = indexed_session(SAMPLE).await;
        session.open(temp.path()).unwrap();

        assert!(session.index().is_none());
        assert_eq!(session.view_len(), 0);
        assert!(session.file().is_some());
    }
}
