//! # Review Orchestration Module
//!
//! Wires the engine to the session store: loading with abandonment, saving
//! with snapshot commits, and batch export fetches.
//!
//! ## Key Components
//! - `LoadTracker`: Generation counter that lets a navigation discard in-flight loads
//! - `save_edits`: Snapshot the diff, save it, commit exactly that snapshot
//! - `fetch_and_export`: Parallel per-session fetch, one export file per session
//!
//! ## Ownership
//! There is no ambient "current session". Callers own the `Session` and
//! `EditState` and pass them into every call. A save that is in flight is
//! never cancelled; its result is always awaited and settled.

use crate::annotation::{EditState, PendingSave};
use crate::error::{BatchError, StoreError};
use crate::export::{export_session, ExportFile};
use crate::sample::{normalize, RawSession, Session};
use crate::store::SessionStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Issued when a load starts; only the newest ticket is accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    session_id: String,
}

impl LoadTicket {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Tracks which load the operator is still waiting for.
///
/// Starting a new load or navigating away bumps the generation, so results
/// of older loads are discarded when they finally arrive.
#[derive(Debug, Clone, Default)]
pub struct LoadTracker {
    generation: Arc<AtomicU64>,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, session_id: &str) -> LoadTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        LoadTicket {
            generation,
            session_id: session_id.to_string(),
        }
    }

    /// Abandon every outstanding load
    pub fn navigate_away(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    Loaded(Session),
    /// The operator moved on before the load finished
    Discarded,
}

/// Settle a load: normalize if the ticket is still current, otherwise drop it
pub fn finish_load(
    tracker: &LoadTracker,
    ticket: LoadTicket,
    result: Result<RawSession, StoreError>,
) -> Result<LoadResult, StoreError> {
    if !tracker.is_current(&ticket) {
        log::info!("Discarding stale load of session {}", ticket.session_id);
        return Ok(LoadResult::Discarded);
    }

    let raw = result?;
    let session = normalize(&raw);
    log::info!("Loaded session {} ({} samples)", session.id, session.len());
    Ok(LoadResult::Loaded(session))
}

pub async fn load_session<S>(
    store: &S,
    tracker: &LoadTracker,
    session_id: &str,
) -> Result<LoadResult, StoreError>
where
    S: SessionStore + ?Sized,
{
    let ticket = tracker.begin(session_id);
    let result = store.load(session_id).await;
    finish_load(tracker, ticket, result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Informational: the working copy matches the baseline
    NothingToSave,
    Saved { changes: usize },
}

/// Send a snapshot to the store without holding on to the edit state
///
/// Lets the operator keep toggling while the call is in flight; settle the
/// result afterwards with `EditState::finish_save`.
pub async fn submit<S>(store: &S, session_id: &str, pending: &PendingSave) -> Result<(), StoreError>
where
    S: SessionStore + ?Sized,
{
    log::info!(
        "Saving {} label changes for session {}",
        pending.changes().len(),
        session_id
    );
    store.save(session_id, &pending.updates()).await
}

/// Save the current diff and commit it on success
///
/// On failure the working copy and its pending diff are left exactly as they
/// were so the operator can retry.
pub async fn save_edits<S>(
    store: &S,
    session_id: &str,
    edit: &mut EditState,
) -> Result<SaveOutcome, StoreError>
where
    S: SessionStore + ?Sized,
{
    let pending = edit.begin_save();
    if pending.is_empty() {
        log::info!("Session {}: no changes to save", session_id);
        return Ok(SaveOutcome::NothingToSave);
    }

    let result = submit(store, session_id, &pending).await;
    match edit.finish_save(pending, result) {
        Ok(changes) => {
            log::info!("Session {}: committed {} label changes", session_id, changes);
            Ok(SaveOutcome::Saved { changes })
        }
        Err(e) => {
            if e.is_retryable() {
                log::warn!("Session {}: save failed, edits kept for retry: {}", session_id, e);
            } else {
                log::error!("Session {}: save rejected: {}", session_id, e);
            }
            Err(e)
        }
    }
}

/// Outcome of a batch export, in request order
#[derive(Debug, Default)]
pub struct BatchExport {
    pub files: Vec<ExportFile>,
    /// Sessions that loaded but had no samples
    pub empty: Vec<String>,
    pub failures: Vec<(String, BatchError)>,
}

/// Fetch sessions in parallel (at most `concurrency` at once) and export each
pub async fn fetch_and_export(
    store: Arc<dyn SessionStore>,
    session_ids: &[String],
    concurrency: usize,
    delimiter: u8,
) -> BatchExport {
    let limit = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (position, session_id) in session_ids.iter().cloned().enumerate() {
        let store = store.clone();
        let limit = limit.clone();
        tasks.spawn(async move {
            let _permit = limit.acquire_owned().await;
            let result = store.load(&session_id).await;
            (position, result)
        });
    }

    // A task that panicked leaves its slot empty
    let mut fetched: Vec<Option<Result<RawSession, StoreError>>> =
        session_ids.iter().map(|_| None).collect();
    let mut task_errors = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((position, result)) => fetched[position] = Some(result),
            Err(e) => {
                log::error!("Export fetch task failed: {}", e);
                task_errors.push(e.to_string());
            }
        }
    }
    let task_failure = task_errors.join("; ");

    let mut batch = BatchExport::default();
    for (session_id, result) in session_ids.iter().zip(fetched) {
        let exported = match result {
            Some(result) => result.map_err(BatchError::Fetch),
            None => Err(BatchError::TaskFailed(task_failure.clone())),
        }
        .and_then(|raw| export_session(&normalize(&raw), delimiter).map_err(BatchError::Export));

        match exported {
            Ok(Some(file)) => batch.files.push(file),
            Ok(None) => batch.empty.push(session_id.clone()),
            Err(e) => {
                log::warn!("Skipping export of session {}: {}", session_id, e);
                batch.failures.push((session_id.clone(), e));
            }
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnomalyUpdate;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::time::Duration;

    /// Loads from an inner store but panics for one session id
    struct PanicOn {
        inner: MemoryStore,
        session_id: &'static str,
    }

    #[async_trait]
    impl SessionStore for PanicOn {
        async fn load(&self, session_id: &str) -> Result<RawSession, StoreError> {
            if session_id == self.session_id {
                panic!("store crashed loading {}", session_id);
            }
            self.inner.load(session_id).await
        }

        async fn save(&self, session_id: &str, updates: &[AnomalyUpdate]) -> Result<(), StoreError> {
            self.inner.save(session_id, updates).await
        }

        async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
            self.inner.delete(session_id).await
        }

        async fn list(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list().await
        }
    }

    fn raw(id: &str, len: i64) -> RawSession {
        let samples: Vec<Value> = (0..len)
            .map(|i| json!({"timestamp": 1_700_000_000 + i, "heart_rate": 70}))
            .collect();
        let mut metadata = Map::new();
        metadata.insert("subject_id".into(), json!(id));
        RawSession {
            id: id.to_string(),
            metadata,
            samples,
        }
    }

    fn loaded(result: LoadResult) -> Session {
        match result {
            LoadResult::Loaded(session) => session,
            LoadResult::Discarded => panic!("load was discarded"),
        }
    }

    #[tokio::test]
    async fn test_load_session() {
        let store = MemoryStore::new();
        store.insert(raw("s1", 5));
        let tracker = LoadTracker::new();

        let session = loaded(load_session(&store, &tracker, "s1").await.unwrap());
        assert_eq!(session.len(), 5);

        assert!(matches!(
            load_session(&store, &tracker, "missing").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_stale_ticket_is_discarded() {
        let tracker = LoadTracker::new();
        let first = tracker.begin("s1");
        let second = tracker.begin("s2");

        assert_eq!(
            finish_load(&tracker, first, Ok(raw("s1", 3))).unwrap(),
            LoadResult::Discarded
        );
        assert!(matches!(
            finish_load(&tracker, second, Ok(raw("s2", 3))).unwrap(),
            LoadResult::Loaded(_)
        ));
    }

    #[tokio::test]
    async fn test_navigate_away_discards_in_flight_load() {
        let store = Arc::new(MemoryStore::new());
        store.insert(raw("s1", 5));
        store.set_load_delay(Some(Duration::from_millis(200)));
        let tracker = LoadTracker::new();

        let handle = {
            let store = store.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move { load_session(store.as_ref(), &tracker, "s1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        tracker.navigate_away();

        assert_eq!(handle.await.unwrap().unwrap(), LoadResult::Discarded);
    }

    #[tokio::test]
    async fn test_save_nothing_to_save() {
        let store = MemoryStore::new();
        store.insert(raw("s1", 5));
        let session = normalize(&raw("s1", 5));
        let mut edit = EditState::new(&session.samples);

        assert_eq!(
            save_edits(&store, "s1", &mut edit).await.unwrap(),
            SaveOutcome::NothingToSave
        );
        assert!(store.save_calls().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_failed_save_keeps_edits() {
        let store = MemoryStore::new();
        store.insert(raw("s1", 10));
        let session = normalize(&raw("s1", 10));
        let mut edit = EditState::new(&session.samples);

        edit.toggle(7);
        assert_eq!(
            save_edits(&store, "s1", &mut edit).await.unwrap(),
            SaveOutcome::Saved { changes: 1 }
        );
        assert_eq!(edit.baseline()[7].anomaly, 1);
        assert!(edit.compute_diff().is_empty());

        edit.toggle(7);
        store.fail_next_saves(1);
        let err = save_edits(&store, "s1", &mut edit).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(edit.working()[7].anomaly, 0);
        let diff = edit.compute_diff();
        assert_eq!(diff.len(), 1);
        assert_eq!((diff[0].sequence_index, diff[0].from, diff[0].to), (7, 1, 0));

        // Retry succeeds with the same edits
        save_edits(&store, "s1", &mut edit).await.unwrap();
        assert_eq!(store.get("s1").unwrap().samples[7]["anomaly"], json!(0));
    }

    #[tokio::test]
    async fn test_submit_allows_toggles_in_flight() {
        let store = MemoryStore::new();
        store.insert(raw("s1", 10));
        let session = normalize(&raw("s1", 10));
        let mut edit = EditState::new(&session.samples);

        edit.toggle(1);
        let pending = edit.begin_save();
        let in_flight = submit(&store, "s1", &pending);
        edit.toggle(2);
        let result = in_flight.await;

        assert_eq!(edit.finish_save(pending, result).unwrap(), 1);
        let diff = edit.compute_diff();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].sequence_index, 2);
    }

    #[tokio::test]
    async fn test_fetch_and_export() {
        let store = MemoryStore::new();
        store.insert(raw("a", 3));
        store.insert(raw("b", 0));
        store.insert(raw("c", 4));
        let store: Arc<dyn SessionStore> = Arc::new(store);

        let ids: Vec<String> = ["c", "missing", "a", "b"].iter().map(|s| s.to_string()).collect();
        let batch = fetch_and_export(store, &ids, 2, b',').await;

        assert_eq!(batch.files.len(), 2);
        assert!(batch.files[0].file_name.starts_with("c_"));
        assert!(batch.files[1].file_name.starts_with("a_"));
        assert_eq!(batch.empty, vec!["b".to_string()]);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].0, "missing");
    }

    #[tokio::test]
    async fn test_fetch_and_export_reports_crashed_task() {
        let inner = MemoryStore::new();
        inner.insert(raw("a", 3));
        inner.insert(raw("boom", 3));
        inner.insert(raw("c", 2));
        let store: Arc<dyn SessionStore> = Arc::new(PanicOn {
            inner,
            session_id: "boom",
        });

        let ids: Vec<String> = ["a", "boom", "c"].iter().map(|s| s.to_string()).collect();
        let batch = fetch_and_export(store, &ids, 3, b',').await;

        assert_eq!(batch.files.len(), 2);
        assert!(batch.empty.is_empty());
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].0, "boom");
        assert!(matches!(batch.failures[0].1, BatchError::TaskFailed(_)));
    }

    #[tokio::test]
    async fn test_conflicting_labels_on_shared_timestamp_are_not_saved() {
        let mut source = raw("s1", 0);
        source.samples = vec![
            json!({"timestamp": 100, "anomaly": 0}),
            json!({"timestamp": 100, "anomaly": 1}),
        ];
        let store = MemoryStore::new();
        store.insert(source.clone());
        let session = normalize(&source);
        let mut edit = EditState::new(&session.samples);

        edit.toggle(0);
        edit.toggle(1);
        let err = save_edits(&store, "s1", &mut edit).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        assert_eq!(edit.working()[0].anomaly, 1);
        assert_eq!(edit.working()[1].anomaly, 0);
        assert_eq!(edit.compute_diff().len(), 2);
        let stored = store.get("s1").unwrap();
        assert_eq!(stored.samples[0]["anomaly"], json!(0));
        assert_eq!(stored.samples[1]["anomaly"], json!(1));
    }
}
