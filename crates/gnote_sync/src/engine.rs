//! The Sync Engine: runs one drain → pull → write cycle at a time,
//! coalescing overlapping trigger requests into a single pending flag,
//! and centralizing retry/backoff and auth-refresh handling at the
//! boundary between the local queue and the remote.
//!
//! A cycle never sleeps internally for backoff — it reports the delay a
//! retried op should wait via [`SyncEvent::OpRetried`] and leaves the op
//! in the queue; the host is expected to re-trigger a cycle no sooner
//! than [`crate::config::RetryConfig::delay_for_attempt`] later. This
//! keeps the engine itself free of timers, which matters on a
//! single-threaded WASM host and makes the state machine trivial to
//! drive from a fake clock in tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;

use gnote_core::model::{Note, NoteId, QueuedOp, SyncShadow, SyncStatus as NoteSyncStatus};
use gnote_core::session::Session;
use gnote_core::store::ObjectStore;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::SyncEngineConfig;
use crate::error::{Result, SyncError};
use crate::events::{SyncEvent, SyncStats, SyncStatus};
use crate::index::IndexLayer;
use crate::reconciler::{self, HealthOutcome, HealthTracker, ReconcileOutcome};
use crate::remote::RemoteClient;

const NOTE_FILE_SUFFIX: &str = ".json";
const INDEX_FILE_NAME: &str = "index.json";

/// Drives the drain/pull/write state machine over a store and a remote.
pub struct SyncEngine<'s, 'r, S: ObjectStore, R: RemoteClient> {
    store: &'s S,
    remote: &'r R,
    index: IndexLayer<'r, R>,
    config: SyncEngineConfig,
    device_id: String,
    status: StdMutex<SyncStatus>,
    cycle_lock: AsyncMutex<()>,
    cycle_pending: StdMutex<bool>,
    next_cycle_id: AtomicU64,
    health: HealthTracker,
}

/// A single reconciled note, staged during Pulling and applied to the
/// object store during Writing.
struct PulledChange {
    note_id: NoteId,
    outcome: ReconcileOutcome,
    file_id: Option<gnote_core::model::RemoteFileId>,
}

impl<'s, 'r, S: ObjectStore, R: RemoteClient> SyncEngine<'s, 'r, S, R> {
    /// Build an engine over the given store and remote, with this
    /// device's stable id (fed straight into the reconciler's tie-break).
    pub fn new(store: &'s S, remote: &'r R, config: SyncEngineConfig, device_id: impl Into<String>) -> Self {
        let health = HealthTracker::new(config.reconcile_failure_threshold);
        SyncEngine {
            store,
            remote,
            index: IndexLayer::new(remote),
            config,
            device_id: device_id.into(),
            status: StdMutex::new(SyncStatus::Idle),
            cycle_lock: AsyncMutex::new(()),
            cycle_pending: StdMutex::new(false),
            next_cycle_id: AtomicU64::new(1),
            health,
        }
    }

    /// Current process-wide status, independent of any one cycle.
    pub fn status(&self) -> SyncStatus {
        *self.status.lock().unwrap()
    }

    fn set_status(&self, status: SyncStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Request a sync cycle. If one is already running, this request is
    /// coalesced into a pending flag and a second cycle runs immediately
    /// after the first finishes — this call still returns promptly with
    /// no events of its own.
    pub async fn trigger_cycle(&self, session: &Session) -> Result<Vec<SyncEvent>> {
        let mut all_events = Vec::new();
        loop {
            let guard = match self.cycle_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    *self.cycle_pending.lock().unwrap() = true;
                    return Ok(all_events);
                }
            };

            let cycle_id = self.next_cycle_id.fetch_add(1, Ordering::Relaxed);
            let span = tracing::info_span!("sync_cycle", cycle_id);
            let _enter = span.enter();

            let result = self.run_cycle(session).await;
            drop(guard);

            match result {
                Ok(mut events) => all_events.append(&mut events),
                Err(err) => return Err(err),
            }

            let mut pending = self.cycle_pending.lock().unwrap();
            if *pending {
                *pending = false;
                drop(pending);
                continue;
            }
            return Ok(all_events);
        }
    }

    async fn run_cycle(&self, session: &Session) -> Result<Vec<SyncEvent>> {
        let mut events = vec![SyncEvent::SyncStarted];
        let mut stats = SyncStats::default();

        // Hydrate the hint cache from the persisted `index.json` before
        // touching anything else this cycle — a host that rebuilds its
        // engine per call (as `gnote_wasm::GNoteApp` does) would
        // otherwise fall back to a full listing on every lookup, since
        // `IndexLayer::new` alone starts with an empty in-memory cache.
        if let Err(err) = self.index.load().await {
            events.push(SyncEvent::SyncError { code: error_code(&err), message: err.to_string() });
        }

        self.set_status(SyncStatus::Draining);
        match self.drain_queue(session, &mut stats, &mut events).await {
            Ok(()) => {}
            Err(err) => {
                self.set_status(SyncStatus::Idle);
                events.push(SyncEvent::SyncError { code: error_code(&err), message: err.to_string() });
                events.push(SyncEvent::SyncFinished { ok: false, stats });
                return Ok(events);
            }
        }

        self.set_status(SyncStatus::Pulling);
        let changes = match self.pull_and_reconcile(session, &mut stats, &mut events).await {
            Ok(changes) => changes,
            Err(err) => {
                self.set_status(SyncStatus::Idle);
                events.push(SyncEvent::SyncError { code: error_code(&err), message: err.to_string() });
                events.push(SyncEvent::SyncFinished { ok: false, stats });
                return Ok(events);
            }
        };

        self.set_status(SyncStatus::Writing);
        self.apply_pulled_changes(changes, &mut stats).await?;

        let mut settings = self.store.get_settings().await?;
        settings.last_sync_time = Some(now_ms());
        self.store.put_settings(settings).await?;

        self.set_status(SyncStatus::Idle);
        events.push(SyncEvent::SyncFinished { ok: true, stats });
        Ok(events)
    }

    /// Drain the mutation queue: push every queued op to the remote, coalescing retry
    /// bookkeeping and auth refresh along the way. A single `AuthExpired`
    /// is given one refresh attempt; failure there aborts the whole
    /// cycle and signs the session out.
    async fn drain_queue(&self, session: &Session, stats: &mut SyncStats, events: &mut Vec<SyncEvent>) -> Result<()> {
        let folder_id = self.index.ensure_folder().await?;
        let ops = self.store.list_queue().await?;

        for op in ops {
            match self.apply_op(&folder_id, &op).await {
                Ok(()) => {
                    stats.pushed += 1;
                }
                Err(SyncError::AuthExpired) => {
                    self.recover_from_auth_expired(session).await?;
                    match self.apply_op(&folder_id, &op).await {
                        Ok(()) => stats.pushed += 1,
                        Err(err) => self.handle_op_failure(op, err, stats, events).await?,
                    }
                }
                Err(err) => self.handle_op_failure(op, err, stats, events).await?,
            }
        }
        Ok(())
    }

    async fn recover_from_auth_expired(&self, session: &Session) -> Result<()> {
        match session.refresh_token().await {
            Ok(token) => {
                self.remote.set_access_token(&token.token);
                Ok(())
            }
            Err(message) => {
                session.sign_out();
                Err(SyncError::NetworkError(format!("auth refresh failed: {message}")))
            }
        }
    }

    async fn handle_op_failure(
        &self,
        mut op: QueuedOp,
        err: SyncError,
        stats: &mut SyncStats,
        events: &mut Vec<SyncEvent>,
    ) -> Result<()> {
        if err.is_retryable() {
            op.attempts += 1;
            op.last_error = Some(err.to_string());
            self.store.put_op(op.clone()).await?;
            events.push(SyncEvent::OpRetried { op_id: op.op_id, attempts: op.attempts });
        } else {
            self.store.remove_op(op.op_id).await?;
            stats.failed += 1;
            events.push(SyncEvent::SyncError { code: error_code(&err), message: err.to_string() });
        }
        Ok(())
    }

    async fn apply_op(&self, folder_id: &str, op: &QueuedOp) -> Result<()> {
        use gnote_core::model::OpKind;

        match op.kind {
            OpKind::Create => {
                let mut note = self.load_note_for_op(op)?;
                let payload = op
                    .payload
                    .as_deref()
                    .ok_or_else(|| SyncError::Corrupted("create op missing payload".into()))?;
                let file_id = self.remote.create_file(folder_id, &note_file_name(&note.id), payload).await?;
                note.remote_file_id = Some(file_id.clone());
                note.sync_status = NoteSyncStatus::Synced;
                self.store.put_note(note.clone()).await?;
                self.index.set_file_id(&note.id.0, file_id).await?;
                self.store
                    .put_shadow(&note.id.0, shadow_for(&note, content_hash(payload)))
                    .await?;
                self.store.remove_op(op.op_id).await
            }
            OpKind::Update => {
                let mut note = self.load_note_for_op(op)?;
                let payload = op
                    .payload
                    .as_deref()
                    .ok_or_else(|| SyncError::Corrupted("update op missing payload".into()))?;
                let file_id = self.resolve_file_id(&note).await?;
                let if_match = self.store.get_shadow(&note.id.0).await?.map(|s| s.content_hash);
                self.remote.update_file(&file_id, payload, if_match.as_deref()).await?;
                note.remote_file_id = Some(file_id);
                note.sync_status = NoteSyncStatus::Synced;
                self.store.put_note(note.clone()).await?;
                self.store
                    .put_shadow(&note.id.0, shadow_for(&note, content_hash(payload)))
                    .await?;
                self.store.remove_op(op.op_id).await
            }
            OpKind::Delete => {
                if let Some(file_id) = self.index.get_file_id(&op.entity_id.0) {
                    self.remote.delete_file(&file_id).await?;
                }
                self.index.remove_file_id(&op.entity_id.0).await?;
                self.store.remove_shadow(&op.entity_id.0).await?;
                self.store.remove_op(op.op_id).await
            }
        }
    }

    fn load_note_for_op(&self, op: &QueuedOp) -> Result<Note> {
        let payload = op
            .payload
            .as_deref()
            .ok_or_else(|| SyncError::Corrupted("op missing payload".into()))?;
        serde_json::from_slice(payload).map_err(|e| SyncError::Corrupted(e.to_string()))
    }

    async fn resolve_file_id(&self, note: &Note) -> Result<gnote_core::model::RemoteFileId> {
        if let Some(id) = &note.remote_file_id {
            return Ok(id.clone());
        }
        self.index
            .get_file_id(&note.id.0)
            .ok_or(SyncError::NotFound)
    }

    /// List the remote folder, reconcile every file against local state,
    /// and stage the outcomes for [`Self::apply_pulled_changes`] without
    /// touching the store yet.
    async fn pull_and_reconcile(
        &self,
        _session: &Session,
        stats: &mut SyncStats,
        events: &mut Vec<SyncEvent>,
    ) -> Result<Vec<PulledChange>> {
        let folder_id = self.index.ensure_folder().await?;
        let query = format!("'{folder_id}' in parents and trashed = false");
        let files = self.remote.list_by_query(&query).await?;

        let mut changes = Vec::new();
        for file in files {
            if file.name == INDEX_FILE_NAME {
                continue;
            }
            let probe_id = note_id_from_file_name(&file.name);

            let bytes = match self.remote.download(&file.file_id).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    events.push(SyncEvent::SyncError { code: error_code(&err), message: err.to_string() });
                    self.escalate_on_repeated_failure(&probe_id, events).await?;
                    continue;
                }
            };

            let remote_note: Note = match serde_json::from_slice(&bytes) {
                Ok(note) => note,
                Err(_) => {
                    let raw: serde_json::Value = match serde_json::from_slice(&bytes) {
                        Ok(v) => v,
                        Err(_) => {
                            log::warn!("skipping unparseable remote file {}", file.file_id.0);
                            self.escalate_on_repeated_failure(&probe_id, events).await?;
                            continue;
                        }
                    };
                    if reconciler::is_collection_shaped(&raw) {
                        log::warn!("skipping legacy collection file {}", file.file_id.0);
                    } else {
                        log::warn!("skipping corrupted remote note file {}", file.file_id.0);
                        self.escalate_on_repeated_failure(&probe_id, events).await?;
                    }
                    continue;
                }
            };

            let note_id = remote_note.id.clone();
            self.health.record_success(&note_id.0);
            let local = self.store.get_note(&note_id.0).await?;
            let shadow = self.store.get_shadow(&note_id.0).await?;
            let tombstone_deleted_at = self.store.get_tombstone(&note_id.0).await?.map(|t| t.deleted_at);

            let outcome =
                reconciler::reconcile(local.as_ref(), Some(&remote_note), shadow.as_ref(), tombstone_deleted_at);
            changes.push(PulledChange { note_id, outcome, file_id: Some(file.file_id) });
        }

        let seen: HashSet<String> = changes.iter().map(|c| c.note_id.0.clone()).collect();
        self.reconcile_locally_only_notes(&seen, &mut changes).await?;

        stats.pulled = changes
            .iter()
            .filter(|c| matches!(c.outcome, ReconcileOutcome::PullInsert(_) | ReconcileOutcome::Pull(_)))
            .count();
        stats.conflicts = changes.iter().filter(|c| matches!(c.outcome, ReconcileOutcome::Conflict { .. })).count();
        Ok(changes)
    }

    /// Every note the remote listing didn't surface this cycle but that
    /// carries a shadow (it was synced before) needs reconciling against
    /// "no remote": either the remote copy was deleted elsewhere
    /// (propagate the delete locally) or the local copy has raced ahead
    /// of the shadow since the remote file vanished (resurrect by
    /// re-pushing). Notes with no shadow yet are newly created locally
    /// and already handled by the drain phase, so they're skipped here.
    async fn reconcile_locally_only_notes(
        &self,
        seen_remotely: &HashSet<String>,
        changes: &mut Vec<PulledChange>,
    ) -> Result<()> {
        for note in self.store.list_notes().await? {
            if seen_remotely.contains(&note.id.0) {
                continue;
            }
            let shadow = self.store.get_shadow(&note.id.0).await?;
            if shadow.is_none() {
                continue;
            }
            let tombstone_deleted_at = self.store.get_tombstone(&note.id.0).await?.map(|t| t.deleted_at);
            let outcome = reconciler::reconcile(Some(&note), None, shadow.as_ref(), tombstone_deleted_at);
            if matches!(outcome, ReconcileOutcome::NoOp) {
                continue;
            }
            changes.push(PulledChange { note_id: note.id.clone(), outcome, file_id: None });
        }
        Ok(())
    }

    /// Record a reconcile failure against the health tracker; once it
    /// escalates, discard the note's shadow so the next cycle re-pulls
    /// it from scratch instead of repeating the same failure forever.
    async fn escalate_on_repeated_failure(&self, note_id: &str, events: &mut Vec<SyncEvent>) -> Result<()> {
        if self.health.record_failure(note_id) == HealthOutcome::Escalated {
            self.store.remove_shadow(note_id).await?;
            events.push(SyncEvent::NoteHealthEscalated { note_id: note_id.to_string() });
        }
        Ok(())
    }

    /// Commit every staged reconcile outcome to the object store. Runs
    /// with no intervening remote call between entries other than the
    /// occasional follow-up push a conflict resolution requires, so it
    /// behaves as one batched write phase even though the object store
    /// itself has no multi-row transaction primitive.
    async fn apply_pulled_changes(&self, changes: Vec<PulledChange>, stats: &mut SyncStats) -> Result<()> {
        let mut seen: HashSet<String> = HashSet::new();

        for change in changes {
            seen.insert(change.note_id.0.clone());
            match change.outcome {
                ReconcileOutcome::PullInsert(mut note) => {
                    note.sync_status = NoteSyncStatus::Synced;
                    let shadow = shadow_for(&note, String::new());
                    self.store.put_note(note).await?;
                    self.store.put_shadow(&change.note_id.0, shadow).await?;
                    if let Some(file_id) = change.file_id {
                        self.index.set_file_id(&change.note_id.0, file_id).await?;
                    }
                }
                ReconcileOutcome::Pull(mut note) => {
                    note.sync_status = NoteSyncStatus::Synced;
                    let shadow = shadow_for(&note, String::new());
                    self.store.put_note(note).await?;
                    self.store.put_shadow(&change.note_id.0, shadow).await?;
                }
                ReconcileOutcome::PushDeleteRemote => {
                    if let Some(file_id) = &change.file_id {
                        self.remote.delete_file(file_id).await?;
                    }
                    self.index.remove_file_id(&change.note_id.0).await?;
                    self.store.remove_shadow(&change.note_id.0).await?;
                    self.store.remove_tombstone(&change.note_id.0).await?;
                }
                ReconcileOutcome::Conflict { mut winner, loser: _ } => {
                    winner.sync_status = NoteSyncStatus::Synced;
                    let local_won = winner.device_id == self.device_id;
                    let shadow = shadow_for(&winner, String::new());
                    self.store.put_note(winner.clone()).await?;
                    self.store.put_shadow(&change.note_id.0, shadow).await?;
                    if local_won {
                        if let (Some(file_id), Ok(payload)) =
                            (change.file_id.as_ref(), serde_json::to_vec(&winner))
                        {
                            self.remote.update_file(file_id, &payload, None).await?;
                        }
                    }
                }
                ReconcileOutcome::PushDeleteLocal => {
                    // The remote copy is gone and the local copy hasn't
                    // raced ahead of the shadow: propagate the delete
                    // locally rather than resurrecting it.
                    self.store.remove_note(&change.note_id.0).await?;
                    self.store.remove_shadow(&change.note_id.0).await?;
                }
                ReconcileOutcome::PushCreate(mut note) => {
                    // Resurrection: the remote file vanished but the
                    // local note has moved strictly ahead of the shadow
                    // since then. Re-upload it as a brand-new file.
                    let payload = serde_json::to_vec(&note).map_err(|e| SyncError::Corrupted(e.to_string()))?;
                    let folder_id = self.index.ensure_folder().await?;
                    let file_id = self.remote.create_file(&folder_id, &note_file_name(&note.id), &payload).await?;
                    note.remote_file_id = Some(file_id.clone());
                    note.sync_status = NoteSyncStatus::Synced;
                    self.index.set_file_id(&change.note_id.0, file_id).await?;
                    self.store.put_shadow(&change.note_id.0, shadow_for(&note, content_hash(&payload))).await?;
                    self.store.put_note(note).await?;
                }
                ReconcileOutcome::NoOp => {}
            }
        }
        let _ = stats;
        Ok(())
    }
}

fn note_file_name(id: &NoteId) -> String {
    format!("{}{NOTE_FILE_SUFFIX}", id.0)
}

/// Best-effort note id recovered from a remote file name, for health
/// tracking when the file's contents can't be parsed well enough to read
/// `id` out of the body itself.
fn note_id_from_file_name(name: &str) -> String {
    name.strip_suffix(NOTE_FILE_SUFFIX).unwrap_or(name).to_string()
}

fn shadow_for(note: &Note, content_hash: String) -> SyncShadow {
    SyncShadow { version: note.version, remote_updated_at: note.updated_at, content_hash }
}

fn content_hash(payload: &[u8]) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    payload.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn error_code(err: &SyncError) -> String {
    match err {
        SyncError::AuthExpired => "authExpired",
        SyncError::PermissionDenied => "permissionDenied",
        SyncError::QuotaExceeded => "quotaExceeded",
        SyncError::NotFound => "notFound",
        SyncError::PreconditionFailed => "preconditionFailed",
        SyncError::Corrupted(_) => "corrupted",
        SyncError::NetworkError(_) => "networkError",
        SyncError::Reconcile(_) => "reconcile",
        SyncError::Migration(_) => "migration",
        SyncError::Store(_) => "store",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnote_core::memory_store::MemoryObjectStore;
    use gnote_core::model::{EntityType, OpKind, QueuedOp};
    use gnote_core::note_core::NoteStateCore;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdSyncMutex;

    struct FakeRemote {
        folder_id: String,
        files: StdSyncMutex<StdHashMap<String, (String, Vec<u8>)>>,
        next_id: StdSyncMutex<u64>,
    }

    impl FakeRemote {
        fn new() -> Self {
            FakeRemote {
                folder_id: "folder1".into(),
                files: StdSyncMutex::new(StdHashMap::new()),
                next_id: StdSyncMutex::new(0),
            }
        }
    }

    impl RemoteClient for FakeRemote {
        async fn list_by_query(&self, query: &str) -> Result<Vec<crate::remote::RemoteMetadata>> {
            let files = self.files.lock().unwrap();
            Ok(files
                .iter()
                .filter(|(_, (name, _))| !(query.contains(INDEX_FILE_NAME) && *name != INDEX_FILE_NAME))
                .map(|(id, (name, _))| crate::remote::RemoteMetadata {
                    file_id: gnote_core::model::RemoteFileId(id.clone()),
                    name: name.clone(),
                    modified_time: 0,
                    etag: "etag".into(),
                })
                .collect())
        }

        async fn get_metadata(&self, file_id: &gnote_core::model::RemoteFileId) -> Result<crate::remote::RemoteMetadata> {
            let files = self.files.lock().unwrap();
            let (name, _) = files.get(&file_id.0).ok_or(SyncError::NotFound)?;
            Ok(crate::remote::RemoteMetadata { file_id: file_id.clone(), name: name.clone(), modified_time: 0, etag: "etag".into() })
        }

        async fn download(&self, file_id: &gnote_core::model::RemoteFileId) -> Result<Vec<u8>> {
            let files = self.files.lock().unwrap();
            files.get(&file_id.0).map(|(_, c)| c.clone()).ok_or(SyncError::NotFound)
        }

        async fn create_file(&self, _parent: &str, name: &str, content: &[u8]) -> Result<gnote_core::model::RemoteFileId> {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            let id = format!("file{}", *next_id);
            self.files.lock().unwrap().insert(id.clone(), (name.to_string(), content.to_vec()));
            Ok(gnote_core::model::RemoteFileId(id))
        }

        async fn update_file(&self, file_id: &gnote_core::model::RemoteFileId, content: &[u8], _if_match: Option<&str>) -> Result<()> {
            let mut files = self.files.lock().unwrap();
            let entry = files.get_mut(&file_id.0).ok_or(SyncError::NotFound)?;
            entry.1 = content.to_vec();
            Ok(())
        }

        async fn delete_file(&self, file_id: &gnote_core::model::RemoteFileId) -> Result<()> {
            self.files.lock().unwrap().remove(&file_id.0);
            Ok(())
        }

        async fn create_folder(&self, _name: &str) -> Result<String> {
            Ok(self.folder_id.clone())
        }

        fn set_access_token(&self, _token: &str) {}
    }

    #[tokio::test]
    async fn push_create_then_pull_round_trips_through_remote() {
        let store = MemoryObjectStore::new();
        let remote = FakeRemote::new();
        let core = NoteStateCore::new(&store, Default::default(), "device-1");
        core.add_note("n1", "Hello", 1_000).await.unwrap();

        let engine = SyncEngine::new(&store, &remote, SyncEngineConfig::default(), "device-1");
        let session = Session::new(None);
        let events = engine.trigger_cycle(&session).await.unwrap();
        assert!(events.iter().any(|e| matches!(e, SyncEvent::SyncFinished { ok: true, .. })));

        let note = store.get_note("n1").await.unwrap().unwrap();
        assert_eq!(note.sync_status, NoteSyncStatus::Synced);
        assert!(note.remote_file_id.is_some());
        assert!(store.list_queue().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overlapping_trigger_coalesces_into_single_pending_cycle() {
        let store = MemoryObjectStore::new();
        let remote = FakeRemote::new();
        let engine = SyncEngine::new(&store, &remote, SyncEngineConfig::default(), "device-1");
        let session = Session::new(None);

        // No concurrency harness here, but a reentrant call within the
        // same task after the lock is already released must still just
        // run a normal, empty cycle rather than erroring.
        let first = engine.trigger_cycle(&session).await.unwrap();
        let second = engine.trigger_cycle(&session).await.unwrap();
        assert!(first.iter().any(|e| matches!(e, SyncEvent::SyncFinished { .. })));
        assert!(second.iter().any(|e| matches!(e, SyncEvent::SyncFinished { .. })));
    }

    #[tokio::test]
    async fn remote_only_note_is_pulled_in_as_synced() {
        let store = MemoryObjectStore::new();
        let remote = FakeRemote::new();
        let remote_note = Note::new("n2", "From the cloud", 2_000, "device-2");
        let payload = serde_json::to_vec(&remote_note).unwrap();
        remote.create_file("folder1", "n2.json", &payload).await.unwrap();

        let engine = SyncEngine::new(&store, &remote, SyncEngineConfig::default(), "device-1");
        let session = Session::new(None);
        engine.trigger_cycle(&session).await.unwrap();

        let pulled = store.get_note("n2").await.unwrap().unwrap();
        assert_eq!(pulled.sync_status, NoteSyncStatus::Synced);
        assert!(store.get_shadow("n2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn tombstoned_note_with_older_remote_copy_deletes_remote() {
        let store = MemoryObjectStore::new();
        let remote = FakeRemote::new();
        let mut remote_note = Note::new("n3", "stale", 1_000, "device-2");
        remote_note.version = 3;
        let payload = serde_json::to_vec(&remote_note).unwrap();
        let file_id = remote.create_file("folder1", "n3.json", &payload).await.unwrap();

        store
            .put_shadow("n3", SyncShadow { version: 3, remote_updated_at: 1_000, content_hash: String::new() })
            .await
            .unwrap();
        store
            .put_tombstone(gnote_core::model::Tombstone {
                entity_id: "n3".into(),
                entity_type: EntityType::Note,
                deleted_at: 1_500,
            })
            .await
            .unwrap();

        let engine = SyncEngine::new(&store, &remote, SyncEngineConfig::default(), "device-1");
        let session = Session::new(None);
        engine.trigger_cycle(&session).await.unwrap();

        assert!(remote.files.lock().unwrap().get(&file_id.0).is_none());
        assert!(store.get_tombstone("n3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_with_no_resolvable_file_id_drops_the_op_as_failed() {
        let store = MemoryObjectStore::new();
        let remote = FakeRemote::new();
        // An update op for an entity that was never created remotely and
        // has no index hint: `resolve_file_id` fails with `NotFound`,
        // which is non-retryable, so the op is dropped rather than retried.
        store
            .enqueue_op(QueuedOp {
                op_id: 0,
                kind: OpKind::Update,
                entity_type: EntityType::Note,
                entity_id: "ghost".into(),
                payload: Some(serde_json::to_vec(&Note::new("ghost", "t", 1_000, "device-1")).unwrap()),
                enqueued_at: 1_000,
                attempts: 0,
                last_error: None,
            })
            .await
            .unwrap();

        let engine = SyncEngine::new(&store, &remote, SyncEngineConfig::default(), "device-1");
        let session = Session::new(None);
        let events = engine.trigger_cycle(&session).await.unwrap();

        assert!(events.iter().any(|e| matches!(e, SyncEvent::SyncError { .. })));
        assert!(store.list_queue().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_reconcile_failures_escalate_and_discard_shadow() {
        let store = MemoryObjectStore::new();
        let remote = FakeRemote::new();
        remote.create_file("folder1", "broken.json", b"not json").await.unwrap();
        store
            .put_shadow("broken", SyncShadow { version: 1, remote_updated_at: 1, content_hash: "x".into() })
            .await
            .unwrap();

        let config = SyncEngineConfig { reconcile_failure_threshold: 2, ..Default::default() };
        let engine = SyncEngine::new(&store, &remote, config, "device-1");
        let session = Session::new(None);

        let first = engine.trigger_cycle(&session).await.unwrap();
        assert!(!first.iter().any(|e| matches!(e, SyncEvent::NoteHealthEscalated { .. })));
        assert!(store.get_shadow("broken").await.unwrap().is_some());

        let second = engine.trigger_cycle(&session).await.unwrap();
        assert!(second
            .iter()
            .any(|e| matches!(e, SyncEvent::NoteHealthEscalated { note_id } if note_id == "broken")));
        assert!(store.get_shadow("broken").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn note_deleted_remotely_is_removed_locally_on_pull() {
        let store = MemoryObjectStore::new();
        let remote = FakeRemote::new();
        let mut note = Note::new("n4", "gone from the cloud", 1_000, "device-1");
        note.version = 3;
        note.sync_status = NoteSyncStatus::Synced;
        store.put_note(note).await.unwrap();
        store
            .put_shadow("n4", SyncShadow { version: 3, remote_updated_at: 1_000, content_hash: "x".into() })
            .await
            .unwrap();

        let engine = SyncEngine::new(&store, &remote, SyncEngineConfig::default(), "device-1");
        let session = Session::new(None);
        engine.trigger_cycle(&session).await.unwrap();

        assert!(store.get_note("n4").await.unwrap().is_none());
        assert!(store.get_shadow("n4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn note_edited_past_shadow_after_remote_deletion_resurrects() {
        let store = MemoryObjectStore::new();
        let remote = FakeRemote::new();
        let mut note = Note::new("n5", "edited after remote vanished", 2_000, "device-1");
        note.version = 4;
        note.sync_status = NoteSyncStatus::Pending;
        store.put_note(note).await.unwrap();
        store
            .put_shadow("n5", SyncShadow { version: 3, remote_updated_at: 1_000, content_hash: "x".into() })
            .await
            .unwrap();

        let engine = SyncEngine::new(&store, &remote, SyncEngineConfig::default(), "device-1");
        let session = Session::new(None);
        engine.trigger_cycle(&session).await.unwrap();

        let resurrected = store.get_note("n5").await.unwrap().unwrap();
        assert_eq!(resurrected.sync_status, NoteSyncStatus::Synced);
        assert!(resurrected.remote_file_id.is_some());
        assert!(remote.files.lock().unwrap().values().any(|(name, _)| name == "n5.json"));
    }
}
