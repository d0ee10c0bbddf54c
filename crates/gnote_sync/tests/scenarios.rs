//! End-to-end scenario tests wiring the object store, mutation queue,
//! note state core and sync engine together against a fake remote.
//!
//! A top-level `tests/*.rs`, as these exercise several modules working
//! together rather than one in isolation.

use std::collections::HashMap as StdHashMap;
use std::sync::Mutex as StdSyncMutex;

use gnote_core::memory_store::MemoryObjectStore;
use gnote_core::model::{OpKind, RemoteFileId, SyncStatus as NoteSyncStatus};
use gnote_core::note_core::NoteStateCore;
use gnote_core::session::{BoxFuture, RefreshTokenCallback, Session, TokenRefresh};
use gnote_core::store::ObjectStore;
use gnote_sync::config::SyncEngineConfig;
use gnote_sync::engine::SyncEngine;
use gnote_sync::error::{Result, SyncError};
use gnote_sync::events::SyncEvent;
use gnote_sync::remote::{RemoteClient, RemoteMetadata};

/// An in-memory Drive stand-in. `fail_updates_until` lets a test force
/// the first N `update_file` calls to return `AuthExpired` before
/// succeeding, to drive the auth-refresh-during-drain path.
struct FakeRemote {
    folder_id: String,
    files: StdSyncMutex<StdHashMap<String, (String, Vec<u8>)>>,
    next_id: StdSyncMutex<u64>,
    fail_updates_until: StdSyncMutex<u32>,
}

impl FakeRemote {
    fn new() -> Self {
        FakeRemote {
            folder_id: "folder1".into(),
            files: StdSyncMutex::new(StdHashMap::new()),
            next_id: StdSyncMutex::new(0),
            fail_updates_until: StdSyncMutex::new(0),
        }
    }

    fn fail_next_updates(&self, count: u32) {
        *self.fail_updates_until.lock().unwrap() = count;
    }
}

impl RemoteClient for FakeRemote {
    async fn list_by_query(&self, _query: &str) -> Result<Vec<RemoteMetadata>> {
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .map(|(id, (name, _))| RemoteMetadata { file_id: RemoteFileId(id.clone()), name: name.clone(), modified_time: 0, etag: "etag".into() })
            .collect())
    }

    async fn get_metadata(&self, file_id: &RemoteFileId) -> Result<RemoteMetadata> {
        let files = self.files.lock().unwrap();
        let (name, _) = files.get(&file_id.0).ok_or(SyncError::NotFound)?;
        Ok(RemoteMetadata { file_id: file_id.clone(), name: name.clone(), modified_time: 0, etag: "etag".into() })
    }

    async fn download(&self, file_id: &RemoteFileId) -> Result<Vec<u8>> {
        let files = self.files.lock().unwrap();
        files.get(&file_id.0).map(|(_, c)| c.clone()).ok_or(SyncError::NotFound)
    }

    async fn create_file(&self, _parent: &str, name: &str, content: &[u8]) -> Result<RemoteFileId> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = format!("file{}", *next_id);
        self.files.lock().unwrap().insert(id.clone(), (name.to_string(), content.to_vec()));
        Ok(RemoteFileId(id))
    }

    async fn update_file(&self, file_id: &RemoteFileId, content: &[u8], _if_match: Option<&str>) -> Result<()> {
        let mut remaining = self.fail_updates_until.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(SyncError::AuthExpired);
        }
        drop(remaining);
        let mut files = self.files.lock().unwrap();
        let entry = files.get_mut(&file_id.0).ok_or(SyncError::NotFound)?;
        entry.1 = content.to_vec();
        Ok(())
    }

    async fn delete_file(&self, file_id: &RemoteFileId) -> Result<()> {
        self.files.lock().unwrap().remove(&file_id.0);
        Ok(())
    }

    async fn create_folder(&self, _name: &str) -> Result<String> {
        Ok(self.folder_id.clone())
    }

    fn set_access_token(&self, _token: &str) {}
}

struct AlwaysRefreshes;
impl RefreshTokenCallback for AlwaysRefreshes {
    fn refresh(&self, _user_id: &str) -> BoxFuture<'static, std::result::Result<TokenRefresh, String>> {
        Box::pin(async { Ok(TokenRefresh { access_token: "new-token".into(), expires_in_sec: 3_600 }) })
    }
}

struct AlwaysFailsRefresh;
impl RefreshTokenCallback for AlwaysFailsRefresh {
    fn refresh(&self, _user_id: &str) -> BoxFuture<'static, std::result::Result<TokenRefresh, String>> {
        Box::pin(async { Err("refresh denied".to_string()) })
    }
}

#[tokio::test]
async fn create_offline_syncs_on_reconnect() {
    let store = MemoryObjectStore::new();
    let remote = FakeRemote::new();
    let core = NoteStateCore::new(&store, Default::default(), "device-a");

    // Offline: the note core has no notion of connectivity, so "offline"
    // here just means the engine hasn't been triggered yet.
    let note = core.add_note("n1", "Hello", 1_000).await.unwrap();
    assert_eq!(note.version, 1);
    assert_eq!(store.list_queue().await.unwrap().len(), 1);

    // Reconnect: trigger a cycle.
    let engine = SyncEngine::new(&store, &remote, SyncEngineConfig::default(), "device-a");
    let session = Session::new(None);
    let events = engine.trigger_cycle(&session).await.unwrap();
    assert!(events.iter().any(|e| matches!(e, SyncEvent::SyncFinished { ok: true, .. })));

    let note = store.get_note("n1").await.unwrap().unwrap();
    assert_eq!(note.sync_status, NoteSyncStatus::Synced);
    assert!(note.remote_file_id.is_some());
    assert!(store.list_queue().await.unwrap().is_empty());
    assert_eq!(remote.files.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn trash_then_restore_before_sync_coalesces_to_a_single_update_no_delete_ever_sent() {
    let store = MemoryObjectStore::new();
    let remote = FakeRemote::new();
    let core = NoteStateCore::new(&store, Default::default(), "device-a");

    core.add_note("n3", "Hello", 1_000).await.unwrap();
    // First cycle: sync the create so the note has a remote file id and
    // an empty queue, matching the scenario's "start online" premise.
    let engine = SyncEngine::new(&store, &remote, SyncEngineConfig::default(), "device-a");
    let session = Session::new(None);
    engine.trigger_cycle(&session).await.unwrap();
    assert!(store.list_queue().await.unwrap().is_empty());

    core.move_to_trash("n3", 1_100).await.unwrap();
    core.restore("n3", 1_102).await.unwrap();

    let ops = store.list_queue().await.unwrap();
    assert_eq!(ops.len(), 1, "trash+restore must coalesce to one trailing op");
    assert_eq!(ops[0].kind, OpKind::Update, "no delete op is ever queued for a soft-delete/restore pair");

    engine.trigger_cycle(&session).await.unwrap();
    let note = store.get_note("n3").await.unwrap().unwrap();
    assert!(!note.is_deleted);
    assert_eq!(remote.files.lock().unwrap().len(), 1, "the remote file still exists");
}

#[tokio::test]
async fn auth_expiry_during_drain_is_retried_once_then_drains_cleanly() {
    let store = MemoryObjectStore::new();
    let remote = FakeRemote::new();
    let core = NoteStateCore::new(&store, Default::default(), "device-a");

    core.add_note("n8", "Hello", 1_000).await.unwrap();
    let engine = SyncEngine::new(&store, &remote, SyncEngineConfig::default(), "device-a");
    let session = Session::new(None);
    engine.trigger_cycle(&session).await.unwrap();

    core.update_note("n8", |n| n.title = "Updated".into(), 1_200).await.unwrap();
    remote.fail_next_updates(1);

    let session = Session::new(Some(Box::new(AlwaysRefreshes)));
    session.sign_in("user-1", gnote_core::session::AccessToken { token: "stale".into(), expires_at_ms: 0 });
    let events = engine.trigger_cycle(&session).await.unwrap();

    assert!(events.iter().any(|e| matches!(e, SyncEvent::SyncFinished { ok: true, .. })));
    assert!(store.list_queue().await.unwrap().is_empty(), "the retried op must drain cleanly");
    assert!(session.user_id().is_some(), "a successful refresh keeps the session signed in");
}

#[tokio::test]
async fn failed_refresh_halts_the_cycle_and_signs_out() {
    let store = MemoryObjectStore::new();
    let remote = FakeRemote::new();
    let core = NoteStateCore::new(&store, Default::default(), "device-a");

    core.add_note("n8", "Hello", 1_000).await.unwrap();
    let engine = SyncEngine::new(&store, &remote, SyncEngineConfig::default(), "device-a");
    let warm_session = Session::new(None);
    engine.trigger_cycle(&warm_session).await.unwrap();

    core.update_note("n8", |n| n.title = "Updated".into(), 1_200).await.unwrap();
    remote.fail_next_updates(1);

    let session = Session::new(Some(Box::new(AlwaysFailsRefresh)));
    session.sign_in("user-1", gnote_core::session::AccessToken { token: "stale".into(), expires_at_ms: 0 });
    let result = engine.trigger_cycle(&session).await;

    assert!(result.is_err(), "a failed refresh aborts the whole cycle");
    assert!(session.user_id().is_none(), "the session is logged out on refresh failure");
}
