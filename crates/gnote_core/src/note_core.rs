//! Note State Core: the authoritative in-memory view of notes and
//! their mutators.
//!
//! Every mutator bumps `version`, sets `updated_at`, marks the note
//! `pending`, writes through to the object store via
//! `save_entity_with_queue`, and enqueues the matching op — in that
//! order, within one call, so the note and its queued op are never
//! observably out of sync the instant the mutator returns.

use crate::config::NoteCoreConfig;
use crate::error::{GNoteError, Result};
use crate::model::{EntityType, Note, NoteId, OpKind, QueuedOp};
use crate::queue::MutationQueue;
use crate::store::ObjectStore;

/// Owns mutation of the note model against a backing [`ObjectStore`].
///
/// [`NoteStateCore::suspend_autosave`]/[`NoteStateCore::resume_autosave`]
/// are the on/off switch a collaboration session toggles around its
/// lifecycle; this crate has no awareness of CRDTs beyond that. A host
/// that rebuilds its `NoteStateCore` per call (as a `wasm_bindgen`
/// struct must) cannot rely on `suspended` surviving between calls —
/// it needs its own durable record of which note, if any, currently has
/// a collaboration session attached (`gnote_core::session::Session`'s
/// `attach_collab`/`detach_collab`), and must consult it before
/// constructing a core for a mutating call.
pub struct NoteStateCore<'s, S: ObjectStore> {
    store: &'s S,
    config: NoteCoreConfig,
    device_id: String,
    suspended: std::collections::HashSet<NoteId>,
}

impl<'s, S: ObjectStore> NoteStateCore<'s, S> {
    /// Build a core over a store with the given autosave config and this
    /// device's stable id (used only as the reconciler's tie-break).
    pub fn new(store: &'s S, config: NoteCoreConfig, device_id: impl Into<String>) -> Self {
        NoteStateCore {
            store,
            config,
            device_id: device_id.into(),
            suspended: std::collections::HashSet::new(),
        }
    }

    /// Autosave debounce knobs in effect.
    pub fn config(&self) -> NoteCoreConfig {
        self.config
    }

    /// Suspend autosave writes for `note_id`: called when a
    /// collaboration session attaches.
    pub fn suspend_autosave(&mut self, note_id: NoteId) {
        self.suspended.insert(note_id);
    }

    /// Resume autosave writes for `note_id`: called on collaboration
    /// session end, after the session's own coalesced save has already
    /// gone through [`NoteStateCore::persist_collab_snapshot`].
    pub fn resume_autosave(&mut self, note_id: &NoteId) {
        self.suspended.remove(note_id);
    }

    /// Whether autosave is currently suspended for `note_id`.
    pub fn is_autosave_suspended(&self, note_id: &NoteId) -> bool {
        self.suspended.contains(note_id)
    }

    /// Write a collaboration session's final content back as the note's
    /// own: sets `content`, marks `is_shared`, and goes through the
    /// common [`Self::mutate`] path like any other write. Callers are
    /// expected to have already resumed autosave for `id` (or to resume
    /// it immediately after this returns) — this method does not touch
    /// `suspended` itself, since a host may call it once per coalesced
    /// snapshot while the session is still technically attached.
    pub async fn persist_collab_snapshot(&self, id: &str, content: Vec<u8>, now_ms: i64) -> Result<Note> {
        let mut note = self.load(id).await?;
        note.content = content;
        note.is_shared = true;
        self.mutate(note, now_ms).await
    }

    async fn mutate(&self, mut note: Note, now_ms: i64) -> Result<Note> {
        note.version += 1;
        note.updated_at = now_ms;
        note.sync_status = crate::model::SyncStatus::Pending;
        let op = QueuedOp {
            op_id: 0,
            kind: OpKind::Update,
            entity_type: EntityType::Note,
            entity_id: note.id.clone(),
            payload: Some(serde_json::to_vec(&note).map_err(|e| GNoteError::InvalidRecord {
                id: note.id.0.clone(),
                message: e.to_string(),
            })?),
            enqueued_at: now_ms,
            attempts: 0,
            last_error: None,
        };
        self.store.save_entity_with_queue(note.clone(), op).await?;
        Ok(note)
    }

    /// Create a new note, persist it, and enqueue its `create` op.
    pub async fn add_note(&self, id: impl Into<NoteId>, title: impl Into<String>, now_ms: i64) -> Result<Note> {
        let note = Note::new(id, title, now_ms, self.device_id.clone());
        let payload = serde_json::to_vec(&note).map_err(|e| GNoteError::InvalidRecord {
            id: note.id.0.clone(),
            message: e.to_string(),
        })?;
        let op = QueuedOp {
            op_id: 0,
            kind: OpKind::Create,
            entity_type: EntityType::Note,
            entity_id: note.id.clone(),
            payload: Some(payload),
            enqueued_at: now_ms,
            attempts: 0,
            last_error: None,
        };
        self.store.save_entity_with_queue(note.clone(), op).await?;
        Ok(note)
    }

    /// Apply a title/content/style patch. `patch` is applied in-place to
    /// the loaded note before the common mutate path runs.
    pub async fn update_note(
        &self,
        id: &str,
        patch: impl FnOnce(&mut Note),
        now_ms: i64,
    ) -> Result<Note> {
        if self.is_autosave_suspended(&NoteId(id.to_string())) {
            return Err(GNoteError::AutosaveSuspended { id: id.to_string() });
        }
        let mut note = self.load(id).await?;
        patch(&mut note);
        self.mutate(note, now_ms).await
    }

    /// Flip `is_pinned`.
    pub async fn toggle_pin(&self, id: &str, now_ms: i64) -> Result<Note> {
        let mut note = self.load(id).await?;
        note.is_pinned = !note.is_pinned;
        self.mutate(note, now_ms).await
    }

    /// Soft-delete: sets `is_deleted`, clears `collection_id`, enqueues
    /// an `update` — never a `delete` (permanent removal is a separate
    /// call).
    pub async fn move_to_trash(&self, id: &str, now_ms: i64) -> Result<Note> {
        let mut note = self.load(id).await?;
        note.mark_deleted(now_ms);
        self.mutate(note, now_ms).await
    }

    /// Undo a soft-delete. Trash then restore before the next sync cycle
    /// coalesces to a single `update` with no `delete` ever queued: this
    /// method never itself enqueues a `delete`, so there is nothing to
    /// undo at the queue level beyond the normal coalescing in
    /// [`MutationQueue`].
    pub async fn restore(&self, id: &str, now_ms: i64) -> Result<Note> {
        let mut note = self.load(id).await?;
        note.is_deleted = false;
        note.deleted_at = None;
        self.mutate(note, now_ms).await
    }

    /// Permanently delete: records a tombstone, removes the row, and
    /// enqueues a `delete` op (which discards any earlier queued ops for
    /// this note per the mutation queue's coalescing rule).
    pub async fn permanently_delete(&self, id: &str, now_ms: i64) -> Result<()> {
        let note = self.load(id).await?;
        self.store
            .put_tombstone(crate::model::Tombstone {
                entity_id: note.id.clone(),
                entity_type: EntityType::Note,
                deleted_at: now_ms,
            })
            .await?;
        self.store.remove_note(id).await?;
        MutationQueue::new(self.store)
            .enqueue_delete(EntityType::Note, note.id, now_ms)
            .await?;
        Ok(())
    }

    /// Duplicate a note under a new id, as a brand-new `create`.
    pub async fn duplicate(&self, id: &str, new_id: impl Into<NoteId>, now_ms: i64) -> Result<Note> {
        let source = self.load(id).await?;
        let mut copy = source;
        copy.id = new_id.into();
        copy.version = 1;
        copy.created_at = now_ms;
        copy.updated_at = now_ms;
        copy.sync_status = crate::model::SyncStatus::Pending;
        copy.remote_file_id = None;
        copy.public_file_id = None;
        let payload = serde_json::to_vec(&copy).map_err(|e| GNoteError::InvalidRecord {
            id: copy.id.0.clone(),
            message: e.to_string(),
        })?;
        let op = QueuedOp {
            op_id: 0,
            kind: OpKind::Create,
            entity_type: EntityType::Note,
            entity_id: copy.id.clone(),
            payload: Some(payload),
            enqueued_at: now_ms,
            attempts: 0,
            last_error: None,
        };
        self.store.save_entity_with_queue(copy.clone(), op).await?;
        Ok(copy)
    }

    async fn load(&self, id: &str) -> Result<Note> {
        self.store
            .get_note(id)
            .await?
            .ok_or_else(|| GNoteError::NotFound {
                entity_type: "note",
                id: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryObjectStore;

    #[tokio::test]
    async fn add_note_persists_and_enqueues_create() {
        let store = MemoryObjectStore::new();
        let core = NoteStateCore::new(&store, NoteCoreConfig::default(), "device-1");
        let note = core.add_note("n1", "Hello", 1_000).await.unwrap();
        assert_eq!(note.version, 1);
        let ops = store.list_queue().await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OpKind::Create);
    }

    #[tokio::test]
    async fn version_is_strictly_monotone_across_mutations() {
        let store = MemoryObjectStore::new();
        let core = NoteStateCore::new(&store, NoteCoreConfig::default(), "device-1");
        core.add_note("n1", "Hello", 1_000).await.unwrap();
        let after_pin = core.toggle_pin("n1", 1_100).await.unwrap();
        let after_update = core
            .update_note("n1", |n| n.title = "Hello v2".into(), 1_200)
            .await
            .unwrap();
        assert!(after_pin.version > 1);
        assert!(after_update.version > after_pin.version);
        assert!(after_update.updated_at >= after_pin.updated_at);
    }

    #[tokio::test]
    async fn move_to_trash_clears_collection_id() {
        let store = MemoryObjectStore::new();
        let core = NoteStateCore::new(&store, NoteCoreConfig::default(), "device-1");
        core.add_note("n1", "Hello", 1_000).await.unwrap();
        core.update_note("n1", |n| n.collection_id = Some("c1".into()), 1_050)
            .await
            .unwrap();
        let trashed = core.move_to_trash("n1", 1_100).await.unwrap();
        assert!(trashed.is_deleted);
        assert!(trashed.collection_id.is_none());
    }

    #[tokio::test]
    async fn mutation_while_autosave_suspended_is_rejected() {
        let store = MemoryObjectStore::new();
        let mut core = NoteStateCore::new(&store, NoteCoreConfig::default(), "device-1");
        core.add_note("n1", "Hello", 1_000).await.unwrap();
        core.suspend_autosave("n1".into());
        let result = core.update_note("n1", |n| n.title = "nope".into(), 1_100).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn permanently_delete_records_tombstone_and_removes_row() {
        let store = MemoryObjectStore::new();
        let core = NoteStateCore::new(&store, NoteCoreConfig::default(), "device-1");
        core.add_note("n1", "Hello", 1_000).await.unwrap();
        core.permanently_delete("n1", 1_100).await.unwrap();
        assert!(store.get_note("n1").await.unwrap().is_none());
        assert!(store.get_tombstone("n1").await.unwrap().is_some());
        let ops = store.list_queue().await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OpKind::Delete);
    }
}
