//! Migration Engine: the one-shot, irreversible M1 migration that
//! removes the legacy collections feature.
//!
//! The app is expected to be read-only for the duration of a run —
//! enforced by the host, not this module, which only assumes no other
//! mutator is touching notes or collections concurrently.

use gnote_core::model::{Collection, EntityType, NoteId, Tombstone};
use gnote_core::queue::MutationQueue;
use gnote_core::store::ObjectStore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::events::SyncEvent;
use crate::remote::RemoteClient;

const MIGRATION_LOG_KEY: &str = "migrationLogV1";
pub const M1_VERSION: u64 = 1;

/// Snapshot written to `settings.extra` before any destructive step, so a
/// terminal failure can restore exactly what M1 is about to remove.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MigrationLog {
    collections: Vec<Collection>,
    note_links: Vec<(NoteId, NoteId)>,
}

/// Runs migration M1 ("remove collections") against a store, optionally
/// attempting best-effort immediate remote deletes of collection files
/// via `remote` (if offline or absent, the enqueued `delete` op still
/// covers it on the next sync cycle).
pub struct MigrationEngine<'s, S: ObjectStore> {
    store: &'s S,
}

impl<'s, S: ObjectStore> MigrationEngine<'s, S> {
    /// Wrap a store reference.
    pub fn new(store: &'s S) -> Self {
        MigrationEngine { store }
    }

    /// Run M1 if it hasn't already run. Idempotent: a prior successful
    /// run is detected via `settings.migration_version` and short-circuits
    /// to a single `MigrationProgress` event with nothing changed.
    pub async fn run_m1<R: RemoteClient>(&self, remote: Option<&R>, now_ms: i64) -> Result<Vec<SyncEvent>> {
        let settings = self.store.get_settings().await?;
        if settings.migration_version >= M1_VERSION {
            return Ok(vec![SyncEvent::MigrationProgress {
                notes_processed: 0,
                collections_removed: 0,
                drive_files_deleted: 0,
                elapsed_ms: 0,
            }]);
        }

        let collections = self.store.list_collections().await?;
        let mut note_links = Vec::new();
        for note in self.store.list_notes().await? {
            if let Some(collection_id) = note.collection_id.clone() {
                note_links.push((note.id.clone(), collection_id));
            }
        }

        let log = MigrationLog { collections: collections.clone(), note_links: note_links.clone() };
        self.persist_log(&log, &settings).await?;

        match self.apply(&collections, &note_links, remote, now_ms).await {
            Ok(events) => {
                let mut settings = self.store.get_settings().await?;
                settings.migration_version = M1_VERSION;
                self.store.put_settings(settings).await?;
                Ok(events)
            }
            Err(err) => {
                self.rollback(&log).await?;
                Err(err)
            }
        }
    }

    async fn persist_log(&self, log: &MigrationLog, base: &gnote_core::model::Settings) -> Result<()> {
        let mut settings = base.clone();
        let value = serde_json::to_value(log).map_err(|e| SyncError::Migration(e.to_string()))?;
        settings.extra.insert(MIGRATION_LOG_KEY.to_string(), value);
        self.store.put_settings(settings).await?;
        Ok(())
    }

    async fn apply<R: RemoteClient>(
        &self,
        collections: &[Collection],
        note_links: &[(NoteId, NoteId)],
        remote: Option<&R>,
        now_ms: i64,
    ) -> Result<Vec<SyncEvent>> {
        let queue = MutationQueue::new(self.store);
        let mut notes_processed = 0usize;
        let mut collections_removed = 0usize;
        let mut drive_files_deleted = 0usize;

        for (note_id, _collection_id) in note_links {
            let Some(mut note) = self.store.get_note(&note_id.0).await? else { continue };
            note.collection_id = None;
            note.version += 1;
            note.updated_at = now_ms;
            note.sync_status = gnote_core::model::SyncStatus::Pending;
            let payload = serde_json::to_vec(&note).map_err(|e| SyncError::Migration(e.to_string()))?;
            let op = gnote_core::model::QueuedOp {
                op_id: 0,
                kind: gnote_core::model::OpKind::Update,
                entity_type: EntityType::Note,
                entity_id: note.id.clone(),
                payload: Some(payload),
                enqueued_at: now_ms,
                attempts: 0,
                last_error: None,
            };
            self.store.save_entity_with_queue(note, op).await?;
            notes_processed += 1;
        }

        for collection in collections {
            let delete_op = queue.enqueue_delete(EntityType::Collection, collection.id.clone(), now_ms).await?;

            if let (Some(remote), Some(file_id)) = (remote, &collection.remote_file_id) {
                if remote.delete_file(file_id).await.is_ok() {
                    self.store.remove_op(delete_op.op_id).await?;
                    drive_files_deleted += 1;
                }
            }

            self.store
                .remove_collection_with_tombstone(
                    &collection.id.0,
                    Tombstone {
                        entity_id: collection.id.clone(),
                        entity_type: EntityType::Collection,
                        deleted_at: now_ms,
                    },
                )
                .await?;
            collections_removed += 1;
        }

        Ok(vec![SyncEvent::MigrationProgress {
            notes_processed,
            collections_removed,
            drive_files_deleted,
            elapsed_ms: 0,
        }])
    }

    async fn rollback(&self, log: &MigrationLog) -> Result<()> {
        for collection in &log.collections {
            self.store.put_collection(collection.clone()).await?;
        }
        for (note_id, collection_id) in &log.note_links {
            if let Some(mut note) = self.store.get_note(&note_id.0).await? {
                note.collection_id = Some(collection_id.clone());
                self.store.put_note(note).await?;
            }
        }
        Ok(())
    }
}
