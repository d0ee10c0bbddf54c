//! The Object Store: a durable async key-value layer over notes,
//! collections, tombstones, the mutation queue, sync shadows and
//! settings.
//!
//! The trait mirrors the shape of an IndexedDB-backed implementation
//! (logical tables, whole-table reads, a single atomic write for an
//! entity plus the queue op it spawns) without naming IndexedDB: the
//! browser-backed implementation lives in `gnote_wasm`, an in-memory one
//! lives in this crate for tests and native hosts.
//!
//! Trait methods return `impl Future<Output = ...> + Send` rather than
//! using `async fn` in a `dyn`-safe trait — callers are expected to be
//! generic over `S: ObjectStore`, not to hold `dyn ObjectStore`.

use std::future::Future;

use crate::error::Result;
use crate::model::{Collection, Note, QueuedOp, Settings, SyncShadow, Tombstone};

/// Durable storage for every table the app needs to survive a reload.
pub trait ObjectStore: Send + Sync {
    /// Fetch a note by id, or `None` if absent.
    fn get_note(&self, id: &str) -> impl Future<Output = Result<Option<Note>>> + Send;

    /// Enumerate every note (notes are small in practice — thousands of
    /// entries at most — so this is a whole-table read).
    fn list_notes(&self) -> impl Future<Output = Result<Vec<Note>>> + Send;

    /// Insert or overwrite a note.
    fn put_note(&self, note: Note) -> impl Future<Output = Result<()>> + Send;

    /// Remove a note row entirely (used on permanent delete, after the
    /// tombstone has been recorded).
    fn remove_note(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Enumerate every collection. Legacy: the store drops to empty
    /// forever once migration M1 has run.
    fn list_collections(&self) -> impl Future<Output = Result<Vec<Collection>>> + Send;

    /// Fetch a collection by id, or `None` if absent.
    fn get_collection(&self, id: &str) -> impl Future<Output = Result<Option<Collection>>> + Send;

    /// Insert or overwrite a collection row. Only ever called by the
    /// migration engine's rollback path post-M1.
    fn put_collection(&self, collection: Collection) -> impl Future<Output = Result<()>> + Send;

    /// Remove a collection row (used by migration M1's cleanup step).
    fn remove_collection(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Atomically remove a collection row and record its tombstone in
    /// one transaction. Migration M1 must never observe a collection
    /// removed with no tombstone recorded (a crash between the two
    /// writes would otherwise let a subsequent pull resurrect it).
    fn remove_collection_with_tombstone(
        &self,
        id: &str,
        tombstone: Tombstone,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomically write a note and enqueue its mutation op in one
    /// transaction. This is the operation that closes the "saved
    /// locally, queue lost" failure mode described in the object store's
    /// design: a crash between the two writes must never be observable.
    fn save_entity_with_queue(
        &self,
        note: Note,
        op: QueuedOp,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Record a tombstone for a permanently-deleted entity.
    fn put_tombstone(&self, tombstone: Tombstone) -> impl Future<Output = Result<()>> + Send;

    /// Look up a tombstone by entity id.
    fn get_tombstone(&self, id: &str) -> impl Future<Output = Result<Option<Tombstone>>> + Send;

    /// Drop a tombstone once a full pull cycle has confirmed no remote
    /// resurrection is possible.
    fn remove_tombstone(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Enumerate every queued mutation op, oldest first.
    fn list_queue(&self) -> impl Future<Output = Result<Vec<QueuedOp>>> + Send;

    /// Append a new op; the store assigns `op_id` and returns the
    /// populated record.
    fn enqueue_op(&self, op: QueuedOp) -> impl Future<Output = Result<QueuedOp>> + Send;

    /// Overwrite an existing queued op in place (used by coalescing and
    /// by attempt/backoff bookkeeping).
    fn put_op(&self, op: QueuedOp) -> impl Future<Output = Result<()>> + Send;

    /// Remove a queued op once it has been applied (or failed
    /// terminally).
    fn remove_op(&self, op_id: u64) -> impl Future<Output = Result<()>> + Send;

    /// Fetch the sync shadow for a note, if one has ever been recorded.
    fn get_shadow(&self, note_id: &str) -> impl Future<Output = Result<Option<SyncShadow>>> + Send;

    /// Record (or overwrite) the sync shadow for a note.
    fn put_shadow(&self, note_id: &str, shadow: SyncShadow) -> impl Future<Output = Result<()>> + Send;

    /// Remove a note's sync shadow (used when a note is permanently
    /// deleted and fully purged).
    fn remove_shadow(&self, note_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Read the settings row.
    fn get_settings(&self) -> impl Future<Output = Result<Settings>> + Send;

    /// Overwrite the settings row.
    fn put_settings(&self, settings: Settings) -> impl Future<Output = Result<()>> + Send;

    /// Probe whether the underlying store is actually available. Hosts
    /// call this at startup; on `false` the engine refuses to start and
    /// the app falls back to ephemeral, in-memory-only mode.
    fn is_available(&self) -> impl Future<Output = bool> + Send;
}
