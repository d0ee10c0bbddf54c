//! An in-memory [`ObjectStore`] implementation: the reference store used
//! by tests throughout the workspace, and a usable fallback for native
//! hosts that don't have IndexedDB underneath them.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;
use crate::model::{Collection, Note, OpKind, QueuedOp, Settings, SyncShadow, Tombstone};
use crate::store::ObjectStore;

#[derive(Default)]
struct Tables {
    notes: HashMap<String, Note>,
    collections: HashMap<String, Collection>,
    tombstones: HashMap<String, Tombstone>,
    queue: HashMap<u64, QueuedOp>,
    next_op_id: u64,
    shadows: HashMap<String, SyncShadow>,
    settings: Settings,
}

/// `RwLock`-guarded in-memory tables, keyed exactly like the IndexedDB
/// stores they stand in for.
pub struct MemoryObjectStore {
    tables: RwLock<Tables>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        MemoryObjectStore {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryObjectStore {
    async fn get_note(&self, id: &str) -> Result<Option<Note>> {
        Ok(self.tables.read().unwrap().notes.get(id).cloned())
    }

    async fn list_notes(&self) -> Result<Vec<Note>> {
        Ok(self.tables.read().unwrap().notes.values().cloned().collect())
    }

    async fn put_note(&self, note: Note) -> Result<()> {
        self.tables.write().unwrap().notes.insert(note.id.0.clone(), note);
        Ok(())
    }

    async fn remove_note(&self, id: &str) -> Result<()> {
        self.tables.write().unwrap().notes.remove(id);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        Ok(self.tables.read().unwrap().collections.values().cloned().collect())
    }

    async fn get_collection(&self, id: &str) -> Result<Option<Collection>> {
        Ok(self.tables.read().unwrap().collections.get(id).cloned())
    }

    async fn put_collection(&self, collection: Collection) -> Result<()> {
        self.tables.write().unwrap().collections.insert(collection.id.0.clone(), collection);
        Ok(())
    }

    async fn remove_collection(&self, id: &str) -> Result<()> {
        self.tables.write().unwrap().collections.remove(id);
        Ok(())
    }

    async fn remove_collection_with_tombstone(&self, id: &str, tombstone: crate::model::Tombstone) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        tables.collections.remove(id);
        tables.tombstones.insert(tombstone.entity_id.0.clone(), tombstone);
        Ok(())
    }

    async fn save_entity_with_queue(&self, note: Note, op: QueuedOp) -> Result<()> {
        // Both writes happen under the same lock guard: no observer can
        // see the note without the op or the op without the note. The
        // queue side applies the same coalescing rules as `MutationQueue`
        // (§4.2): callers here pass a fresh op with `op_id = 0` and rely
        // on this transaction to coalesce onto (or refuse beneath) an
        // unclaimed op already queued for the same entity, and to assign
        // the real id otherwise.
        let mut tables = self.tables.write().unwrap();
        tables.notes.insert(note.id.0.clone(), note);

        let tail = tables
            .queue
            .values()
            .filter(|o| o.entity_id == op.entity_id)
            .max_by_key(|o| o.op_id)
            .cloned();

        match (op.kind, &tail) {
            (OpKind::Update, Some(t)) if t.kind == OpKind::Delete => {
                // delete supersedes; refuse the resurrecting update
            }
            (OpKind::Update, Some(t)) if t.kind == OpKind::Update && t.attempts == 0 => {
                let mut replaced = t.clone();
                replaced.payload = op.payload;
                replaced.enqueued_at = op.enqueued_at;
                tables.queue.insert(replaced.op_id, replaced);
            }
            (OpKind::Delete, _) => {
                let superseded: Vec<u64> = tables
                    .queue
                    .values()
                    .filter(|o| o.entity_id == op.entity_id)
                    .map(|o| o.op_id)
                    .collect();
                for op_id in superseded {
                    tables.queue.remove(&op_id);
                }
                tables.next_op_id += 1;
                let op_id = tables.next_op_id;
                tables.queue.insert(op_id, QueuedOp { op_id, ..op });
            }
            _ => {
                tables.next_op_id += 1;
                let op_id = tables.next_op_id;
                tables.queue.insert(op_id, QueuedOp { op_id, ..op });
            }
        }
        Ok(())
    }

    async fn put_tombstone(&self, tombstone: Tombstone) -> Result<()> {
        self.tables
            .write()
            .unwrap()
            .tombstones
            .insert(tombstone.entity_id.0.clone(), tombstone);
        Ok(())
    }

    async fn get_tombstone(&self, id: &str) -> Result<Option<Tombstone>> {
        Ok(self.tables.read().unwrap().tombstones.get(id).cloned())
    }

    async fn remove_tombstone(&self, id: &str) -> Result<()> {
        self.tables.write().unwrap().tombstones.remove(id);
        Ok(())
    }

    async fn list_queue(&self) -> Result<Vec<QueuedOp>> {
        let tables = self.tables.read().unwrap();
        let mut ops: Vec<QueuedOp> = tables.queue.values().cloned().collect();
        ops.sort_by_key(|op| op.op_id);
        Ok(ops)
    }

    async fn enqueue_op(&self, mut op: QueuedOp) -> Result<QueuedOp> {
        let mut tables = self.tables.write().unwrap();
        tables.next_op_id += 1;
        op.op_id = tables.next_op_id;
        tables.queue.insert(op.op_id, op.clone());
        Ok(op)
    }

    async fn put_op(&self, op: QueuedOp) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        tables.next_op_id = tables.next_op_id.max(op.op_id);
        tables.queue.insert(op.op_id, op);
        Ok(())
    }

    async fn remove_op(&self, op_id: u64) -> Result<()> {
        self.tables.write().unwrap().queue.remove(&op_id);
        Ok(())
    }

    async fn get_shadow(&self, note_id: &str) -> Result<Option<SyncShadow>> {
        Ok(self.tables.read().unwrap().shadows.get(note_id).cloned())
    }

    async fn put_shadow(&self, note_id: &str, shadow: SyncShadow) -> Result<()> {
        self.tables.write().unwrap().shadows.insert(note_id.to_string(), shadow);
        Ok(())
    }

    async fn remove_shadow(&self, note_id: &str) -> Result<()> {
        self.tables.write().unwrap().shadows.remove(note_id);
        Ok(())
    }

    async fn get_settings(&self) -> Result<Settings> {
        Ok(self.tables.read().unwrap().settings.clone())
    }

    async fn put_settings(&self, settings: Settings) -> Result<()> {
        self.tables.write().unwrap().settings = settings;
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityType, OpKind, SyncStatus};

    fn note(id: &str) -> Note {
        Note::new(id, "title", 1_000, "device-1")
    }

    fn op(id: &str, op_id: u64) -> QueuedOp {
        QueuedOp {
            op_id,
            kind: OpKind::Create,
            entity_type: EntityType::Note,
            entity_id: id.into(),
            payload: None,
            enqueued_at: 1_000,
            attempts: 0,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn save_entity_with_queue_is_atomic_from_readers_view() {
        let store = MemoryObjectStore::new();
        store.save_entity_with_queue(note("n1"), op("n1", 1)).await.unwrap();
        let saved = store.get_note("n1").await.unwrap().unwrap();
        assert_eq!(saved.sync_status, SyncStatus::Pending);
        let ops = store.list_queue().await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].entity_id.0, "n1");
    }

    #[tokio::test]
    async fn enqueue_assigns_monotonic_ids() {
        let store = MemoryObjectStore::new();
        let a = store.enqueue_op(op("n1", 0)).await.unwrap();
        let b = store.enqueue_op(op("n1", 0)).await.unwrap();
        assert!(b.op_id > a.op_id);
    }

    #[tokio::test]
    async fn list_queue_is_ordered_by_op_id() {
        let store = MemoryObjectStore::new();
        store.enqueue_op(op("n1", 0)).await.unwrap();
        store.enqueue_op(op("n2", 0)).await.unwrap();
        store.enqueue_op(op("n3", 0)).await.unwrap();
        let ops = store.list_queue().await.unwrap();
        let ids: Vec<u64> = ops.iter().map(|o| o.op_id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    fn update_op(id: &str) -> QueuedOp {
        QueuedOp { kind: OpKind::Update, ..op(id, 0) }
    }

    #[tokio::test]
    async fn save_entity_with_queue_coalesces_successive_updates_to_same_entity() {
        let store = MemoryObjectStore::new();
        store.save_entity_with_queue(note("n1"), update_op("n1")).await.unwrap();
        store.save_entity_with_queue(note("n1"), update_op("n1")).await.unwrap();
        let ops = store.list_queue().await.unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[tokio::test]
    async fn save_entity_with_queue_keeps_different_entities_independent() {
        let store = MemoryObjectStore::new();
        store.save_entity_with_queue(note("n1"), update_op("n1")).await.unwrap();
        store.save_entity_with_queue(note("n2"), update_op("n2")).await.unwrap();
        let ops = store.list_queue().await.unwrap();
        assert_eq!(ops.len(), 2);
    }

    #[tokio::test]
    async fn remove_note_after_tombstone_is_visible_immediately() {
        let store = MemoryObjectStore::new();
        store.put_note(note("n1")).await.unwrap();
        store
            .put_tombstone(Tombstone {
                entity_id: "n1".into(),
                entity_type: EntityType::Note,
                deleted_at: 2_000,
            })
            .await
            .unwrap();
        store.remove_note("n1").await.unwrap();
        assert!(store.get_note("n1").await.unwrap().is_none());
        assert!(store.get_tombstone("n1").await.unwrap().is_some());
    }
}
