//! The Mutation Queue: an ordered, idempotent log of per-entity
//! operations, coalesced at enqueue time and drained by the sync engine.
//!
//! Only `gnote_sync`'s engine drains; this crate only ever appends, so
//! the coalescing rules below are the entirety of this queue's write-side
//! policy. Draining (applying an op to the remote, retrying on failure)
//! is the Sync Engine's job, not this crate's — see `gnote_sync::engine`.

use crate::error::Result;
use crate::model::{EntityType, OpKind, QueuedOp};
use crate::store::ObjectStore;

/// Thin wrapper around an [`ObjectStore`] that enforces the queue's enqueue-time
/// invariants: updates coalesce onto an unclaimed pending update for the
/// same entity, creates are never coalesced, and a delete discards every
/// earlier op for its entity and is never followed by a resurrected
/// update.
pub struct MutationQueue<'s, S: ObjectStore> {
    store: &'s S,
}

impl<'s, S: ObjectStore> MutationQueue<'s, S> {
    /// Wrap a store reference.
    pub fn new(store: &'s S) -> Self {
        MutationQueue { store }
    }

    /// Enqueue a `create`. Never coalesced with anything — it carries
    /// the full current payload for a brand-new entity.
    pub async fn enqueue_create(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<crate::model::NoteId>,
        payload: Vec<u8>,
        now_ms: i64,
    ) -> Result<QueuedOp> {
        let op = QueuedOp {
            op_id: 0,
            kind: OpKind::Create,
            entity_type,
            entity_id: entity_id.into(),
            payload: Some(payload),
            enqueued_at: now_ms,
            attempts: 0,
            last_error: None,
        };
        self.store.enqueue_op(op).await
    }

    /// Enqueue an `update`, coalescing onto the most recent queued op for
    /// the same entity if it is itself a pending, not-yet-attempted
    /// `update`. Refuses to enqueue if the most recent op is a
    /// not-yet-drained `delete` (open question resolved in `DESIGN.md`:
    /// policed here, not at drain time) — the returned `Ok(None)` tells
    /// the caller the update was a silent no-op.
    pub async fn enqueue_update(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<crate::model::NoteId>,
        payload: Vec<u8>,
        now_ms: i64,
    ) -> Result<Option<QueuedOp>> {
        let entity_id = entity_id.into();
        let tail = self.last_op_for_entity(&entity_id).await?;

        if let Some(existing) = &tail {
            if existing.kind == OpKind::Delete {
                return Ok(None);
            }
            if existing.kind == OpKind::Update && existing.attempts == 0 {
                let mut replaced = existing.clone();
                replaced.payload = Some(payload);
                replaced.enqueued_at = now_ms;
                self.store.put_op(replaced.clone()).await?;
                return Ok(Some(replaced));
            }
        }

        let op = QueuedOp {
            op_id: 0,
            kind: OpKind::Update,
            entity_type,
            entity_id,
            payload: Some(payload),
            enqueued_at: now_ms,
            attempts: 0,
            last_error: None,
        };
        Ok(Some(self.store.enqueue_op(op).await?))
    }

    /// Enqueue a `delete`: discards every earlier queued op for this
    /// entity (they can never be applied to a remote object that is
    /// about to be removed) and appends the delete last.
    pub async fn enqueue_delete(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<crate::model::NoteId>,
        now_ms: i64,
    ) -> Result<QueuedOp> {
        let entity_id = entity_id.into();
        for existing in self.store.list_queue().await? {
            if existing.entity_id == entity_id {
                self.store.remove_op(existing.op_id).await?;
            }
        }
        let op = QueuedOp {
            op_id: 0,
            kind: OpKind::Delete,
            entity_type,
            entity_id,
            payload: None,
            enqueued_at: now_ms,
            attempts: 0,
            last_error: None,
        };
        self.store.enqueue_op(op).await
    }

    /// All currently queued ops, oldest first.
    pub async fn list(&self) -> Result<Vec<QueuedOp>> {
        self.store.list_queue().await
    }

    async fn last_op_for_entity(
        &self,
        entity_id: &crate::model::NoteId,
    ) -> Result<Option<QueuedOp>> {
        let ops = self.store.list_queue().await?;
        Ok(ops.into_iter().filter(|op| &op.entity_id == entity_id).next_back())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryObjectStore;

    #[tokio::test]
    async fn update_coalesces_onto_pending_update() {
        let store = MemoryObjectStore::new();
        let q = MutationQueue::new(&store);
        let first = q
            .enqueue_update(EntityType::Note, "n1", b"v1".to_vec(), 1_000)
            .await
            .unwrap()
            .unwrap();
        let second = q
            .enqueue_update(EntityType::Note, "n1", b"v2".to_vec(), 1_100)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.op_id, second.op_id);
        let ops = q.list().await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].payload, Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn create_is_never_coalesced_with_update() {
        let store = MemoryObjectStore::new();
        let q = MutationQueue::new(&store);
        q.enqueue_create(EntityType::Note, "n1", b"v1".to_vec(), 1_000)
            .await
            .unwrap();
        q.enqueue_update(EntityType::Note, "n1", b"v2".to_vec(), 1_100)
            .await
            .unwrap();
        let ops = q.list().await.unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].kind, OpKind::Create);
        assert_eq!(ops[1].kind, OpKind::Update);
    }

    #[tokio::test]
    async fn delete_discards_earlier_ops_for_entity() {
        let store = MemoryObjectStore::new();
        let q = MutationQueue::new(&store);
        q.enqueue_create(EntityType::Note, "n1", b"v1".to_vec(), 1_000)
            .await
            .unwrap();
        q.enqueue_update(EntityType::Note, "n1", b"v2".to_vec(), 1_100)
            .await
            .unwrap();
        q.enqueue_delete(EntityType::Note, "n1", 1_200).await.unwrap();
        let ops = q.list().await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OpKind::Delete);
    }

    #[tokio::test]
    async fn update_after_delete_is_silently_refused() {
        let store = MemoryObjectStore::new();
        let q = MutationQueue::new(&store);
        q.enqueue_delete(EntityType::Note, "n1", 1_000).await.unwrap();
        let result = q
            .enqueue_update(EntityType::Note, "n1", b"resurrect".to_vec(), 1_100)
            .await
            .unwrap();
        assert!(result.is_none());
        let ops = q.list().await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OpKind::Delete);
    }

    #[tokio::test]
    async fn ops_on_different_entities_are_independent() {
        let store = MemoryObjectStore::new();
        let q = MutationQueue::new(&store);
        q.enqueue_update(EntityType::Note, "n1", b"a".to_vec(), 1_000)
            .await
            .unwrap();
        q.enqueue_update(EntityType::Note, "n2", b"b".to_vec(), 1_000)
            .await
            .unwrap();
        let ops = q.list().await.unwrap();
        assert_eq!(ops.len(), 2);
    }
}
