//! IndexedDB-backed [`ObjectStore`]: the browser persistence layer
//! for notes, the legacy collections table, deletion tombstones, the
//! mutation queue, sync shadows and settings.
//!
//! Storage schema (database `gnote`):
//! - `notes`, `collections`, `deletedIds`, `mutationQueue`, `syncShadow`:
//!   key = entity id (a zero-padded op id for the queue, so its natural
//!   lexicographic cursor order matches numeric `op_id` order); value =
//!   the record JSON-encoded into a `JsString`.
//! - `settings`: a single row under the fixed key `"settings"`, plus a
//!   reserved `"__nextOpId"` key holding the queue's counter — kept in
//!   the same table rather than adding a seventh store for one integer.
//!
//! Grounded on `diaryx_wasm::indexeddb_fs::IndexedDbFileSystem`: the
//! `Factory::open`/`build_object_store` setup, the
//! `transaction(&[..]).rw().run(|t| async move {...})` pattern, cursor
//! key enumeration followed by a `get` for the value, and the
//! `idb_to_io_error`-style error mapping (renamed here to return
//! [`GNoteError`] instead of `std::io::Error`, since this store
//! implements `gnote_core::store::ObjectStore` rather than
//! `AsyncFileSystem`).

use std::future::Future;
use std::rc::Rc;

use gnote_core::error::{GNoteError, Result};
use gnote_core::model::{Collection, Note, OpKind, QueuedOp, Settings, SyncShadow, Tombstone};
use gnote_core::store::ObjectStore;
use indexed_db::{Database, Factory};
use js_sys::JsString;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

const DB_NAME: &str = "gnote";
const DB_VERSION: u32 = 1;

const STORE_NOTES: &str = "notes";
const STORE_COLLECTIONS: &str = "collections";
const STORE_DELETED_IDS: &str = "deletedIds";
const STORE_MUTATION_QUEUE: &str = "mutationQueue";
const STORE_SYNC_SHADOW: &str = "syncShadow";
const STORE_SETTINGS: &str = "settings";

const SETTINGS_KEY: &str = "settings";
const NEXT_OP_ID_KEY: &str = "__nextOpId";

/// Error type indexed-db transactions bail out with when a store
/// invariant is violated inside a closure; carries a [`GNoteError`]
/// through the transaction closure boundary the same way a native
/// filesystem wrapper would carry a `std::io::Error`.
type IdbError = indexed_db::Error<GNoteError>;

fn idb_to_core_error(e: IdbError) -> GNoteError {
    match e {
        indexed_db::Error::User(e) => e,
        other => GNoteError::StoreUnavailable(format!("{other:?}")),
    }
}

fn op_id_key(op_id: u64) -> String {
    format!("{op_id:020}")
}

fn encode<T: serde::Serialize>(id: &str, value: &T) -> std::result::Result<JsString, IdbError> {
    let json = serde_json::to_string(value).map_err(|e| {
        indexed_db::Error::User(GNoteError::InvalidRecord { id: id.to_string(), message: e.to_string() })
    })?;
    Ok(JsString::from(json.as_str()))
}

fn decode<T: serde::de::DeserializeOwned>(id: &str, value: JsValue) -> std::result::Result<T, IdbError> {
    let js_str: JsString = value.dyn_into().map_err(|_| {
        indexed_db::Error::User(GNoteError::InvalidRecord {
            id: id.to_string(),
            message: "stored value is not a string".to_string(),
        })
    })?;
    serde_json::from_str(&String::from(&js_str)).map_err(|e| {
        indexed_db::Error::User(GNoteError::InvalidRecord { id: id.to_string(), message: e.to_string() })
    })
}

/// `ObjectStore` implementation backed by the browser's IndexedDB, via
/// the `indexed-db` crate. Cheap to clone: the underlying `Database`
/// handle is reference-counted.
pub struct IndexedDbObjectStore {
    db: Rc<Database<GNoteError>>,
}

impl Clone for IndexedDbObjectStore {
    fn clone(&self) -> Self {
        IndexedDbObjectStore { db: self.db.clone() }
    }
}

// SAFETY: `gnote_core::store::ObjectStore` requires `Send + Sync` so
// native callers can stay generic over it; `Rc<Database<_>>` is neither
// by default. wasm32-unknown-unknown has no real threads to race on —
// every call into this store happens on the single JS event-loop
// thread, so the same carve-out applies here as for this crate's other
// wasm-bound transport types.
unsafe impl Send for IndexedDbObjectStore {}
unsafe impl Sync for IndexedDbObjectStore {}

impl IndexedDbObjectStore {
    /// Open (or create, on first run) the `gnote` IndexedDB database
    /// with every logical table the store needs.
    pub async fn open() -> Result<Self> {
        let factory = Factory::<GNoteError>::get()
            .map_err(|e| GNoteError::StoreUnavailable(format!("no indexedDB factory: {e:?}")))?;

        let db = factory
            .open(DB_NAME, DB_VERSION, |evt| async move {
                let db = evt.database();
                for store in [
                    STORE_NOTES,
                    STORE_COLLECTIONS,
                    STORE_DELETED_IDS,
                    STORE_MUTATION_QUEUE,
                    STORE_SYNC_SHADOW,
                    STORE_SETTINGS,
                ] {
                    if !db.object_store_names().contains(&store.to_string()) {
                        db.build_object_store(store).create()?;
                    }
                }
                Ok(())
            })
            .await
            .map_err(|e| GNoteError::StoreUnavailable(format!("failed to open gnote database: {e:?}")))?;

        Ok(IndexedDbObjectStore { db: Rc::new(db) })
    }

    async fn get_record<T: serde::de::DeserializeOwned>(&self, store: &'static str, id: &str) -> Result<Option<T>> {
        let id_owned = id.to_string();
        let key = id_owned.clone();
        self.db
            .transaction(&[store])
            .run(move |t| {
                let key = key.clone();
                async move {
                    let object_store = t.object_store(store)?;
                    match object_store.get(&JsString::from(key.as_str())).await? {
                        Some(value) => Ok(Some(decode(&key, value)?)),
                        None => Ok(None),
                    }
                }
            })
            .await
            .map_err(idb_to_core_error)
    }

    async fn list_records<T: serde::de::DeserializeOwned>(&self, store: &'static str) -> Result<Vec<T>> {
        self.db
            .transaction(&[store])
            .run(move |t| async move {
                let object_store = t.object_store(store)?;
                let mut keys = Vec::new();
                let mut cursor = object_store.cursor().open().await?;
                while let Some(key) = cursor.key() {
                    if let Some(s) = key.dyn_ref::<JsString>() {
                        keys.push(String::from(s));
                    }
                    cursor.advance(1).await?;
                }
                let mut records = Vec::with_capacity(keys.len());
                for key in keys {
                    if let Some(value) = object_store.get(&JsString::from(key.as_str())).await? {
                        records.push(decode(&key, value)?);
                    }
                }
                Ok(records)
            })
            .await
            .map_err(idb_to_core_error)
    }

    async fn put_record<T: serde::Serialize>(&self, store: &'static str, id: &str, value: &T) -> Result<()> {
        let id_owned = id.to_string();
        let encoded = encode(&id_owned, value).map_err(idb_to_core_error)?;
        self.db
            .transaction(&[store])
            .rw()
            .run(move |t| {
                let id_owned = id_owned.clone();
                let encoded = encoded.clone();
                async move {
                    let object_store = t.object_store(store)?;
                    object_store.put_kv(&JsString::from(id_owned.as_str()), &encoded).await?;
                    Ok(())
                }
            })
            .await
            .map_err(idb_to_core_error)
    }

    async fn remove_record(&self, store: &'static str, id: &str) -> Result<()> {
        let id_owned = id.to_string();
        self.db
            .transaction(&[store])
            .rw()
            .run(move |t| {
                let id_owned = id_owned.clone();
                async move {
                    let object_store = t.object_store(store)?;
                    object_store.delete(&JsString::from(id_owned.as_str())).await?;
                    Ok(())
                }
            })
            .await
            .map_err(idb_to_core_error)
    }
}

impl ObjectStore for IndexedDbObjectStore {
    fn get_note(&self, id: &str) -> impl Future<Output = Result<Option<Note>>> + Send {
        async move { self.get_record(STORE_NOTES, id).await }
    }

    fn list_notes(&self) -> impl Future<Output = Result<Vec<Note>>> + Send {
        async move { self.list_records(STORE_NOTES).await }
    }

    fn put_note(&self, note: Note) -> impl Future<Output = Result<()>> + Send {
        async move {
            let id = note.id.0.clone();
            self.put_record(STORE_NOTES, &id, &note).await
        }
    }

    fn remove_note(&self, id: &str) -> impl Future<Output = Result<()>> + Send {
        async move { self.remove_record(STORE_NOTES, id).await }
    }

    fn list_collections(&self) -> impl Future<Output = Result<Vec<Collection>>> + Send {
        async move { self.list_records(STORE_COLLECTIONS).await }
    }

    fn get_collection(&self, id: &str) -> impl Future<Output = Result<Option<Collection>>> + Send {
        async move { self.get_record(STORE_COLLECTIONS, id).await }
    }

    fn put_collection(&self, collection: Collection) -> impl Future<Output = Result<()>> + Send {
        async move {
            let id = collection.id.0.clone();
            self.put_record(STORE_COLLECTIONS, &id, &collection).await
        }
    }

    fn remove_collection(&self, id: &str) -> impl Future<Output = Result<()>> + Send {
        async move { self.remove_record(STORE_COLLECTIONS, id).await }
    }

    fn remove_collection_with_tombstone(
        &self,
        id: &str,
        tombstone: Tombstone,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            let id_owned = id.to_string();
            let tombstone_key = tombstone.entity_id.0.clone();
            let tombstone_json = encode(&tombstone_key, &tombstone).map_err(idb_to_core_error)?;

            self.db
                .transaction(&[STORE_COLLECTIONS, STORE_DELETED_IDS])
                .rw()
                .run(move |t| {
                    let id_owned = id_owned.clone();
                    let tombstone_key = tombstone_key.clone();
                    let tombstone_json = tombstone_json.clone();
                    async move {
                        let collections = t.object_store(STORE_COLLECTIONS)?;
                        collections.delete(&JsString::from(id_owned.as_str())).await?;

                        let deleted_ids = t.object_store(STORE_DELETED_IDS)?;
                        deleted_ids.put_kv(&JsString::from(tombstone_key.as_str()), &tombstone_json).await?;
                        Ok(())
                    }
                })
                .await
                .map_err(idb_to_core_error)
        }
    }

    fn save_entity_with_queue(&self, note: Note, op: QueuedOp) -> impl Future<Output = Result<()>> + Send {
        async move {
            let note_key = note.id.0.clone();
            let note_json = encode(&note_key, &note).map_err(idb_to_core_error)?;
            let entity_id = op.entity_id.0.clone();

            self.db
                .transaction(&[STORE_NOTES, STORE_MUTATION_QUEUE, STORE_SETTINGS])
                .rw()
                .run(move |t| {
                    let note_key = note_key.clone();
                    let note_json = note_json.clone();
                    let entity_id = entity_id.clone();
                    let op = op.clone();
                    async move {
                        let notes = t.object_store(STORE_NOTES)?;
                        notes.put_kv(&JsString::from(note_key.as_str()), &note_json).await?;

                        // Same coalescing policy as `MutationQueue` (§4.2),
                        // applied in-transaction: find the tail op already
                        // queued for this entity, if any, by scanning the
                        // store (no secondary index on entity id).
                        let queue = t.object_store(STORE_MUTATION_QUEUE)?;
                        let mut tail: Option<QueuedOp> = None;
                        let mut same_entity_keys: Vec<String> = Vec::new();
                        let mut cursor = queue.cursor().open().await?;
                        while let Some(key) = cursor.key() {
                            if let Some(s) = key.dyn_ref::<JsString>() {
                                let key_str = String::from(s);
                                if let Some(value) = queue.get(&JsString::from(key_str.as_str())).await? {
                                    let existing: QueuedOp = decode(&key_str, value)?;
                                    if existing.entity_id.0 == entity_id {
                                        same_entity_keys.push(key_str);
                                        if tail.as_ref().map(|t| existing.op_id > t.op_id).unwrap_or(true) {
                                            tail = Some(existing);
                                        }
                                    }
                                }
                            }
                            cursor.advance(1).await?;
                        }

                        match (op.kind, &tail) {
                            (OpKind::Update, Some(t)) if t.kind == OpKind::Delete => {
                                // delete supersedes; refuse the resurrecting update
                            }
                            (OpKind::Update, Some(t)) if t.kind == OpKind::Update && t.attempts == 0 => {
                                let mut replaced = t.clone();
                                replaced.payload = op.payload;
                                replaced.enqueued_at = op.enqueued_at;
                                let key = op_id_key(replaced.op_id);
                                let value = encode(&key, &replaced)?;
                                queue.put_kv(&JsString::from(key.as_str()), &value).await?;
                            }
                            (kind, _) => {
                                if kind == OpKind::Delete {
                                    for key_str in &same_entity_keys {
                                        queue.delete(&JsString::from(key_str.as_str())).await?;
                                    }
                                }
                                let settings = t.object_store(STORE_SETTINGS)?;
                                let next_id = match settings.get(&JsString::from(NEXT_OP_ID_KEY)).await? {
                                    Some(value) => decode::<u64>(NEXT_OP_ID_KEY, value)?,
                                    None => 0,
                                } + 1;
                                let counter = encode(NEXT_OP_ID_KEY, &next_id)?;
                                settings.put_kv(&JsString::from(NEXT_OP_ID_KEY), &counter).await?;

                                let mut new_op = op.clone();
                                new_op.op_id = next_id;
                                let key = op_id_key(next_id);
                                let value = encode(&key, &new_op)?;
                                queue.put_kv(&JsString::from(key.as_str()), &value).await?;
                            }
                        }
                        Ok(())
                    }
                })
                .await
                .map_err(idb_to_core_error)
        }
    }

    fn put_tombstone(&self, tombstone: Tombstone) -> impl Future<Output = Result<()>> + Send {
        async move {
            let id = tombstone.entity_id.0.clone();
            self.put_record(STORE_DELETED_IDS, &id, &tombstone).await
        }
    }

    fn get_tombstone(&self, id: &str) -> impl Future<Output = Result<Option<Tombstone>>> + Send {
        async move { self.get_record(STORE_DELETED_IDS, id).await }
    }

    fn remove_tombstone(&self, id: &str) -> impl Future<Output = Result<()>> + Send {
        async move { self.remove_record(STORE_DELETED_IDS, id).await }
    }

    fn list_queue(&self) -> impl Future<Output = Result<Vec<QueuedOp>>> + Send {
        async move {
            let mut ops: Vec<QueuedOp> = self.list_records(STORE_MUTATION_QUEUE).await?;
            ops.sort_by_key(|op| op.op_id);
            Ok(ops)
        }
    }

    fn enqueue_op(&self, mut op: QueuedOp) -> impl Future<Output = Result<QueuedOp>> + Send {
        async move {
            let assigned = self
                .db
                .transaction(&[STORE_MUTATION_QUEUE, STORE_SETTINGS])
                .rw()
                .run(move |t| {
                    let mut op = op.clone();
                    async move {
                        let settings = t.object_store(STORE_SETTINGS)?;
                        let next_id = match settings.get(&JsString::from(NEXT_OP_ID_KEY)).await? {
                            Some(value) => decode::<u64>(NEXT_OP_ID_KEY, value)?,
                            None => 0,
                        } + 1;
                        op.op_id = next_id;

                        let counter = encode(NEXT_OP_ID_KEY, &next_id)?;
                        settings.put_kv(&JsString::from(NEXT_OP_ID_KEY), &counter).await?;

                        let queue = t.object_store(STORE_MUTATION_QUEUE)?;
                        let key = op_id_key(op.op_id);
                        let value = encode(&key, &op)?;
                        queue.put_kv(&JsString::from(key.as_str()), &value).await?;
                        Ok(op)
                    }
                })
                .await
                .map_err(idb_to_core_error)?;
            Ok(assigned)
        }
    }

    fn put_op(&self, op: QueuedOp) -> impl Future<Output = Result<()>> + Send {
        async move {
            let key = op_id_key(op.op_id);
            self.put_record(STORE_MUTATION_QUEUE, &key, &op).await
        }
    }

    fn remove_op(&self, op_id: u64) -> impl Future<Output = Result<()>> + Send {
        async move { self.remove_record(STORE_MUTATION_QUEUE, &op_id_key(op_id)).await }
    }

    fn get_shadow(&self, note_id: &str) -> impl Future<Output = Result<Option<SyncShadow>>> + Send {
        async move { self.get_record(STORE_SYNC_SHADOW, note_id).await }
    }

    fn put_shadow(&self, note_id: &str, shadow: SyncShadow) -> impl Future<Output = Result<()>> + Send {
        async move { self.put_record(STORE_SYNC_SHADOW, note_id, &shadow).await }
    }

    fn remove_shadow(&self, note_id: &str) -> impl Future<Output = Result<()>> + Send {
        async move { self.remove_record(STORE_SYNC_SHADOW, note_id).await }
    }

    fn get_settings(&self) -> impl Future<Output = Result<Settings>> + Send {
        async move { Ok(self.get_record(STORE_SETTINGS, SETTINGS_KEY).await?.unwrap_or_default()) }
    }

    fn put_settings(&self, settings: Settings) -> impl Future<Output = Result<()>> + Send {
        async move { self.put_record(STORE_SETTINGS, SETTINGS_KEY, &settings).await }
    }

    fn is_available(&self) -> impl Future<Output = bool> + Send {
        async move { true }
    }
}
