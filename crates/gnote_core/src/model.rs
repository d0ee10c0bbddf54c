//! The data model: `Note`, `Collection`, `Tombstone`, `QueuedOp` and
//! `SyncShadow`.
//!
//! `NoteId` and `RemoteFileId` are thin newtypes rather than bare
//! `String`s: the reconciler and index layer both juggle a local id and a
//! remote file id for the same note side by side, and the two are easy
//! to transpose if they share a type.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque local identifier for a note or collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(pub String);

impl std::fmt::Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NoteId {
    fn from(s: String) -> Self {
        NoteId(s)
    }
}

impl From<&str> for NoteId {
    fn from(s: &str) -> Self {
        NoteId(s.to_string())
    }
}

/// Opaque remote (Drive) file identifier, assigned on first successful
/// upload and never reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteFileId(pub String);

impl From<String> for RemoteFileId {
    fn from(s: String) -> Self {
        RemoteFileId(s)
    }
}

/// Per-note sync status surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SyncStatus {
    /// Queued locally, not yet confirmed on the remote.
    Pending,
    /// Remote and local agree as of the last successful cycle.
    Synced,
    /// The last attempt to sync this entity failed terminally.
    Error,
}

/// Which entity kind a tombstone or queued op refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    /// A `Note`.
    Note,
    /// A `Collection` (legacy, removed by migration M1).
    Collection,
}

/// A single note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Stable local id, assigned once at creation.
    pub id: NoteId,
    /// Unicode title.
    pub title: String,
    /// Opaque editor-document blob (HTML or a serialized CRDT snapshot).
    /// Treated as bytes by this crate.
    pub content: Vec<u8>,
    /// Monotonic milliseconds since epoch, set at creation.
    pub created_at: i64,
    /// Monotonic milliseconds since epoch, non-decreasing within a device.
    pub updated_at: i64,
    /// Pinned to the top of the note list.
    pub is_pinned: bool,
    /// Soft-delete flag (trash).
    pub is_deleted: bool,
    /// Set when `is_deleted` transitions to true; cleared on restore.
    pub deleted_at: Option<i64>,
    /// Monotone non-negative integer, bumped on every local mutation.
    pub version: u64,
    /// Local view of whether this note is reconciled with the remote.
    pub sync_status: SyncStatus,
    /// Remote file handle, assigned on first successful upload. Never
    /// reassigned once non-empty.
    pub remote_file_id: Option<RemoteFileId>,
    /// Handle for the view-only published copy, if any.
    pub public_file_id: Option<RemoteFileId>,
    /// Legacy grouping key, removed by migration M1.
    pub collection_id: Option<NoteId>,
    /// Opaque presentation descriptor (color, font, etc).
    pub style: Option<String>,
    /// Derived from whether a collaboration session has ever attached.
    pub is_shared: bool,
    /// Stable id of the device that produced this version, used only as
    /// the last, stable tie-break in the reconciler's conflict
    /// resolution chain (device id lexicographically).
    pub device_id: String,
}

impl Note {
    /// Construct a brand-new note with `version = 1` and both timestamps
    /// set to `now_ms`.
    pub fn new(id: impl Into<NoteId>, title: impl Into<String>, now_ms: i64, device_id: impl Into<String>) -> Self {
        Note {
            id: id.into(),
            title: title.into(),
            content: Vec::new(),
            created_at: now_ms,
            updated_at: now_ms,
            is_pinned: false,
            is_deleted: false,
            deleted_at: None,
            version: 1,
            sync_status: SyncStatus::Pending,
            remote_file_id: None,
            public_file_id: None,
            collection_id: None,
            style: None,
            is_shared: false,
            device_id: device_id.into(),
        }
    }

    /// Two notes are content-equal if every field except `version`,
    /// `updated_at` and `sync_status` matches. Used by the reconciler to
    /// decide whether a "change" actually changed anything worth writing.
    pub fn is_content_equal(&self, other: &Note) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.content == other.content
            && self.is_pinned == other.is_pinned
            && self.is_deleted == other.is_deleted
            && self.collection_id == other.collection_id
            && self.style == other.style
    }

    /// Mark this note deleted: clears `collection_id` and sets
    /// `deleted_at`.
    pub fn mark_deleted(&mut self, now_ms: i64) {
        self.is_deleted = true;
        self.deleted_at = Some(now_ms);
        self.collection_id = None;
    }
}

/// A legacy grouping of notes, kept only until migration M1 runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Stable local id.
    pub id: NoteId,
    /// Display name.
    pub name: String,
    /// UI accent color.
    pub color: Option<String>,
    /// Ordered set of member note ids.
    pub note_ids: Vec<NoteId>,
    /// Whether the collection is expanded in the sidebar.
    pub is_expanded: bool,
    /// Creation timestamp, ms.
    pub created_at: i64,
    /// Last-modified timestamp, ms.
    pub updated_at: i64,
    /// Monotone version counter.
    pub version: u64,
    /// Local sync status.
    pub sync_status: SyncStatus,
    /// Remote file handle, if uploaded.
    pub remote_file_id: Option<RemoteFileId>,
}

/// A persisted marker that an entity was deleted, used to suppress
/// resurrection on a later pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Id of the deleted entity.
    pub entity_id: NoteId,
    /// Whether the deleted entity was a note or a collection.
    pub entity_type: EntityType,
    /// When the delete was recorded, ms.
    pub deleted_at: i64,
}

/// The kind of mutation a [`QueuedOp`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpKind {
    /// First upload of a brand-new entity.
    Create,
    /// Update to an already-uploaded entity.
    Update,
    /// Permanent remote deletion.
    Delete,
}

/// An entry in the mutation queue. Ordered by `op_id` insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOp {
    /// Monotonic id assigned by the queue's auto-increment store.
    pub op_id: u64,
    /// What kind of mutation this is.
    pub kind: OpKind,
    /// Note or collection.
    pub entity_type: EntityType,
    /// Id of the entity this op applies to.
    pub entity_id: NoteId,
    /// Serialized payload to send (absent for deletes).
    pub payload: Option<Vec<u8>>,
    /// When this op was enqueued, ms.
    pub enqueued_at: i64,
    /// Number of times a drain pass has attempted this op.
    pub attempts: u32,
    /// Message from the most recent failed attempt, if any.
    pub last_error: Option<String>,
}

/// The last-known-remote baseline for a note, used as the third input of
/// the reconciler's three-way merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncShadow {
    /// Remote version as of the last successful pull or push.
    pub version: u64,
    /// Remote `updatedAt` as of the last successful pull or push.
    pub remote_updated_at: i64,
    /// Content hash of the remote body, used as a cheap change probe.
    pub content_hash: String,
}

/// Settings store (the `settings` table): small free-form key/value bag
/// plus the two keys every host cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Version of the last migration that ran to completion.
    pub migration_version: u64,
    /// Millis timestamp of the last completed sync cycle.
    pub last_sync_time: Option<i64>,
    /// Anything else a host wants to persist under `settings`.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}
