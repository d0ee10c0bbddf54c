//! Error taxonomy for the collaboration session: room lookup, transport
//! and CRDT failures, none of which cross this crate's boundary as
//! free-form strings.

use thiserror::Error;

/// Errors produced by [`crate::session`], [`crate::document`] and
/// [`crate::transport`].
#[derive(Debug, Error)]
pub enum CollabError {
    /// The signaling server reports no such room. Joining probes for
    /// existence first so a mistyped room id never silently forks a new
    /// room.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// The peer transport failed to connect, send, or was dropped.
    #[error("transport error: {0}")]
    Transport(String),

    /// A CRDT update failed to decode or apply.
    #[error("crdt error: {0}")]
    Crdt(String),

    /// Projecting the CRDT document to a serializable snapshot failed.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Wraps a local object-store failure surfaced while persisting a
    /// session snapshot through the note state core.
    #[error(transparent)]
    Store(#[from] gnote_core::error::GNoteError),
}

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CollabError>;
