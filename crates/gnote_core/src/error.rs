//! Error types for the object store, mutation queue and note state core.
//!
//! Every error that crosses a component boundary is a tagged variant —
//! never a free-form string — so callers can branch on `kind` instead of
//! matching message text.

use thiserror::Error;

/// Errors produced by [`crate::store`], [`crate::queue`] and [`crate::note_core`].
#[derive(Debug, Error)]
pub enum GNoteError {
    /// The underlying store (IndexedDB, or its in-memory stand-in) could not
    /// be opened or is not available in this environment.
    #[error("object store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored record failed to decode, or a write violated a store
    /// invariant (e.g. writing a queue op without its owning entity).
    #[error("invalid record {id}: {message}")]
    InvalidRecord {
        /// Id of the offending record.
        id: String,
        /// Human-readable detail, not meant for end users.
        message: String,
    },

    /// The mutation queue's on-disk representation could not be read back
    /// in order.
    #[error("mutation queue corrupt: {0}")]
    QueueCorrupt(String),

    /// Requested entity does not exist in the store.
    #[error("not found: {entity_type} {id}")]
    NotFound {
        /// `note` or `collection`.
        entity_type: &'static str,
        /// Id that was looked up.
        id: String,
    },

    /// Rejected write: the note is under an active collaboration session
    /// and autosave is suspended for it.
    #[error("autosave suspended for note {id}: an active collaboration session owns it")]
    AutosaveSuspended {
        /// Id of the note autosave was attempted against.
        id: String,
    },
}

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, GNoteError>;
