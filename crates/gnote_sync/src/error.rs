//! The Remote Client's error taxonomy, mapped from HTTP status + body,
//! plus the reconciler and migration errors layered on top of it.

use thiserror::Error;

/// Errors surfaced by the remote client, reconciler, sync engine and
/// migration engine. Every mutating remote call maps its HTTP response
/// into exactly one of these variants before it crosses back into
/// `SyncEngine` — no free-form strings travel past the client boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    /// 401: the bearer token has expired. The engine attempts exactly
    /// one refresh before giving up.
    #[error("auth expired")]
    AuthExpired,

    /// 403 without a quota signal: terminal for the op.
    #[error("permission denied")]
    PermissionDenied,

    /// 403 with a quota signal, or 429: terminal for the op.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// 404 on a read (404 on delete is treated as success, not this
    /// variant).
    #[error("not found")]
    NotFound,

    /// 412: the `If-Match` precondition did not hold. Retryable by
    /// rerouting through the reconciler rather than retrying the same
    /// write blindly.
    #[error("precondition failed")]
    PreconditionFailed,

    /// The remote body failed to parse as a note/collection/index
    /// record.
    #[error("corrupted remote content: {0}")]
    Corrupted(String),

    /// Timeout, connection failure, 5xx: retryable with backoff.
    #[error("network error: {0}")]
    NetworkError(String),

    /// A reconciler-internal failure (e.g. both sides unreadable).
    #[error("reconcile error: {0}")]
    Reconcile(String),

    /// A migration-internal failure.
    #[error("migration error: {0}")]
    Migration(String),

    /// Wraps a local object-store failure surfaced while syncing.
    #[error(transparent)]
    Store(#[from] gnote_core::error::GNoteError),
}

impl SyncError {
    /// Whether the Sync Engine should retry this op with backoff rather
    /// than dropping it from the queue.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::NetworkError(_) | SyncError::PreconditionFailed)
    }

    /// Whether this error is terminal for the op it occurred on —
    /// surfaced to the UI and dropped from the queue rather than
    /// retried.
    pub fn is_terminal_for_op(&self) -> bool {
        matches!(
            self,
            SyncError::PermissionDenied | SyncError::QuotaExceeded | SyncError::Corrupted(_)
        )
    }
}

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SyncError>;
