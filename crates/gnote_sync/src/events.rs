//! Observable process state emitted by the Sync Engine: a closed,
//! serializable event enum rather than ad hoc strings, so a JS host can
//! discriminate on `.type`.

use serde::Serialize;

/// Lifecycle events emitted over the course of a sync cycle or a
/// migration run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// A sync cycle started.
    SyncStarted,
    /// A sync cycle finished.
    SyncFinished {
        /// Whether the cycle completed without a terminal failure.
        ok: bool,
        /// Counters for what happened during the cycle.
        stats: SyncStats,
    },
    /// A sync cycle hit a terminal, process-visible error.
    SyncError {
        /// Error kind tag (mirrors `SyncError`'s variant name).
        code: String,
        /// Human-readable detail.
        message: String,
    },
    /// A queued op was retried after a retryable failure.
    OpRetried {
        /// Id of the op in the mutation queue.
        op_id: u64,
        /// Number of attempts made so far, including this one.
        attempts: u32,
    },
    /// A note's reconcile failures reached the health tracker's
    /// threshold; its shadow was discarded to force a full re-pull on
    /// the next cycle instead of repeating the same failure forever.
    NoteHealthEscalated {
        /// Id of the note whose shadow was discarded.
        note_id: String,
    },
    /// Progress update for a running migration.
    MigrationProgress {
        /// Notes re-pointed so far.
        notes_processed: usize,
        /// Collections removed so far.
        collections_removed: usize,
        /// Remote collection files deleted so far.
        drive_files_deleted: usize,
        /// Milliseconds elapsed since the migration started.
        elapsed_ms: i64,
    },
}

/// Current status of the sync engine, independent of any one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SyncStatus {
    /// No cycle in progress, nothing queued.
    Idle,
    /// Draining the mutation queue (push path).
    Draining,
    /// Listing and reconciling remote state (pull path).
    Pulling,
    /// Committing reconciled state to the object store.
    Writing,
}

/// Per-cycle counters reported in `SyncFinished`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncStats {
    /// Ops successfully pushed.
    pub pushed: usize,
    /// Remote records pulled and reconciled.
    pub pulled: usize,
    /// Conflicts resolved during this cycle.
    pub conflicts: usize,
    /// Ops that failed terminally and were dropped.
    pub failed: usize,
}
