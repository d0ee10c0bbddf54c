//! Reconciler: the three-way merge between local state, the remote
//! record, and the last-known-remote shadow.
//!
//! The remote record has the exact same shape as a local [`Note`] — per
//! the external interfaces section, a remote note file's content *is* a
//! serialized `Note` record, fields exactly as the data model defines
//! them — so this module merges two `Note`s against a `SyncShadow`
//! rather than inventing a parallel "remote note" type.

use std::collections::HashMap;
use std::sync::Mutex;

use gnote_core::model::{Note, SyncShadow};

/// What the Sync Engine should do with a single note after reconciling
/// it against the remote and the shadow.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Upload `L` — it has never been seen on the remote.
    PushCreate(Note),
    /// The remote copy is gone; propagate the delete locally.
    PushDeleteLocal,
    /// A new remote note with no local or shadow counterpart.
    PullInsert(Note),
    /// Locally deleted (tombstoned); delete the remote copy.
    PushDeleteRemote,
    /// Local changed, remote didn't: push local, advance shadow to it.
    Push(Note),
    /// Remote changed, local didn't: pull remote, advance shadow to it.
    Pull(Note),
    /// Neither side changed relative to the shadow.
    NoOp,
    /// Both sides changed: a conflict, resolved to a winner.
    Conflict {
        /// The note that wins and becomes canonical.
        winner: Note,
        /// Preserved only as a diagnostic; never synced or shown.
        loser: Note,
    },
}

/// Decide the outcome for a single note given its local record (if any),
/// the remote record (if any), the last sync shadow (if any), and the
/// `deletedAt` of a tombstone for this id, if one is currently recorded.
///
/// Implements the full local/remote/shadow case matrix, including the
/// resurrection carve-out ("L, no R, shadow, but L.version > shadow.version
/// pushes a create instead of propagating a local delete") and the
/// tombstone-before-matrix rule.
pub fn reconcile(
    local: Option<&Note>,
    remote: Option<&Note>,
    shadow: Option<&SyncShadow>,
    tombstone_deleted_at: Option<i64>,
) -> ReconcileOutcome {
    if let Some(deleted_at) = tombstone_deleted_at {
        // The tombstone dominates unless the remote carries a strictly
        // newer `updatedAt` than the tombstone's own `deletedAt` — not
        // the shadow's `remote_updated_at`, which only reflects the
        // remote state as of the last successful sync and says nothing
        // about an edit a peer made after that but before this device's
        // delete.
        let remote_is_newer = remote.map(|r| r.updated_at > deleted_at).unwrap_or(false);
        if !remote_is_newer {
            return ReconcileOutcome::PushDeleteRemote;
        }
        // A remote edit strictly newer than the tombstone wins over the
        // delete: fall through to the normal matrix.
    }

    match (local, remote, shadow) {
        (Some(l), None, None) => ReconcileOutcome::PushCreate(l.clone()),
        (Some(l), None, Some(s)) => {
            if l.version > s.version {
                ReconcileOutcome::PushCreate(l.clone())
            } else {
                ReconcileOutcome::PushDeleteLocal
            }
        }
        (None, Some(r), None) => ReconcileOutcome::PullInsert(r.clone()),
        (None, Some(_), Some(_)) => ReconcileOutcome::PushDeleteRemote,
        (Some(l), Some(r), shadow) => merge_both_present(l, r, shadow),
        (None, None, _) => ReconcileOutcome::NoOp,
    }
}

fn merge_both_present(local: &Note, remote: &Note, shadow: Option<&SyncShadow>) -> ReconcileOutcome {
    let (shadow_version, shadow_updated_at) = shadow
        .map(|s| (s.version, s.remote_updated_at))
        .unwrap_or((0, 0));

    let local_changed = local.version > shadow_version || local.updated_at > shadow_updated_at;
    let remote_changed = remote.version > shadow_version || remote.updated_at > shadow_updated_at;

    match (local_changed, remote_changed) {
        (true, false) => ReconcileOutcome::Push(local.clone()),
        (false, true) => ReconcileOutcome::Pull(remote.clone()),
        (false, false) => ReconcileOutcome::NoOp,
        (true, true) => {
            let (winner, loser) = resolve_conflict(local, remote);
            ReconcileOutcome::Conflict { winner, loser }
        }
    }
}

/// Resolve a genuine conflict by a fixed tie-break chain:
/// `max(version)`, then `max(updatedAt)`, then "larger content wins",
/// then device id lexicographically.
fn resolve_conflict(local: &Note, remote: &Note) -> (Note, Note) {
    if local.version != remote.version {
        return if local.version > remote.version {
            (local.clone(), remote.clone())
        } else {
            (remote.clone(), local.clone())
        };
    }
    if local.updated_at != remote.updated_at {
        return if local.updated_at > remote.updated_at {
            (local.clone(), remote.clone())
        } else {
            (remote.clone(), local.clone())
        };
    }
    let local_has_content = !local.content.is_empty();
    let remote_has_content = !remote.content.is_empty();
    if local_has_content != remote_has_content {
        return if local_has_content {
            (local.clone(), remote.clone())
        } else {
            (remote.clone(), local.clone())
        };
    }
    if local.device_id != remote.device_id {
        return if local.device_id < remote.device_id {
            (local.clone(), remote.clone())
        } else {
            (remote.clone(), local.clone())
        };
    }
    // Fully identical on every tie-break field: stable, arbitrary pick.
    (local.clone(), remote.clone())
}

/// A remote file whose content failed to parse as a `Note`. The
/// reconciler skips it with a warning rather than deleting it —
/// corrupted remote content is never destructive.
pub fn is_collection_shaped(raw: &serde_json::Value) -> bool {
    raw.get("noteIds").and_then(|v| v.as_array()).is_some()
}

/// What a cycle should do with a note after a failed reconcile attempt
/// (download or parse failure pulling it from the remote).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// Below the failure threshold: skip this note for the rest of the
    /// cycle and retry it on the next one.
    Skip,
    /// At or past the threshold: the shadow for this note has been
    /// discarded, forcing a full re-pull (or resurrection, if the note
    /// only exists locally) on the next cycle rather than repeating
    /// whatever keeps failing against a stale baseline.
    Escalated,
}

/// Tracks consecutive reconcile failures per note, so a note that keeps
/// failing to pull (corrupt bytes, a transient server error that never
/// resolves) eventually gets its shadow discarded instead of being
/// skipped silently forever. A single success clears the count.
pub struct HealthTracker {
    threshold: u32,
    failures: Mutex<HashMap<String, u32>>,
}

impl HealthTracker {
    pub fn new(threshold: u32) -> Self {
        HealthTracker { threshold: threshold.max(1), failures: Mutex::new(HashMap::new()) }
    }

    /// Record a reconcile failure for `note_id`. Returns `Escalated` and
    /// resets the count once `threshold` consecutive failures accrue.
    pub fn record_failure(&self, note_id: &str) -> HealthOutcome {
        let mut failures = self.failures.lock().unwrap();
        let count = failures.entry(note_id.to_string()).or_insert(0);
        *count += 1;
        if *count >= self.threshold {
            failures.remove(note_id);
            HealthOutcome::Escalated
        } else {
            HealthOutcome::Skip
        }
    }

    /// Clear the failure count for `note_id` after a successful
    /// reconcile.
    pub fn record_success(&self, note_id: &str) {
        self.failures.lock().unwrap().remove(note_id);
    }
}
