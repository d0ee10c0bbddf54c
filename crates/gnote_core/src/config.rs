//! Configuration for the note state core's autosave behavior.
//!
//! Hosts build this from whatever config layer they have (JSON, a
//! settings UI, ...); this crate never reads env vars or files itself —
//! there is no CLI surface and no env vars on the client side.

use serde::{Deserialize, Serialize};

/// Debounce knobs for [`crate::note_core::NoteStateCore`]'s autosave path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteCoreConfig {
    /// Idle debounce before an autosave flush, in milliseconds.
    pub autosave_idle_ms: u64,
    /// Forced flush interval even under continuous edits, in milliseconds.
    pub autosave_force_ms: u64,
}

impl Default for NoteCoreConfig {
    fn default() -> Self {
        NoteCoreConfig {
            autosave_idle_ms: 1_000,
            autosave_force_ms: 5_000,
        }
    }
}
