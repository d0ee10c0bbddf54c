//! Collaboration Session: a CRDT-backed peer session layered on top
//! of the same `Note` record the sync engine pushes and pulls, decoupled
//! from `gnote_sync` so the CRDT/peer stack never depends on the Drive
//! client. The two subsystems only ever meet through
//! `gnote_core::session::ActiveCollabMarker`.

pub mod awareness;
pub mod config;
pub mod document;
pub mod error;
pub mod session;
pub mod session_cache;
#[cfg(not(target_arch = "wasm32"))]
pub mod tokio_transport;
pub mod transport;

pub use error::{CollabError, Result};
