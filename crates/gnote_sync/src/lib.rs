//! The sync half of GNote: the Drive remote client, the index/folder
//! layer, the three-way reconciler, the sync engine that orchestrates
//! them, and the one-shot migration engine.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod index;
pub mod migration;
pub mod reconciler;
pub mod remote;

pub use error::{Result, SyncError};
