//! Durable local state for GNote: the object store, mutation queue and
//! the in-memory note model that mutators operate on.
//!
//! This crate is platform-agnostic. The browser-backed [`store::ObjectStore`]
//! implementation over IndexedDB lives in `gnote_wasm`; this crate only
//! ships the trait and an in-memory implementation used for tests and
//! native hosts.

pub mod config;
pub mod error;
pub mod memory_store;
pub mod model;
pub mod note_core;
pub mod queue;
pub mod session;
pub mod store;

pub use error::{GNoteError, Result};
