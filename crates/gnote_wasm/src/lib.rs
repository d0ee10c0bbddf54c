#![cfg(target_arch = "wasm32")]
//! Browser bindings for GNote: an `IndexedDbObjectStore` implementing
//! `gnote_core::store::ObjectStore`, a `web_sys::WebSocket`-backed
//! `PeerTransport` for the collaboration session, and the
//! `#[wasm_bindgen]` surface (`GNoteApp`, `CollabClient`) a JS host
//! drives the Sync Engine, Note State Core and Migration Engine through.
//!
//! This is the only crate in the workspace that touches
//! `wasm-bindgen`/`web-sys`; `gnote_core`, `gnote_sync` and
//! `gnote_collab` compile natively for the rest of the workspace's
//! tests.

mod app;
mod collab_client;
mod error;
mod indexeddb_store;
mod js_refresh;
mod transport;

pub use app::GNoteApp;
pub use collab_client::CollabClient;
pub use indexeddb_store::IndexedDbObjectStore;
pub use transport::BrowserWebSocketTransport;

use wasm_bindgen::prelude::*;

/// Called automatically by the generated JS glue on module load: wires
/// panics into `console.error` and routes `log`/`tracing` macros to the
/// browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Info).ok();
}
