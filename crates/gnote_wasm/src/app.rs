//! `#[wasm_bindgen]` entrypoints exposing the sync engine, note state
//! core and migration engine to the browser host behind one
//! JS-facing object. `web_sys`/`wasm_bindgen` structs can't carry
//! lifetimes or be generic, so unlike `gnote_sync::engine::SyncEngine`
//! (which borrows its store/remote), `GNoteApp` owns both and builds a
//! fresh, short-lived `SyncEngine`/`MigrationEngine` inside each method
//! body, wrapping its owned state behind a single command surface.

use std::time::Duration;

use gnote_core::config::NoteCoreConfig;
use gnote_core::error::GNoteError;
use gnote_core::note_core::NoteStateCore;
use gnote_core::session::{AccessToken, Session};
use gnote_sync::config::SyncEngineConfig;
use gnote_sync::engine::SyncEngine;
use gnote_sync::migration::MigrationEngine;
use gnote_sync::remote::GoogleDriveClient;
use js_sys::Function;
use wasm_bindgen::prelude::*;

use crate::error::{IntoJsOption, IntoJsResult};
use crate::indexeddb_store::IndexedDbObjectStore;
use crate::js_refresh::JsRefreshCallback;

pub(crate) fn now_ms() -> i64 {
    js_sys::Date::now() as i64
}

/// The JS-facing application object: one IndexedDB-backed store, one
/// device id, and (once `signIn` is called) one Drive remote client and
/// session.
#[wasm_bindgen]
pub struct GNoteApp {
    store: IndexedDbObjectStore,
    device_id: String,
    note_core_config: NoteCoreConfig,
    sync_config: SyncEngineConfig,
    session: Session,
    remote: Option<GoogleDriveClient>,
}

impl GNoteApp {
    /// Store handle, for `collab_client` to wire a collaboration
    /// session's snapshot writes through the same `NoteStateCore` path
    /// as every other mutator.
    pub(crate) fn store(&self) -> &IndexedDbObjectStore {
        &self.store
    }

    /// Session handle, for `collab_client` to attach/detach the active
    /// collaboration marker around a session's lifecycle.
    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn note_core_config(&self) -> NoteCoreConfig {
        self.note_core_config
    }

    pub(crate) fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Reject a note mutation if a collaboration session currently owns
    /// `id` — `NoteStateCore::suspended` resets on every call here (a
    /// `wasm_bindgen` struct can't hold a borrow across calls), so this
    /// app checks the durable `Session::active_collab` marker instead,
    /// which `collab_client::CollabClient` keeps in sync with the
    /// session's actual lifecycle.
    fn ensure_not_collab_suspended(&self, id: &str) -> gnote_core::error::Result<()> {
        match self.session.active_collab() {
            Some(marker) if marker.note_id.0 == id => {
                Err(GNoteError::AutosaveSuspended { id: id.to_string() })
            }
            _ => Ok(()),
        }
    }
}

#[wasm_bindgen]
impl GNoteApp {
    /// Open (or create) the browser's IndexedDB-backed object store and
    /// build an app bound to it. `device_id` feeds the reconciler's
    /// final, stable tie-break and should be a value that is itself
    /// stable across reloads on the same browser profile.
    #[wasm_bindgen(js_name = "create")]
    pub async fn create(device_id: String, refresh_token_js: Option<Function>) -> Result<GNoteApp, JsValue> {
        let store = IndexedDbObjectStore::open().await.js_err()?;
        let refresh_cb = refresh_token_js.map(|f| {
            Box::new(JsRefreshCallback::new(f)) as Box<dyn gnote_core::session::RefreshTokenCallback>
        });
        Ok(GNoteApp {
            store,
            device_id,
            note_core_config: NoteCoreConfig::default(),
            sync_config: SyncEngineConfig::default(),
            session: Session::new(refresh_cb),
            remote: None,
        })
    }

    /// Whether the underlying IndexedDB store actually came up. Hosts
    /// call this at startup; `false` means the app should fall back to
    /// ephemeral, in-memory-only mode.
    #[wasm_bindgen(js_name = "isStoreAvailable")]
    pub async fn is_store_available(&self) -> bool {
        use gnote_core::store::ObjectStore;
        self.store.is_available().await
    }

    /// Sign in: records the user id and initial access token so later
    /// sync cycles can authenticate, and configures the Drive client.
    #[wasm_bindgen(js_name = "signIn")]
    pub fn sign_in(&mut self, user_id: String, access_token: String, expires_in_sec: i64) {
        let expires_at_ms = now_ms() + expires_in_sec * 1_000;
        self.session.sign_in(&user_id, AccessToken { token: access_token.clone(), expires_at_ms });
        self.remote = Some(GoogleDriveClient::new(
            access_token,
            Duration::from_millis(self.sync_config.request_timeout_ms),
        ));
    }

    /// Sign out: clears identity, token and the Drive client.
    #[wasm_bindgen(js_name = "signOut")]
    pub fn sign_out(&mut self) {
        self.session.sign_out();
        self.remote = None;
    }

    #[wasm_bindgen(js_name = "setOnline")]
    pub fn set_online(&self, online: bool) {
        self.session.set_online(online);
    }

    // -- Note State Core -------------------------------------------------

    #[wasm_bindgen(js_name = "listNotes")]
    pub async fn list_notes(&self) -> Result<JsValue, JsValue> {
        use gnote_core::store::ObjectStore;
        let notes = self.store.list_notes().await.js_err()?;
        serde_wasm_bindgen::to_value(&notes).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = "addNote")]
    pub async fn add_note(&self, id: String, title: String) -> Result<JsValue, JsValue> {
        let core = NoteStateCore::new(&self.store, self.note_core_config, self.device_id.clone());
        let note = core.add_note(id, title, now_ms()).await.js_err()?;
        serde_wasm_bindgen::to_value(&note).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = "updateNoteTitle")]
    pub async fn update_note_title(&self, id: String, title: String) -> Result<JsValue, JsValue> {
        self.ensure_not_collab_suspended(&id).js_err()?;
        let core = NoteStateCore::new(&self.store, self.note_core_config, self.device_id.clone());
        let note = core
            .update_note(&id, |n| n.title = title, now_ms())
            .await
            .js_err()?;
        serde_wasm_bindgen::to_value(&note).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = "updateNoteContent")]
    pub async fn update_note_content(&self, id: String, content: Vec<u8>) -> Result<JsValue, JsValue> {
        self.ensure_not_collab_suspended(&id).js_err()?;
        let core = NoteStateCore::new(&self.store, self.note_core_config, self.device_id.clone());
        let note = core
            .update_note(&id, |n| n.content = content, now_ms())
            .await
            .js_err()?;
        serde_wasm_bindgen::to_value(&note).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = "togglePin")]
    pub async fn toggle_pin(&self, id: String) -> Result<JsValue, JsValue> {
        let core = NoteStateCore::new(&self.store, self.note_core_config, self.device_id.clone());
        let note = core.toggle_pin(&id, now_ms()).await.js_err()?;
        serde_wasm_bindgen::to_value(&note).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = "moveToTrash")]
    pub async fn move_to_trash(&self, id: String) -> Result<JsValue, JsValue> {
        let core = NoteStateCore::new(&self.store, self.note_core_config, self.device_id.clone());
        let note = core.move_to_trash(&id, now_ms()).await.js_err()?;
        serde_wasm_bindgen::to_value(&note).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = "restoreFromTrash")]
    pub async fn restore_from_trash(&self, id: String) -> Result<JsValue, JsValue> {
        let core = NoteStateCore::new(&self.store, self.note_core_config, self.device_id.clone());
        let note = core.restore(&id, now_ms()).await.js_err()?;
        serde_wasm_bindgen::to_value(&note).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = "permanentlyDelete")]
    pub async fn permanently_delete(&self, id: String) -> Result<(), JsValue> {
        let core = NoteStateCore::new(&self.store, self.note_core_config, self.device_id.clone());
        core.permanently_delete(&id, now_ms()).await.js_err()
    }

    #[wasm_bindgen(js_name = "duplicate")]
    pub async fn duplicate(&self, id: String, new_id: String) -> Result<JsValue, JsValue> {
        let core = NoteStateCore::new(&self.store, self.note_core_config, self.device_id.clone());
        let note = core.duplicate(&id, new_id, now_ms()).await.js_err()?;
        serde_wasm_bindgen::to_value(&note).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    // -- Sync Engine -------------------------------------------------

    /// Run one drain/pull/write cycle. Returns the JSON-encoded
    /// list of `SyncEvent`s emitted during the cycle.
    #[wasm_bindgen(js_name = "syncCycle")]
    pub async fn sync_cycle(&self) -> Result<JsValue, JsValue> {
        let remote = self
            .remote
            .as_ref()
            .js_ok_or("signIn must be called before syncCycle")?;
        let engine = SyncEngine::new(&self.store, remote, self.sync_config, self.device_id.clone());
        let events = engine.trigger_cycle(&self.session).await.js_err()?;
        serde_wasm_bindgen::to_value(&events).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    // -- Migration Engine ---------------------------------------------

    /// Run (or no-op re-run) migration M1, removing the legacy
    /// collections feature.
    #[wasm_bindgen(js_name = "runMigrationM1")]
    pub async fn run_migration_m1(&self) -> Result<JsValue, JsValue> {
        let engine = MigrationEngine::new(&self.store);
        let events = match &self.remote {
            Some(remote) => engine.run_m1(Some(remote), now_ms()).await.js_err()?,
            None => engine.run_m1::<GoogleDriveClient>(None, now_ms()).await.js_err()?,
        };
        serde_wasm_bindgen::to_value(&events).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
