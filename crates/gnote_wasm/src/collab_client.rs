//! `#[wasm_bindgen]` wrapper around `gnote_collab::session::CollabSession`
//! parameterized over this crate's `BrowserWebSocketTransport`.
//!
//! A thin JS-facing object that delegates all protocol logic to the
//! shared session type, exposing only what a JS host needs to drive it
//! (host/join, edit, cursor, end-of-session snapshot).

use std::sync::Arc;

use gnote_collab::awareness::{AwarenessState, Cursor};
use gnote_collab::config::CollabConfig;
use gnote_collab::session::CollabSession;
use gnote_core::note_core::NoteStateCore;
use gnote_core::model::NoteId;
use gnote_core::session::ActiveCollabMarker;
use wasm_bindgen::prelude::*;

use crate::app::{now_ms, GNoteApp};
use crate::error::IntoJsResult;
use crate::transport::BrowserWebSocketTransport;

/// A live collaboration session, wired to a browser `WebSocket`.
///
/// Owns the `Session::active_collab` marker for as long as it lives:
/// `host`/`join` set it (via `app`), and `end` clears it again after
/// the host's final snapshot has been written back through
/// `NoteStateCore`. A `CollabClient` dropped without calling `end` (a
/// tab closing mid-session) leaves the marker attached — the host
/// application is expected to call `end` from a `beforeunload`-style
/// hook to avoid note mutations staying rejected forever.
#[wasm_bindgen]
pub struct CollabClient {
    session: Arc<CollabSession<BrowserWebSocketTransport>>,
}

#[wasm_bindgen]
impl CollabClient {
    /// Start a new room as host, seeding the CRDT document from the
    /// note's current content, and suspend the note's autosave on `app`
    /// for the session's duration.
    #[wasm_bindgen(js_name = "host")]
    pub async fn host(
        app: &GNoteApp,
        note_id: String,
        content: Vec<u8>,
        user_id: String,
        name: String,
        color: String,
        signaling_url: String,
    ) -> Result<CollabClient, JsValue> {
        let local_user = AwarenessState {
            user_id,
            name,
            color,
            avatar: None,
            cursor: None,
        };
        let transport = Arc::new(BrowserWebSocketTransport::new());
        let note_id = NoteId(note_id);
        let session = CollabSession::host(
            note_id.clone(),
            &content,
            local_user,
            transport,
            &signaling_url,
            CollabConfig::default(),
        )
        .await
        .js_err()?;
        app.session().attach_collab(ActiveCollabMarker { note_id: note_id.clone(), room_id: session.room_id().to_string() });
        wire_periodic_persist(&session, app, note_id);
        Ok(CollabClient { session })
    }

    /// Join an existing room as guest. `local_snapshot` rehydrates edits
    /// made while disconnected from a prior attach to the same room;
    /// pass an empty array for a brand-new join. Suspends the note's
    /// autosave on `app` for the session's duration, same as `host`,
    /// even though only the host ever persists back through
    /// `NoteStateCore` — a guest editing through the stale
    /// pre-collaboration path at the same time would fork the document.
    #[wasm_bindgen(js_name = "join")]
    pub async fn join(
        app: &GNoteApp,
        note_id: String,
        room_id: String,
        local_snapshot: Vec<u8>,
        user_id: String,
        name: String,
        color: String,
        signaling_url: String,
    ) -> Result<CollabClient, JsValue> {
        let local_user = AwarenessState {
            user_id,
            name,
            color,
            avatar: None,
            cursor: None,
        };
        let snapshot = if local_snapshot.is_empty() { None } else { Some(local_snapshot.as_slice()) };
        let transport = Arc::new(BrowserWebSocketTransport::new());
        let note_id = NoteId(note_id);
        let session = CollabSession::join(
            note_id.clone(),
            &room_id,
            snapshot,
            local_user,
            transport,
            &signaling_url,
            CollabConfig::default(),
        )
        .await
        .js_err()?;
        app.session().attach_collab(ActiveCollabMarker { note_id, room_id: room_id.clone() });
        Ok(CollabClient { session })
    }

    #[wasm_bindgen(getter, js_name = "roomId")]
    pub fn room_id(&self) -> String {
        self.session.room_id().to_string()
    }

    #[wasm_bindgen(getter, js_name = "isHost")]
    pub fn is_host(&self) -> bool {
        self.session.is_host()
    }

    /// Apply a local content edit; the resulting CRDT delta is
    /// broadcast to peers automatically.
    pub fn edit(&self, new_content: String) {
        self.session.edit(&new_content);
    }

    /// Update and broadcast this participant's own cursor position.
    #[wasm_bindgen(js_name = "setCursor")]
    pub fn set_cursor(&self, anchor: u32, head: u32) -> Result<(), JsValue> {
        self.session.set_local_cursor(Cursor { anchor, head }).js_err()
    }

    /// Current document content, projected live from the CRDT.
    #[wasm_bindgen(js_name = "currentContent")]
    pub fn current_content(&self) -> Vec<u8> {
        self.session.current_content()
    }

    /// Every participant's presence currently known, JSON-encoded.
    pub fn awareness(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.session.awareness())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Current peer connection status, JSON-encoded.
    #[wasm_bindgen(js_name = "connectionStatus")]
    pub fn connection_status(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.session.connection_status())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// End the session: broadcast departure, disconnect, persist the
    /// host's final content snapshot through `app`'s note core (a no-op
    /// for a guest), and clear `app`'s active collaboration marker so
    /// the note's autosave is no longer rejected.
    pub async fn end(&self, app: &GNoteApp) -> Result<Option<Vec<u8>>, JsValue> {
        let snapshot = self.session.end().await.js_err()?;
        if let Some(content) = &snapshot {
            let core = NoteStateCore::new(app.store(), app.note_core_config(), app.device_id().to_string());
            core.persist_collab_snapshot(&self.session.note_id().0, content.clone(), now_ms())
                .await
                .js_err()?;
        }
        app.session().detach_collab();
        Ok(snapshot)
    }
}

/// Register the host's periodic crash-safety snapshot callback: persists
/// through the same `NoteStateCore::persist_collab_snapshot` path `end`
/// uses, so a tab crash mid-session loses at most one interval's worth of
/// edits instead of the whole session.
fn wire_periodic_persist(
    session: &Arc<CollabSession<BrowserWebSocketTransport>>,
    app: &GNoteApp,
    note_id: NoteId,
) {
    let store = app.store().clone();
    let config = app.note_core_config();
    let device_id = app.device_id().to_string();
    let note_id = note_id.0;
    session.set_on_periodic_snapshot(Arc::new(move |content| {
        // Each invocation clones its own owned store handle (cheap: the
        // underlying `Database` is reference-counted) so `core`'s borrow
        // stays inside this spawned future's own body instead of
        // reaching back out to a reference that doesn't outlive the
        // synchronous callback call.
        let store = store.clone();
        let device_id = device_id.clone();
        let note_id = note_id.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let core = NoteStateCore::new(&store, config, device_id);
            if let Err(e) = core.persist_collab_snapshot(&note_id, content, now_ms()).await {
                log::warn!("failed to persist periodic collaboration snapshot: {e}");
            }
        });
    }));
}
