//! Collaboration session lifecycle: room join/host, wiring the
//! CRDT document and awareness map to a [`crate::transport::PeerTransport`],
//! and the host-only snapshot-on-end contract.
//!
//! Message-driven: the transport's message callback funnels every
//! incoming frame through [`CollabSession::on_peer_message`], which
//! decodes it and applies it to the right piece of local state. There
//! is no separate poll loop.

use std::sync::{Arc, RwLock};

use rand::Rng;
use serde::{Deserialize, Serialize};

use gnote_core::model::NoteId;

use crate::awareness::{AwarenessMap, AwarenessState};
use crate::config::CollabConfig;
use crate::document::CrdtDocument;
use crate::error::{CollabError, Result};
use crate::transport::{ConnectionStatus, PeerTransport, RoomConfig};

/// Callback invoked with a projected content snapshot every
/// `CollabConfig::periodic_snapshot_ms`, while the session is host and
/// still open. Registered by the host application to persist through
/// `NoteStateCore::persist_collab_snapshot` without this crate needing
/// to know that type exists.
pub type PeriodicSnapshotCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Exactly one participant per room is host; only the host persists
/// snapshots back through `NoteStateCore` and onward to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

/// Wire frame exchanged over the peer transport. Tagged so a single
/// binary channel carries both the CRDT updates and the ephemeral
/// awareness broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum WireMessage {
    CrdtUpdate(Vec<u8>),
    Awareness(AwarenessState),
    AwarenessLeave { user_id: String },
}

/// Alphabet room ids are drawn from: lowercase ascii and digits only,
/// matching the signaling server's 6-character code space.
const ROOM_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn generate_room_id() -> String {
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())] as char)
        .collect()
}

async fn sleep_ms(ms: u64) {
    #[cfg(not(target_arch = "wasm32"))]
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    #[cfg(target_arch = "wasm32")]
    gloo_timers::future::TimeoutFuture::new(ms as u32).await;
}

/// A live collaboration session for one note. Holds the CRDT document,
/// the awareness map, and the peer transport. This type has no
/// awareness of `NoteStateCore` or autosave itself — it is the host
/// application's job to call `gnote_core::session::Session::attach_collab`
/// when a session starts and `detach_collab` when it ends (and gate its
/// own note mutators against `active_collab` in between), so that
/// autosave for the attached note stays suspended for exactly as long
/// as this session lives.
pub struct CollabSession<T: PeerTransport> {
    room_id: String,
    role: Role,
    note_id: NoteId,
    local_user: AwarenessState,
    document: CrdtDocument,
    awareness: RwLock<AwarenessMap>,
    transport: Arc<T>,
    config: CollabConfig,
    on_periodic_snapshot: RwLock<Option<PeriodicSnapshotCallback>>,
    ended: std::sync::atomic::AtomicBool,
}

impl<T: PeerTransport + 'static> CollabSession<T> {
    /// Start a new room as host, seeding the CRDT document from the
    /// note's current content.
    pub async fn host(
        note_id: NoteId,
        content: &[u8],
        local_user: AwarenessState,
        transport: Arc<T>,
        signaling_url: &str,
        config: CollabConfig,
    ) -> Result<Arc<Self>> {
        let room_id = generate_room_id();
        let document = CrdtDocument::seeded(content)?;
        let session = Arc::new(CollabSession {
            room_id: room_id.clone(),
            role: Role::Host,
            note_id,
            local_user,
            document,
            awareness: RwLock::new(AwarenessMap::new()),
            transport,
            config,
            on_periodic_snapshot: RwLock::new(None),
            ended: std::sync::atomic::AtomicBool::new(false),
        });
        session.wire_transport();
        session.wire_document_observer();
        let room_config = RoomConfig::new(signaling_url, &room_id);
        session.transport.connect(&room_config).await?;
        session.broadcast_full_state()?;
        session.broadcast_own_awareness()?;
        session.wire_periodic_snapshot();
        Ok(session)
    }

    /// Join an existing room as guest. Probes the signaling server
    /// first so a mistyped room id surfaces as
    /// [`CollabError::RoomNotFound`] rather than silently creating an
    /// empty room. `local_snapshot`, if the guest has one from a prior
    /// attach to this same room, rehydrates local edits made while
    /// disconnected instead of clobbering them with the peers' state.
    pub async fn join(
        note_id: NoteId,
        room_id: &str,
        local_snapshot: Option<&[u8]>,
        local_user: AwarenessState,
        transport: Arc<T>,
        signaling_url: &str,
        config: CollabConfig,
    ) -> Result<Arc<Self>> {
        let room_config = RoomConfig::new(signaling_url, room_id);
        if !transport.probe_room(&room_config).await? {
            return Err(CollabError::RoomNotFound(room_id.to_string()));
        }

        let document = match local_snapshot {
            Some(snapshot) => CrdtDocument::from_snapshot(snapshot)?,
            None => CrdtDocument::from_snapshot(&[])?,
        };
        let session = Arc::new(CollabSession {
            room_id: room_id.to_string(),
            role: Role::Guest,
            note_id,
            local_user,
            document,
            awareness: RwLock::new(AwarenessMap::new()),
            transport,
            config,
            on_periodic_snapshot: RwLock::new(None),
            ended: std::sync::atomic::AtomicBool::new(false),
        });
        session.wire_transport();
        session.wire_document_observer();
        session.transport.connect(&room_config).await?;
        session.broadcast_full_state()?;
        session.broadcast_own_awareness()?;
        // Only the host persists a snapshot back through NoteStateCore;
        // a guest's periodic snapshot would have nowhere to go.
        Ok(session)
    }

    fn wire_transport(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.transport.set_on_message(Arc::new(move |data: &[u8]| {
            if let Some(session) = weak.upgrade() {
                session.on_peer_message(data);
            }
        }));
    }

    /// Broadcast every local CRDT mutation automatically by wiring the
    /// document's own update observer — `edit()` only needs to mutate
    /// the document, never to remember to broadcast afterward.
    fn wire_document_observer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.document.on_local_update(Arc::new(move |update: &[u8]| {
            let Some(session) = weak.upgrade() else {
                return;
            };
            let _ = session.send_frame(&WireMessage::CrdtUpdate(update.to_vec()));
        }));
    }

    /// Register the callback invoked with a content snapshot every
    /// `periodic_snapshot_ms` while this session is host. A no-op for a
    /// guest session (never invoked). Replaces any previously registered
    /// callback.
    pub fn set_on_periodic_snapshot(&self, callback: PeriodicSnapshotCallback) {
        *self.on_periodic_snapshot.write().unwrap() = Some(callback);
    }

    /// Spawn the host-only periodic snapshot loop. A disabled interval
    /// (`periodic_snapshot_ms == 0`) or a guest session wires nothing.
    fn wire_periodic_snapshot(self: &Arc<Self>) {
        if self.role != Role::Host || self.config.periodic_snapshot_ms == 0 {
            return;
        }
        let weak = Arc::downgrade(self);
        let interval_ms = self.config.periodic_snapshot_ms;
        let fut = async move {
            loop {
                sleep_ms(interval_ms).await;
                let Some(session) = weak.upgrade() else { break };
                if session.ended.load(std::sync::atomic::Ordering::SeqCst) {
                    break;
                }
                if let Some(cb) = session.on_periodic_snapshot.read().unwrap().as_ref() {
                    cb(session.current_content());
                }
            }
        };
        #[cfg(not(target_arch = "wasm32"))]
        tokio::spawn(fut);
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(fut);
    }

    fn on_peer_message(&self, data: &[u8]) {
        let message: WireMessage = match serde_json::from_slice(data) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed collaboration frame");
                return;
            }
        };
        match message {
            WireMessage::CrdtUpdate(update) => {
                if let Err(e) = self.document.apply_remote_update(&update) {
                    tracing::warn!(error = %e, "failed to apply remote crdt update");
                }
            }
            WireMessage::Awareness(state) => {
                self.awareness.write().unwrap().set(state);
            }
            WireMessage::AwarenessLeave { user_id } => {
                self.awareness.write().unwrap().remove(&user_id);
            }
        }
    }

    fn send_frame(&self, message: &WireMessage) -> Result<()> {
        let bytes = serde_json::to_vec(message)
            .map_err(|e| CollabError::Crdt(format!("failed to encode collaboration frame: {e}")))?;
        // The transport queues outbound sends asynchronously; a frame
        // built here is only handed off, never awaited to completion,
        // fire-and-forget from the observer callback's point of view.
        // There is no multi-threaded executor on WASM, so the two
        // targets spawn the send onto whichever single-threaded task
        // queue is actually available there.
        let transport = Arc::clone(&self.transport);
        let fut = async move {
            if let Err(e) = transport.send(&bytes).await {
                tracing::warn!(error = %e, "failed to send collaboration frame");
            }
        };
        #[cfg(not(target_arch = "wasm32"))]
        tokio::spawn(fut);
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(fut);
        Ok(())
    }

    fn broadcast_full_state(&self) -> Result<()> {
        self.send_frame(&WireMessage::CrdtUpdate(self.document.snapshot()))
    }

    fn broadcast_own_awareness(&self) -> Result<()> {
        self.awareness.write().unwrap().set(self.local_user.clone());
        self.send_frame(&WireMessage::Awareness(self.local_user.clone()))
    }

    /// Apply a local content edit. The update observer wired in
    /// `wire_document_observer` broadcasts the resulting CRDT delta to
    /// peers; callers never need to remember to send it themselves.
    pub fn edit(&self, new_content: &str) {
        self.document.set_text(new_content);
    }

    /// Update and broadcast this participant's own cursor/presence.
    pub fn set_local_cursor(&self, cursor: crate::awareness::Cursor) -> Result<()> {
        self.local_user_cursor_update(cursor);
        self.broadcast_own_awareness()
    }

    fn local_user_cursor_update(&self, cursor: crate::awareness::Cursor) {
        // local_user itself is immutable per session (identity doesn't
        // change mid-session); callers track cursor through the
        // awareness map keyed by user_id instead.
        self.awareness.write().unwrap().set(AwarenessState {
            cursor: Some(cursor),
            ..self.local_user.clone()
        });
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn note_id(&self) -> &NoteId {
        &self.note_id
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn document(&self) -> &CrdtDocument {
        &self.document
    }

    pub fn awareness(&self) -> AwarenessMap {
        self.awareness.read().unwrap().clone()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.transport.status()
    }

    /// Current content, read live from the CRDT. Projected to bytes
    /// for the session-end snapshot contract.
    pub fn current_content(&self) -> Vec<u8> {
        self.document.project_to_content()
    }

    /// End the session: broadcast our own departure, disconnect, and
    /// return the content snapshot the host must write through
    /// `NoteStateCore::update_note`. Guests get `None` back — they
    /// never persist to the remote.
    pub async fn end(&self) -> Result<Option<Vec<u8>>> {
        if self.ended.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return Ok(None);
        }
        let leave = WireMessage::AwarenessLeave {
            user_id: self.local_user.user_id.clone(),
        };
        let _ = self.send_frame(&leave);
        self.transport.disconnect().await?;
        Ok(match self.role {
            Role::Host => Some(self.current_content()),
            Role::Guest => None,
        })
    }
}
