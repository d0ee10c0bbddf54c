//! End-to-end collaboration session scenario, wiring two
//! `CollabSession`s together over a loopback transport instead of a
//! real WebSocket server — the transport itself is the fake here, so
//! the test only needs a single process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use gnote_collab::awareness::AwarenessState;
use gnote_collab::session::CollabSession;
use gnote_collab::transport::{ConnectionStatus, MessageCallback, PeerTransport, RoomConfig, StatusCallback};
use gnote_core::model::NoteId;

struct LoopbackTransport {
    connected: AtomicBool,
    on_message: RwLock<Option<MessageCallback>>,
    peer: RwLock<Option<Arc<LoopbackTransport>>>,
}

impl LoopbackTransport {
    fn new() -> Arc<Self> {
        Arc::new(LoopbackTransport {
            connected: AtomicBool::new(false),
            on_message: RwLock::new(None),
            peer: RwLock::new(None),
        })
    }

    fn link(a: &Arc<Self>, b: &Arc<Self>) {
        *a.peer.write().unwrap() = Some(Arc::clone(b));
        *b.peer.write().unwrap() = Some(Arc::clone(a));
    }
}

impl PeerTransport for LoopbackTransport {
    async fn probe_room(&self, _config: &RoomConfig) -> gnote_collab::Result<bool> {
        Ok(true)
    }

    async fn connect(&self, _config: &RoomConfig) -> gnote_collab::Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, message: &[u8]) -> gnote_collab::Result<()> {
        if let Some(peer) = self.peer.read().unwrap().as_ref() {
            if let Some(cb) = peer.on_message.read().unwrap().as_ref() {
                cb(message);
            }
        }
        Ok(())
    }

    fn set_on_message(&self, callback: MessageCallback) {
        *self.on_message.write().unwrap() = Some(callback);
    }

    fn set_on_status(&self, _callback: StatusCallback) {}

    async fn disconnect(&self) -> gnote_collab::Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn status(&self) -> ConnectionStatus {
        if self.is_connected() { ConnectionStatus::Connected } else { ConnectionStatus::Disconnected }
    }
}

fn host_identity() -> AwarenessState {
    AwarenessState { user_id: "host-1".into(), name: "Harriet".into(), color: "#f00".into(), avatar: None, cursor: None }
}

fn guest_identity() -> AwarenessState {
    AwarenessState { user_id: "guest-1".into(), name: "Gustav".into(), color: "#0f0".into(), avatar: None, cursor: None }
}

#[tokio::test]
async fn two_participants_converge_and_only_host_persists_on_end() {
    let host_transport = LoopbackTransport::new();
    let guest_transport = LoopbackTransport::new();
    LoopbackTransport::link(&host_transport, &guest_transport);

    let host = CollabSession::host(NoteId::from("n4"), b"X", host_identity(), host_transport, "wss://signal.example.com/room")
        .await
        .unwrap();

    let guest = CollabSession::join(
        NoteId::from("n4"),
        host.room_id(),
        None,
        guest_identity(),
        guest_transport,
        "wss://signal.example.com/room",
    )
    .await
    .unwrap();

    assert!(host.is_host());
    assert!(!guest.is_host());
    assert_eq!(host.room_id(), guest.room_id());

    // Both participants type at the same time, at different ends of the
    // document. The CRDT guarantees convergence regardless of delivery
    // order.
    host.edit("XY");
    guest.edit("XZ");
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(host.current_content(), guest.current_content());
    let converged = String::from_utf8(host.current_content()).unwrap();
    assert!(converged.contains('Y') && converged.contains('Z'), "both insertions must survive: {converged}");

    // The guest's presence is visible to the host.
    let host_awareness = host.awareness();
    assert!(host_awareness.iter().any(|p| p.user_id == "guest-1"));

    // Only the host persists a snapshot on session end.
    let host_snapshot = host.end().await.unwrap();
    assert!(host_snapshot.is_some());
    let guest_snapshot = guest.end().await.unwrap();
    assert!(guest_snapshot.is_none(), "a guest never writes the remote on session end");
}
