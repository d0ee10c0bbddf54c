//! Cache of live collaboration sessions keyed by room id, so a host
//! process re-entering the same room id (reconnect, or a second editor
//! pane on the same note) reuses the existing `CollabSession` instead
//! of constructing a second one against the same peers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::session::CollabSession;
use crate::transport::PeerTransport;

/// Lazily-populated cache of active sessions, one per room id.
pub struct SessionCache<T: PeerTransport> {
    sessions: RwLock<HashMap<String, Arc<CollabSession<T>>>>,
}

impl<T: PeerTransport> SessionCache<T> {
    pub fn new() -> Self {
        SessionCache {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a session already attached to `room_id`, if any.
    pub fn get(&self, room_id: &str) -> Option<Arc<CollabSession<T>>> {
        self.sessions.read().unwrap().get(room_id).cloned()
    }

    /// Register a freshly created session. Replaces any stale entry
    /// for the same room id (e.g. a prior session that ended without
    /// going through `remove`).
    pub fn insert(&self, session: Arc<CollabSession<T>>) {
        self.sessions
            .write()
            .unwrap()
            .insert(session.room_id().to_string(), session);
    }

    /// Drop a session from the cache, typically once
    /// `CollabSession::end` has returned.
    pub fn remove(&self, room_id: &str) -> Option<Arc<CollabSession<T>>> {
        self.sessions.write().unwrap().remove(room_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }
}

impl<T: PeerTransport> Default for SessionCache<T> {
    fn default() -> Self {
        SessionCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::awareness::AwarenessState;
    use crate::transport::{ConnectionStatus, RoomConfig};
    use gnote_core::model::NoteId;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NullTransport {
        connected: AtomicBool,
    }

    impl PeerTransport for NullTransport {
        async fn probe_room(&self, _config: &RoomConfig) -> crate::error::Result<bool> {
            Ok(true)
        }
        async fn connect(&self, _config: &RoomConfig) -> crate::error::Result<()> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn send(&self, _message: &[u8]) -> crate::error::Result<()> {
            Ok(())
        }
        fn set_on_message(&self, _callback: crate::transport::MessageCallback) {}
        fn set_on_status(&self, _callback: crate::transport::StatusCallback) {}
        async fn disconnect(&self) -> crate::error::Result<()> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
        fn status(&self) -> ConnectionStatus {
            ConnectionStatus::Connected
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips_by_room_id() {
        let cache: SessionCache<NullTransport> = SessionCache::new();
        let session = CollabSession::host(
            NoteId::from("n1"),
            b"hello",
            AwarenessState {
                user_id: "u1".into(),
                name: "Alice".into(),
                color: "#fff".into(),
                avatar: None,
                cursor: None,
            },
            Arc::new(NullTransport {
                connected: AtomicBool::new(false),
            }),
            "wss://signal.example.com/room",
        )
        .await
        .unwrap();

        let room_id = session.room_id().to_string();
        cache.insert(session);
        assert!(cache.get(&room_id).is_some());
        assert_eq!(cache.len(), 1);

        cache.remove(&room_id);
        assert!(cache.is_empty());
    }
}
