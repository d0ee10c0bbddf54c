//! Peer transport abstraction for the collaboration signaling channel
//! A unified interface over the platform-specific WebSocket
//! implementations (`tokio_transport::TokioTransport` natively; a
//! `web_sys::WebSocket`-backed callback transport in `gnote_wasm`).

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;

/// Parameters for joining or hosting a room. The signaling server is
/// addressed by `signaling_url`; `room_id` is the 6-character
/// `[a-z0-9]` code shared out of band between peers.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub signaling_url: String,
    pub room_id: String,
    pub auth_token: Option<String>,
}

impl RoomConfig {
    pub fn new(signaling_url: impl Into<String>, room_id: impl Into<String>) -> Self {
        RoomConfig {
            signaling_url: signaling_url.into(),
            room_id: room_id.into(),
            auth_token: None,
        }
    }

    pub fn with_auth(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Build the WebSocket URL the transport should connect to.
    pub fn build_url(&self) -> String {
        let mut url = self.signaling_url.clone();
        url.push_str(if url.contains('?') { "&room=" } else { "?room=" });
        url.push_str(&self.room_id);
        if let Some(token) = &self.auth_token {
            url.push_str("&token=");
            url.push_str(token);
        }
        url
    }
}

/// Status of the peer connection, mirroring the shape the sync engine
/// uses for its own lifecycle events so hosts can render both the same
/// way.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Error { message: String },
}

/// Callback for incoming peer messages: CRDT updates and awareness
/// broadcasts are not distinguished at the transport layer, only
/// opaque bytes that `session.rs` dispatches by a leading tag byte.
pub type MessageCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Callback for connection status changes.
pub type StatusCallback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// Transport abstraction for the room signaling connection. Implementors
/// must be `Send + Sync` so a session can be driven from any async
/// context.
pub trait PeerTransport: Send + Sync {
    /// Ask the signaling server whether the room in `config` already
    /// exists, without joining it. A guest calls this before `connect`
    /// so a mistyped room id surfaces as
    /// [`crate::error::CollabError::RoomNotFound`] instead of silently
    /// creating a new, empty room.
    fn probe_room(&self, config: &RoomConfig) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Connect to the signaling server and join (or create) the room.
    fn connect(&self, config: &RoomConfig) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Send a binary message to every other peer in the room.
    fn send(&self, message: &[u8]) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Register the callback for incoming messages. Replaces any
    /// previously registered callback.
    fn set_on_message(&self, callback: MessageCallback);

    /// Register the callback for connection status transitions.
    fn set_on_status(&self, callback: StatusCallback);

    /// Leave the room and close the connection.
    fn disconnect(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    fn is_connected(&self) -> bool;

    fn status(&self) -> ConnectionStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_includes_room_and_token() {
        let config = RoomConfig::new("wss://signal.example.com/room", "abc123")
            .with_auth("tok");
        let url = config.build_url();
        assert!(url.contains("room=abc123"));
        assert!(url.contains("token=tok"));
    }

    #[test]
    fn build_url_respects_existing_query_string() {
        let config = RoomConfig::new("wss://signal.example.com/room?v=1", "abc123");
        let url = config.build_url();
        assert!(url.contains("v=1"));
        assert!(url.contains("&room=abc123"));
    }
}
