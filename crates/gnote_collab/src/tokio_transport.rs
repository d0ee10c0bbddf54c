//! Native WebSocket peer transport, used outside the browser (desktop
//! shells, integration tests). The browser build in `gnote_wasm` talks
//! to the same signaling protocol through `web_sys::WebSocket`
//! callbacks instead, since tokio and tokio-tungstenite are unavailable
//! there.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{CollabError, Result};
use crate::transport::{ConnectionStatus, MessageCallback, PeerTransport, RoomConfig, StatusCallback};

type WsSender = mpsc::UnboundedSender<Vec<u8>>;

pub struct TokioTransport {
    sender: RwLock<Option<WsSender>>,
    status: RwLock<ConnectionStatus>,
    connected: AtomicBool,
    on_message: RwLock<Option<MessageCallback>>,
    on_status: RwLock<Option<StatusCallback>>,
    task_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl TokioTransport {
    pub fn new() -> Self {
        TokioTransport {
            sender: RwLock::new(None),
            status: RwLock::new(ConnectionStatus::Disconnected),
            connected: AtomicBool::new(false),
            on_message: RwLock::new(None),
            on_status: RwLock::new(None),
            task_handle: RwLock::new(None),
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.write().unwrap() = status.clone();
        if let Some(cb) = self.on_status.read().unwrap().as_ref() {
            cb(status);
        }
    }
}

impl Default for TokioTransport {
    fn default() -> Self {
        TokioTransport::new()
    }
}

impl PeerTransport for TokioTransport {
    async fn probe_room(&self, config: &RoomConfig) -> Result<bool> {
        let mut url = config.build_url();
        url.push_str("&probe=true");

        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| CollabError::Transport(format!("probe failed: {e}")))?;
        let (mut write, mut read) = ws_stream.split();

        let reply = tokio::time::timeout(std::time::Duration::from_secs(5), read.next())
            .await
            .map_err(|_| CollabError::Transport("probe timed out".into()))?;

        let _ = write.close().await;

        match reply {
            Some(Ok(Message::Text(text))) => Ok(text.trim() == "room:exists"),
            Some(Ok(_)) | None => Ok(false),
            Some(Err(e)) => Err(CollabError::Transport(format!("probe read failed: {e}"))),
        }
    }

    async fn connect(&self, config: &RoomConfig) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let url = config.build_url();
        tracing::info!(room = %config.room_id, "connecting to signaling server");
        self.set_status(ConnectionStatus::Connecting);

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| CollabError::Transport(format!("connect failed: {e}")))?;

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        *self.sender.write().unwrap() = Some(tx);
        self.connected.store(true, Ordering::SeqCst);
        self.set_status(ConnectionStatus::Connected);

        let on_message = self.on_message.read().unwrap().clone();
        let connected_flag = Arc::new(AtomicBool::new(true));
        let connected_flag_task = Arc::clone(&connected_flag);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Binary(data))) => {
                                if let Some(cb) = &on_message {
                                    cb(&data);
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if write.send(Message::Pong(data)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Pong(_))) => {}
                            Some(Ok(Message::Text(_))) => {}
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(Message::Frame(_))) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "peer transport read error");
                                break;
                            }
                        }
                    }
                    msg = rx.recv() => {
                        match msg {
                            Some(data) => {
                                if write.send(Message::Binary(data.into())).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            connected_flag_task.store(false, Ordering::SeqCst);
            let _ = write.close().await;
        });

        *self.task_handle.write().unwrap() = Some(handle);
        Ok(())
    }

    async fn send(&self, message: &[u8]) -> Result<()> {
        let sender = self.sender.read().unwrap();
        match sender.as_ref() {
            Some(tx) => tx
                .send(message.to_vec())
                .map_err(|_| CollabError::Transport("peer connection closed".into())),
            None => Err(CollabError::Transport("not connected".into())),
        }
    }

    fn set_on_message(&self, callback: MessageCallback) {
        *self.on_message.write().unwrap() = Some(callback);
    }

    fn set_on_status(&self, callback: StatusCallback) {
        *self.on_status.write().unwrap() = Some(callback);
    }

    async fn disconnect(&self) -> Result<()> {
        *self.sender.write().unwrap() = None;
        if let Some(handle) = self.task_handle.write().unwrap().take() {
            handle.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        self.set_status(ConnectionStatus::Disconnected);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn status(&self) -> ConnectionStatus {
        self.status.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_transport_starts_disconnected() {
        let transport = TokioTransport::new();
        assert!(!transport.is_connected());
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let transport = TokioTransport::new();
        let err = transport.send(b"hello").await.unwrap_err();
        assert!(matches!(err, CollabError::Transport(_)));
    }
}
