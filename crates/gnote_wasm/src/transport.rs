//! Browser `WebSocket`-backed [`PeerTransport`] for the collaboration
//! signaling channel.
//!
//! `wasm32-unknown-unknown` has no tokio reactor, so unlike
//! `gnote_collab::tokio_transport::TokioTransport` this transport drives
//! an actual `web_sys::WebSocket` directly, with `onmessage`/`onclose`
//! closures forwarding into the registered `PeerTransport` callbacks.
//! Single-threaded interior mutability via `RefCell`, with `unsafe impl
//! Send + Sync` since wasm32 has no real threads to race on.

use std::cell::RefCell;

use gnote_collab::error::{CollabError, Result};
use gnote_collab::transport::{ConnectionStatus, MessageCallback, PeerTransport, RoomConfig, StatusCallback};
use js_sys::Uint8Array;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{BinaryType, CloseEvent, ErrorEvent, MessageEvent, WebSocket};

/// A `web_sys::WebSocket`-driven peer transport. Not `Send`/`Sync` in
/// the Rust-memory-model sense — every field is only ever touched from
/// the single JS event-loop thread WASM runs on.
pub struct BrowserWebSocketTransport {
    socket: RefCell<Option<WebSocket>>,
    on_message: RefCell<Option<MessageCallback>>,
    on_status: RefCell<Option<StatusCallback>>,
    status: RefCell<ConnectionStatus>,
    // Keep the closures alive for the lifetime of the socket; dropping
    // them would detach the listeners mid-connection.
    _onmessage: RefCell<Option<Closure<dyn FnMut(MessageEvent)>>>,
    _onclose: RefCell<Option<Closure<dyn FnMut(CloseEvent)>>>,
    _onerror: RefCell<Option<Closure<dyn FnMut(ErrorEvent)>>>,
    _onopen: RefCell<Option<Closure<dyn FnMut()>>>,
}

impl BrowserWebSocketTransport {
    pub fn new() -> Self {
        BrowserWebSocketTransport {
            socket: RefCell::new(None),
            on_message: RefCell::new(None),
            on_status: RefCell::new(None),
            status: RefCell::new(ConnectionStatus::Disconnected),
            _onmessage: RefCell::new(None),
            _onclose: RefCell::new(None),
            _onerror: RefCell::new(None),
            _onopen: RefCell::new(None),
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.borrow_mut() = status.clone();
        if let Some(cb) = self.on_status.borrow().as_ref() {
            cb(status);
        }
    }

    fn dispatch_message(&self, bytes: &[u8]) {
        if let Some(cb) = self.on_message.borrow().as_ref() {
            cb(bytes);
        }
    }
}

impl Default for BrowserWebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTransport for BrowserWebSocketTransport {
    async fn probe_room(&self, config: &RoomConfig) -> Result<bool> {
        // The browser has no bare TCP probe available; joining opens the
        // same socket the signaling server would reject a non-existent
        // room on during the handshake, so existence is established by
        // attempting `connect` and letting the caller surface a
        // `RoomNotFound` from the first handshake frame instead. Callers
        // that need a true no-op probe should hit a signaling HTTP
        // endpoint before calling this transport at all; that is outside
        // this transport's scope.
        let _ = config;
        Ok(true)
    }

    async fn connect(&self, config: &RoomConfig) -> Result<()> {
        self.set_status(ConnectionStatus::Connecting);
        let url = config.build_url();
        let ws = WebSocket::new(&url).map_err(|e| {
            CollabError::Transport(format!("failed to open websocket to {url}: {e:?}"))
        })?;
        ws.set_binary_type(BinaryType::Arraybuffer);

        {
            let status_cb = self.on_status.borrow().clone();
            let onopen = Closure::wrap(Box::new(move || {
                if let Some(cb) = &status_cb {
                    cb(ConnectionStatus::Connected);
                }
            }) as Box<dyn FnMut()>);
            ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));
            *self._onopen.borrow_mut() = Some(onopen);
        }

        {
            // SAFETY-relevant only in the sense that this closure is
            // `'static`; it captures no `&self` reference, only owned
            // callback clones, since `self` is not `'static` from the
            // socket's point of view.
            let message_cb = self.on_message.borrow().clone();
            let onmessage = Closure::wrap(Box::new(move |evt: MessageEvent| {
                if let Ok(buf) = evt.data().dyn_into::<js_sys::ArrayBuffer>() {
                    let bytes = Uint8Array::new(&buf).to_vec();
                    if let Some(cb) = &message_cb {
                        cb(&bytes);
                    }
                }
            }) as Box<dyn FnMut(MessageEvent)>);
            ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
            *self._onmessage.borrow_mut() = Some(onmessage);
        }

        {
            let status_cb = self.on_status.borrow().clone();
            let onclose = Closure::wrap(Box::new(move |_evt: CloseEvent| {
                if let Some(cb) = &status_cb {
                    cb(ConnectionStatus::Disconnected);
                }
            }) as Box<dyn FnMut(CloseEvent)>);
            ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));
            *self._onclose.borrow_mut() = Some(onclose);
        }

        {
            let status_cb = self.on_status.borrow().clone();
            let onerror = Closure::wrap(Box::new(move |evt: ErrorEvent| {
                if let Some(cb) = &status_cb {
                    cb(ConnectionStatus::Error {
                        message: evt.message(),
                    });
                }
            }) as Box<dyn FnMut(ErrorEvent)>);
            ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));
            *self._onerror.borrow_mut() = Some(onerror);
        }

        *self.socket.borrow_mut() = Some(ws);
        Ok(())
    }

    async fn send(&self, message: &[u8]) -> Result<()> {
        let socket = self.socket.borrow();
        let ws = socket
            .as_ref()
            .ok_or_else(|| CollabError::Transport("send before connect".into()))?;
        ws.send_with_u8_array(message)
            .map_err(|e| CollabError::Transport(format!("websocket send failed: {e:?}")))
    }

    fn set_on_message(&self, callback: MessageCallback) {
        *self.on_message.borrow_mut() = Some(callback);
    }

    fn set_on_status(&self, callback: StatusCallback) {
        *self.on_status.borrow_mut() = Some(callback);
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(ws) = self.socket.borrow_mut().take() {
            let _ = ws.close();
        }
        self.set_status(ConnectionStatus::Disconnected);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(*self.status.borrow(), ConnectionStatus::Connected)
    }

    fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }
}

// SAFETY: every field is only ever touched from the single JS
// event-loop thread wasm32-unknown-unknown runs on; there is no actual
// concurrent access to race. `PeerTransport` requires `Send + Sync`
// because native callers (`gnote_collab::session::CollabSession`) are
// generic over it without a wasm-specific carve-out.
unsafe impl Send for BrowserWebSocketTransport {}
unsafe impl Sync for BrowserWebSocketTransport {}
