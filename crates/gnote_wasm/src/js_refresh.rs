//! Bridges the host's JS token-refresh callback into
//! `gnote_core::session::RefreshTokenCallback`.
//!
//! The OAuth dance itself happens entirely on the JS side; this module
//! only carries a JS `async (userId: string) => {accessToken,
//! expiresInSec}` function across the wasm boundary.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use gnote_core::session::{BoxFuture, RefreshTokenCallback, TokenRefresh};
use js_sys::{Function, Promise};
use serde::Deserialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

/// `gnote_core::session::BoxFuture` demands `Send` so native callers can
/// drive it from a multi-threaded executor; the future this module
/// builds captures `JsValue`s, which wasm-bindgen marks `!Send`
/// unconditionally. Same carve-out as `IndexedDbObjectStore` and
/// `BrowserWebSocketTransport`: wasm32 has no real threads to race on.
struct AssertSend<F>(F);

unsafe impl<F> Send for AssertSend<F> {}

impl<F: Future> Future for AssertSend<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        unsafe { self.map_unchecked_mut(|s| &mut s.0) }.poll(cx)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsTokenRefresh {
    access_token: String,
    expires_in_sec: i64,
}

/// Wraps a JS function so `gnote_core::session::Session` can invoke it on
/// `AuthExpired` without knowing anything about wasm-bindgen.
pub struct JsRefreshCallback {
    func: Function,
}

impl JsRefreshCallback {
    pub fn new(func: Function) -> Self {
        JsRefreshCallback { func }
    }
}

// SAFETY: `Function` wraps a `JsValue`, not actually shareable across
// real threads, but wasm32 has only one. `RefreshTokenCallback` demands
// `Send + Sync` for native callers generic over it; the wasm host never
// calls this from more than one logical thread.
unsafe impl Send for JsRefreshCallback {}
unsafe impl Sync for JsRefreshCallback {}

impl RefreshTokenCallback for JsRefreshCallback {
    fn refresh(&self, user_id: &str) -> BoxFuture<'static, Result<TokenRefresh, String>> {
        let this = JsValue::UNDEFINED;
        let arg = JsValue::from_str(user_id);
        let call = self.func.call1(&this, &arg);
        Box::pin(AssertSend(async move {
            let promise: Promise = call
                .map_err(|e| format!("refresh callback threw: {e:?}"))?
                .dyn_into()
                .map_err(|_| "refresh callback did not return a Promise".to_string())?;
            let value = JsFuture::from(promise)
                .await
                .map_err(|e| format!("refresh promise rejected: {e:?}"))?;
            let parsed: JsTokenRefresh = serde_wasm_bindgen::from_value(value)
                .map_err(|e| format!("refresh result did not match {{accessToken, expiresInSec}}: {e}"))?;
            Ok(TokenRefresh {
                access_token: parsed.access_token,
                expires_in_sec: parsed.expires_in_sec,
            })
        }))
    }
}
