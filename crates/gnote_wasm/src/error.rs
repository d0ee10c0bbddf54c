//! Conversions at the JS boundary: every `Result`/`Option` returned from
//! a `#[wasm_bindgen]` method must end up as `Result<T, JsValue>`, since
//! none of `GNoteError`/`SyncError`/`CollabError` are JS values
//! themselves.

use wasm_bindgen::prelude::*;

/// Convert a `Result<T, E: Display>` into the `Result<T, JsValue>` shape
/// every exported method needs to return.
pub trait IntoJsResult<T> {
    fn js_err(self) -> Result<T, JsValue>;
}

impl<T, E: std::fmt::Display> IntoJsResult<T> for Result<T, E> {
    fn js_err(self) -> Result<T, JsValue> {
        self.map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

/// Convert an `Option<T>` into `Result<T, JsValue>`, for call sites that
/// want a JS exception on `None` rather than threading `Option` through
/// `serde-wasm-bindgen`.
pub trait IntoJsOption<T> {
    fn js_ok_or(self, message: &str) -> Result<T, JsValue>;
    fn js_ok_or_else(self, message: impl FnOnce() -> String) -> Result<T, JsValue>;
}

impl<T> IntoJsOption<T> for Option<T> {
    fn js_ok_or(self, message: &str) -> Result<T, JsValue> {
        self.ok_or_else(|| JsValue::from_str(message))
    }

    fn js_ok_or_else(self, message: impl FnOnce() -> String) -> Result<T, JsValue> {
        self.ok_or_else(|| JsValue::from_str(&message()))
    }
}
