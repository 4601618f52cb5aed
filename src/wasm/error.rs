//! Error types for WASM bindings

use crate::error::EngineError;
use wasm_bindgen::prelude::*;

/// Error type for WASM bindings
#[wasm_bindgen]
pub struct EngineJsError {
    message: String,
}

#[wasm_bindgen]
impl EngineJsError {
    /// Get the error message
    #[wasm_bindgen(getter)]
    pub fn message(&self) -> String {
        self.message.clone()
    }
}

impl From<EngineError> for EngineJsError {
    fn from(e: EngineError) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

impl From<serde_wasm_bindgen::Error> for EngineJsError {
    fn from(e: serde_wasm_bindgen::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

impl EngineJsError {
    /// Convert to JsValue for use as error return
    pub fn into_js(self) -> JsValue {
        JsValue::from_str(&self.message)
    }
}

/// Map any engine-side error straight to a JS string
pub(crate) fn to_js<E: Into<EngineJsError>>(e: E) -> JsValue {
    e.into().into_js()
}
