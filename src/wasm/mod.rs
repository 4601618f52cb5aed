//! WASM bindings for the tone engine
//!
//! The JavaScript-facing API. The page owns the AudioContext and an
//! AudioWorklet that pulls blocks from [`ToneEngine::process_block`]; the
//! page's `requestAnimationFrame` and timers call `on_frame` and `tick`.

mod engine;
mod error;

pub use engine::ToneEngine;
pub use error::EngineJsError;

// Re-export wasm_bindgen for convenience
pub use wasm_bindgen::prelude::*;
