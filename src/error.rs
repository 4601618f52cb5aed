//! Error types for the tone engine
//!
//! Live playback operations never fail: out-of-range numbers are clamped and
//! producer conflicts are resolved by stopping the incumbent. Errors only
//! surface where text or JSON crosses into the engine.

use thiserror::Error;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unrecognised waveform name
    #[error("Unknown waveform: {0}")]
    UnknownWaveform(String),

    /// Unrecognised output channel name
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Unrecognised noise color name
    #[error("Unknown noise color: {0}")]
    UnknownNoiseColor(String),

    /// Unrecognised sweep curve name
    #[error("Unknown sweep curve: {0}")]
    UnknownSweepCurve(String),

    /// Playback duration that is neither "continuous" nor a number of seconds
    #[error("Invalid playback duration: {0}")]
    InvalidDuration(String),

    /// Malformed configuration document
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
