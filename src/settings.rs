//! Playback Settings
//!
//! The single authoritative target state of the generator: what frequency,
//! shape, level, routing and length the next tone should have. Every setter
//! silently corrects out-of-domain input instead of failing.

use crate::error::EngineError;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Lowest frequency the generator will produce
pub const MIN_FREQUENCY: f64 = 1.0;

/// Highest frequency the generator will produce
pub const MAX_FREQUENCY: f64 = 22_000.0;

/// Clamp a frequency into [`MIN_FREQUENCY`, `MAX_FREQUENCY`] and round it to 0.1 Hz.
///
/// NaN maps to the lower bound.
pub fn clamp_and_quantize(frequency: f64) -> f64 {
    if frequency.is_nan() {
        return MIN_FREQUENCY;
    }
    let clamped = frequency.clamp(MIN_FREQUENCY, MAX_FREQUENCY);
    (clamped * 10.0).round() / 10.0
}

/// Periodic waveform shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

impl Waveform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Triangle => "triangle",
            Waveform::Sawtooth => "sawtooth",
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Waveform {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sine" => Ok(Waveform::Sine),
            "square" => Ok(Waveform::Square),
            "triangle" => Ok(Waveform::Triangle),
            "sawtooth" | "saw" => Ok(Waveform::Sawtooth),
            _ => Err(EngineError::UnknownWaveform(s.to_string())),
        }
    }
}

/// Output channel routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Left,
    Right,
    #[default]
    Both,
}

impl Channel {
    /// Target (left, right) gains for this routing
    pub fn gains(&self) -> (f64, f64) {
        match self {
            Channel::Left => (1.0, 0.0),
            Channel::Right => (0.0, 1.0),
            Channel::Both => (1.0, 1.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Left => "left",
            Channel::Right => "right",
            Channel::Both => "both",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Channel::Left),
            "right" => Ok(Channel::Right),
            "both" => Ok(Channel::Both),
            _ => Err(EngineError::UnknownChannel(s.to_string())),
        }
    }
}

/// How long a manually started tone plays
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "lowercase")]
pub enum PlaybackDuration {
    #[default]
    Continuous,
    Seconds(f64),
}

impl PlaybackDuration {
    /// Cutoff delay in milliseconds, `None` for continuous playback
    pub fn as_millis(&self) -> Option<f64> {
        match self {
            PlaybackDuration::Continuous => None,
            PlaybackDuration::Seconds(secs) => Some(secs * 1000.0),
        }
    }
}

impl FromStr for PlaybackDuration {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("continuous") {
            return Ok(PlaybackDuration::Continuous);
        }
        match trimmed.parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(PlaybackDuration::Seconds(secs)),
            _ => Err(EngineError::InvalidDuration(s.to_string())),
        }
    }
}

/// Authoritative target playback state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(default)]
pub struct PlaybackSettings {
    /// Frequency in Hz, always within bounds and on the 0.1 Hz grid
    pub frequency: f64,
    pub waveform: Waveform,
    /// Master volume in [0, 1]
    pub volume: f64,
    pub channel: Channel,
    pub duration: PlaybackDuration,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            waveform: Waveform::Sine,
            volume: 0.5,
            channel: Channel::Both,
            duration: PlaybackDuration::Continuous,
        }
    }
}

impl PlaybackSettings {
    /// Set the frequency, returning the corrected value actually stored
    pub fn set_frequency(&mut self, frequency: f64) -> f64 {
        let corrected = clamp_and_quantize(frequency);
        if corrected != frequency {
            tracing::debug!(requested = frequency, corrected, "frequency corrected");
        }
        self.frequency = corrected;
        corrected
    }

    /// Set the volume, returning the clamped value actually stored
    pub fn set_volume(&mut self, volume: f64) -> f64 {
        self.volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.volume
    }

    /// Bring every field back into its domain
    pub fn sanitized(mut self) -> Self {
        self.set_frequency(self.frequency);
        self.set_volume(self.volume);
        if let PlaybackDuration::Seconds(secs) = self.duration {
            if !secs.is_finite() || secs <= 0.0 {
                self.duration = PlaybackDuration::Continuous;
            }
        }
        self
    }
}
