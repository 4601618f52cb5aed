//! Sweep Controller
//!
//! Retargets the tone along a linear or logarithmic ramp. Frequency is a
//! pure function of elapsed audio-clock time, so whoever drives
//! [`SweepController::advance`] (display frames, a test, an offline render)
//! sees the same curve.
//!
//! ```text
//! Idle ──start──▶ Sweeping ──progress ≥ 1──▶ Completed ──settle──▶ Idle
//!                    │
//!                    └──cancel──▶ Cancelled ──settle──▶ Idle
//! ```

use crate::error::EngineError;
use crate::settings::{MAX_FREQUENCY, MIN_FREQUENCY};
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Mapping from progress to frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "lowercase")]
pub enum SweepCurve {
    /// Equal Hz per second
    Linear,
    /// Equal octaves per second
    #[default]
    Logarithmic,
}

impl fmt::Display for SweepCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepCurve::Linear => f.write_str("linear"),
            SweepCurve::Logarithmic => f.write_str("logarithmic"),
        }
    }
}

impl FromStr for SweepCurve {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "lin" => Ok(SweepCurve::Linear),
            "logarithmic" | "log" | "exponential" => Ok(SweepCurve::Logarithmic),
            _ => Err(EngineError::UnknownSweepCurve(s.to_string())),
        }
    }
}

/// What to sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(default)]
pub struct SweepParams {
    pub start_freq: f64,
    pub end_freq: f64,
    pub duration_secs: f64,
    pub curve: SweepCurve,
}

impl Default for SweepParams {
    fn default() -> Self {
        Self {
            start_freq: 20.0,
            end_freq: 20_000.0,
            duration_secs: 10.0,
            curve: SweepCurve::Logarithmic,
        }
    }
}

impl SweepParams {
    pub fn new(start_freq: f64, end_freq: f64, duration_secs: f64, curve: SweepCurve) -> Self {
        Self {
            start_freq,
            end_freq,
            duration_secs,
            curve,
        }
    }

    /// Replace unusable fields with `fallback`'s, then clamp frequencies
    pub fn sanitized(mut self, fallback: &SweepParams) -> Self {
        if self.start_freq == 0.0 || self.start_freq.is_nan() {
            self.start_freq = fallback.start_freq;
        }
        if self.end_freq == 0.0 || self.end_freq.is_nan() {
            self.end_freq = fallback.end_freq;
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            self.duration_secs = fallback.duration_secs;
        }
        self.start_freq = self.start_freq.clamp(MIN_FREQUENCY, MAX_FREQUENCY);
        self.end_freq = self.end_freq.clamp(MIN_FREQUENCY, MAX_FREQUENCY);
        self
    }

    /// Exact curve value at `progress` in [0, 1]
    pub fn frequency_at(&self, progress: f64) -> f64 {
        let p = progress.clamp(0.0, 1.0);
        match self.curve {
            SweepCurve::Linear => self.start_freq + p * (self.end_freq - self.start_freq),
            SweepCurve::Logarithmic => {
                let ln_start = libm::log(self.start_freq);
                let ln_end = libm::log(self.end_freq);
                libm::exp(ln_start + p * (ln_end - ln_start))
            }
        }
    }
}

/// Sweep state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPhase {
    #[default]
    Idle,
    Sweeping,
    Completed,
    Cancelled,
}

/// A running sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepState {
    pub params: SweepParams,
    /// Audio-clock start time in seconds
    pub start_time: Option<f64>,
    pub active: bool,
}

/// Result of one advance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepStep {
    pub frequency: f64,
    pub progress: f64,
    /// True on the advance that reached the end of the ramp
    pub completed: bool,
}

/// Frame-driven sweep state machine
#[derive(Debug, Default)]
pub struct SweepController {
    phase: SweepPhase,
    state: Option<SweepState>,
    progress: f64,
}

impl SweepController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SweepPhase {
        self.phase
    }

    pub fn is_sweeping(&self) -> bool {
        self.phase == SweepPhase::Sweeping
    }

    /// Progress of the current or last sweep in [0, 1]
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Parameters of the running sweep
    pub fn state(&self) -> Option<&SweepState> {
        self.state.as_ref()
    }

    /// Begin sweeping at audio time `now`, returning the start frequency
    pub fn start(&mut self, params: SweepParams, now: f64) -> f64 {
        tracing::info!(
            start = params.start_freq,
            end = params.end_freq,
            duration = params.duration_secs,
            curve = %params.curve,
            "sweep started"
        );
        self.state = Some(SweepState {
            params,
            start_time: Some(now),
            active: true,
        });
        self.phase = SweepPhase::Sweeping;
        self.progress = 0.0;
        params.start_freq
    }

    /// Compute the frequency for audio time `now`.
    ///
    /// Returns `None` unless sweeping. The step that reaches the end of the
    /// ramp has `completed` set and moves the controller to `Completed`.
    pub fn advance(&mut self, now: f64) -> Option<SweepStep> {
        if self.phase != SweepPhase::Sweeping {
            return None;
        }
        let state = self.state.as_ref().filter(|s| s.active)?;
        let start = state.start_time?;

        let elapsed = now - start;
        let progress = (elapsed / state.params.duration_secs).clamp(0.0, 1.0);
        let frequency = state.params.frequency_at(progress);
        self.progress = progress;

        let completed = progress >= 1.0;
        if completed {
            tracing::info!(frequency, "sweep completed");
            self.phase = SweepPhase::Completed;
            self.state = None;
        }

        Some(SweepStep {
            frequency,
            progress,
            completed,
        })
    }

    /// Abort a running sweep. Only valid while sweeping.
    pub fn cancel(&mut self) -> bool {
        if self.phase != SweepPhase::Sweeping {
            return false;
        }
        tracing::info!(progress = self.progress, "sweep cancelled");
        self.phase = SweepPhase::Cancelled;
        self.state = None;
        self.progress = 0.0;
        true
    }

    /// Return from a terminal phase to idle
    pub fn settle(&mut self) {
        if matches!(self.phase, SweepPhase::Completed | SweepPhase::Cancelled) {
            self.phase = SweepPhase::Idle;
            self.progress = 0.0;
        }
    }
}
