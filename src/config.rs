//! Engine configuration
//!
//! Everything the host may want to tune before the engine starts: sample
//! rate, analysis window, smoothing constants, noise buffer length and the
//! initial playback/sweep targets. Loadable from JSON; missing fields take
//! their defaults.

use crate::error::Result;
use crate::settings::PlaybackSettings;
use crate::sweep::SweepParams;
use serde::{Deserialize, Serialize};

/// Smallest analysis window accepted
pub const MIN_FFT_SIZE: usize = 32;

/// Largest analysis window accepted
pub const MAX_FFT_SIZE: usize = 32_768;

/// Configuration for the tone engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(default)]
pub struct EngineConfig {
    /// Host sample rate in Hz (default: 44100)
    pub sample_rate: f64,
    /// Analysis window size in samples (default: 2048)
    pub fft_size: usize,
    /// Magnitude smoothing between analysis snapshots, 0..1 (default: 0.8)
    pub smoothing_time_constant: f64,
    /// Magnitude mapped to byte 0 (default: -100 dB)
    pub min_decibels: f64,
    /// Magnitude mapped to byte 255 (default: -30 dB)
    pub max_decibels: f64,
    /// Time constant of smoothed gain transitions in seconds (default: 0.05)
    pub gain_time_constant: f64,
    /// Length of the looped noise buffer in seconds (default: 2.0)
    pub noise_buffer_seconds: f64,
    /// Fixed noise seed; host entropy when absent
    pub noise_seed: Option<u64>,
    /// Playback target at startup
    pub initial: PlaybackSettings,
    /// Sweep parameters used by `toggle_sweep` and as fallbacks
    pub sweep: SweepParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            fft_size: 2048,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            gain_time_constant: 0.05,
            noise_buffer_seconds: 2.0,
            noise_seed: None,
            initial: PlaybackSettings::default(),
            sweep: SweepParams::default(),
        }
    }
}

impl EngineConfig {
    /// Create a default configuration at the given sample rate
    pub fn with_sample_rate(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            ..Default::default()
        }
        .sanitized()
    }

    /// Parse a configuration from JSON and sanitize it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of magnitude bins the analysis tap reports
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Clamp every field into its domain
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        if !self.sample_rate.is_finite() || self.sample_rate < 8_000.0 {
            tracing::warn!(sample_rate = self.sample_rate, "unusable sample rate, using default");
            self.sample_rate = defaults.sample_rate;
        }
        self.fft_size = self
            .fft_size
            .clamp(MIN_FFT_SIZE, MAX_FFT_SIZE)
            .next_power_of_two();
        if !self.smoothing_time_constant.is_finite() {
            self.smoothing_time_constant = defaults.smoothing_time_constant;
        }
        self.smoothing_time_constant = self.smoothing_time_constant.clamp(0.0, 1.0);
        if !(self.min_decibels.is_finite()
            && self.max_decibels.is_finite()
            && self.min_decibels < self.max_decibels)
        {
            self.min_decibels = defaults.min_decibels;
            self.max_decibels = defaults.max_decibels;
        }
        if !self.gain_time_constant.is_finite() || self.gain_time_constant <= 0.0 {
            self.gain_time_constant = defaults.gain_time_constant;
        }
        if !self.noise_buffer_seconds.is_finite() || self.noise_buffer_seconds <= 0.0 {
            self.noise_buffer_seconds = defaults.noise_buffer_seconds;
        }
        self.initial = self.initial.sanitized();
        self.sweep = self.sweep.sanitized(&defaults.sweep);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Waveform;
    use crate::sweep::SweepCurve;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.fft_size, 2048);
        assert_eq!(config.bin_count(), 1024);
        assert_eq!(config.gain_time_constant, 0.05);
        assert_eq!(config.sweep.curve, SweepCurve::Logarithmic);
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json(
            r#"{ "sample_rate": 48000.0, "initial": { "waveform": "square" } }"#,
        )
        .unwrap();
        assert_eq!(config.sample_rate, 48_000.0);
        assert_eq!(config.initial.waveform, Waveform::Square);
        assert_eq!(config.initial.frequency, 440.0);
        assert_eq!(config.fft_size, 2048);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(EngineConfig::from_json("{ not json").is_err());
    }

    #[test]
    fn test_sanitize_clamps_fields() {
        let config = EngineConfig {
            sample_rate: -1.0,
            fft_size: 3000,
            smoothing_time_constant: 4.0,
            min_decibels: -10.0,
            max_decibels: -20.0,
            gain_time_constant: 0.0,
            noise_buffer_seconds: f64::NAN,
            ..Default::default()
        }
        .sanitized();

        assert_eq!(config.sample_rate, 44_100.0);
        assert_eq!(config.fft_size, 4096);
        assert_eq!(config.smoothing_time_constant, 1.0);
        assert_eq!(config.min_decibels, -100.0);
        assert_eq!(config.max_decibels, -30.0);
        assert_eq!(config.gain_time_constant, 0.05);
        assert_eq!(config.noise_buffer_seconds, 2.0);
    }

    #[test]
    fn test_json_roundtrip_keeps_seed() {
        let config = EngineConfig {
            noise_seed: Some(99),
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        let back = EngineConfig::from_json(&json).unwrap();
        assert_eq!(back.noise_seed, Some(99));
    }
}
