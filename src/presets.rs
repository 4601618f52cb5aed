//! Preset Library
//!
//! Single-shot tests and reference frequencies. Unlike the timed tests in
//! [`crate::sequencer`], a preset is applied once: it sets routing and/or
//! frequency and makes sure a tone is playing. Nothing progresses afterwards.
//!
//! ```ignore
//! use freqgen::prelude::*;
//!
//! for info in PresetLibrary::by_category(PresetCategory::Bass) {
//!     println!("{}: {}", info.name, info.description);
//! }
//! engine.apply_preset(Preset::Bass(40.0));
//! ```

use crate::settings::Channel;
use serde::{Deserialize, Serialize};

/// Frequency used by the stereo test when nothing is playing
pub const STEREO_TEST_HZ: f64 = 440.0;

/// Sub-bass and bass check frequencies
pub const BASS_FREQUENCIES: [f64; 8] = [20.0, 30.0, 40.0, 50.0, 60.0, 80.0, 100.0, 120.0];

/// Standard pure-tone audiometry frequencies
pub const AUDIOMETRIC_FREQUENCIES: [f64; 7] =
    [125.0, 250.0, 500.0, 1_000.0, 2_000.0, 4_000.0, 8_000.0];

/// Reference tones with their names
pub const REFERENCE_FREQUENCIES: [(&str, f64); 6] = [
    ("Mains Hum (EU)", 50.0),
    ("Mains Hum (US)", 60.0),
    ("Middle C", 261.6),
    ("Concert A", 440.0),
    ("Reference Tone", 1_000.0),
    ("Upper Presence", 10_000.0),
];

/// Preset grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetCategory {
    /// Left/right/both routing checks
    Stereo,
    /// Low-frequency speaker checks
    Bass,
    /// Per-ear audiometry tones
    Audiometric,
    /// Named reference frequencies
    Reference,
}

/// A single-shot parameter application
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Preset {
    /// Route to a channel; starts 440 Hz when idle
    Stereo(Channel),
    /// Set a bass frequency; starts playing when idle
    Bass(f64),
    /// Route to the selected ear and set an audiometric frequency
    Audiometric(f64),
    /// Set any frequency; starts playing when idle
    Frequency(f64),
}

impl Preset {
    pub fn category(&self) -> PresetCategory {
        match self {
            Preset::Stereo(_) => PresetCategory::Stereo,
            Preset::Bass(_) => PresetCategory::Bass,
            Preset::Audiometric(_) => PresetCategory::Audiometric,
            Preset::Frequency(_) => PresetCategory::Reference,
        }
    }
}

/// Preset metadata for the host's buttons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetInfo {
    pub name: String,
    pub category: PresetCategory,
    pub description: String,
    pub preset: Preset,
}

impl PresetInfo {
    pub fn new(name: impl Into<String>, preset: Preset) -> Self {
        Self {
            name: name.into(),
            category: preset.category(),
            description: String::new(),
            preset,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }
}

/// Catalogue of every preset the engine offers
pub struct PresetLibrary;

impl PresetLibrary {
    /// All presets, grouped by category
    pub fn list() -> Vec<PresetInfo> {
        let mut presets = vec![
            PresetInfo::new("Left", Preset::Stereo(Channel::Left))
                .with_description("Tone in the left channel only"),
            PresetInfo::new("Center", Preset::Stereo(Channel::Both))
                .with_description("Tone in both channels"),
            PresetInfo::new("Right", Preset::Stereo(Channel::Right))
                .with_description("Tone in the right channel only"),
        ];

        presets.extend(BASS_FREQUENCIES.iter().map(|&f| {
            PresetInfo::new(format!("{} Hz", f), Preset::Bass(f))
                .with_description("Bass extension check")
        }));
        presets.extend(AUDIOMETRIC_FREQUENCIES.iter().map(|&f| {
            PresetInfo::new(format!("{} Hz", f), Preset::Audiometric(f))
                .with_description("Audiometry tone for the selected ear")
        }));
        presets.extend(REFERENCE_FREQUENCIES.iter().map(|&(name, f)| {
            PresetInfo::new(name, Preset::Frequency(f)).with_description(format!("{} Hz", f))
        }));

        presets
    }

    pub fn by_category(category: PresetCategory) -> Vec<PresetInfo> {
        Self::list()
            .into_iter()
            .filter(|p| p.category == category)
            .collect()
    }

    /// Find a preset by category and case-insensitive name
    pub fn get(category: PresetCategory, name: &str) -> Option<Preset> {
        Self::by_category(category)
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
            .map(|p| p.preset)
    }
}
