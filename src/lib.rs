//! # freqgen: Tone and Noise Generation Engine
//!
//! `freqgen` is the audio core of a browser tone generator: a fixed signal
//! graph fed by one producer at a time, with the tests and displays built on
//! top of it.
//!
//! ## Architecture
//!
//! - **Signal graph** - input → master gain → splitter → per-channel gains →
//!   merger → analysis tap → output, with smoothed gain transitions
//! - **Producers** - a band-limited tone oscillator, looped white/pink/brown
//!   noise, or the private polarity pair; starting one stops the others
//! - **Controllers** - a frame-driven frequency sweep and timer-driven test
//!   sequences (hearing threshold, tinnitus octave check, polarity)
//! - **Display** - waveform trace, warped spectrum bars and note names
//!
//! The engine renders its own audio. The host pulls blocks with
//! [`Engine::render`], reports suspend/resume, and drives the two clocks
//! with [`Engine::on_frame`] and [`Engine::tick`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use freqgen::prelude::*;
//!
//! let mut engine = Engine::with_sample_rate(48_000.0);
//! engine.set_frequency(1_000.0);
//! engine.set_channel(Channel::Left);
//! engine.play();
//!
//! let mut left = vec![0.0f32; 128];
//! let mut right = vec![0.0f32; 128];
//! engine.render(&mut left, &mut right);
//!
//! engine.start_sweep(SweepParams::default());
//! engine.on_frame();
//! println!("{} Hz ({})", engine.display_frequency(), engine.note_name());
//! ```

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod noise;
pub mod pitch;
pub mod presets;
pub mod rng;
pub mod sequencer;
pub mod settings;
pub mod sweep;
pub mod tone;
pub mod visual;

#[cfg(feature = "wasm")]
pub mod wasm;

/// Prelude module for convenient imports
pub mod prelude {
    // Engine
    pub use crate::config::EngineConfig;
    pub use crate::engine::{Engine, EngineStatus, VisualFrame};
    pub use crate::error::{EngineError, Result};

    // Settings
    pub use crate::settings::{
        clamp_and_quantize, Channel, PlaybackDuration, PlaybackSettings, Waveform, MAX_FREQUENCY,
        MIN_FREQUENCY,
    };

    // Signal graph and producers
    pub use crate::graph::{HostState, NodeRole, ProducerId, ProducerKind, SignalGraph, TOPOLOGY};
    pub use crate::noise::{NoiseColor, NoiseSource};
    pub use crate::rng::NoiseRng;
    pub use crate::tone::{Oscillator, ToneSource};

    // Controllers
    pub use crate::sequencer::{
        HearingBand, HearingResult, PolarityReport, TestReport, TestSequencer, TinnitusReport,
    };
    pub use crate::sweep::{SweepCurve, SweepParams, SweepPhase, SweepStep};

    // Presets and display
    pub use crate::pitch::{describe, name_of, Pitch};
    pub use crate::presets::{Preset, PresetCategory, PresetInfo, PresetLibrary};
    pub use crate::visual::{Bar, PeakMarker, Viewport, WaveformTrace};
}

// Re-export key types at crate root for convenience
pub use prelude::*;
