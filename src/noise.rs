//! Noise Source
//!
//! Colored noise rendered into one looped buffer. Each buffer is filled
//! from white uniform samples pushed through the color's filter, whose
//! memory starts at zero for every buffer, so switching color never carries
//! state from the previous one.
//!
//! - white: uniform in [-1, 1]
//! - pink: Paul Kellet's refined 7-pole filter (-3 dB/octave)
//! - brown: leaky integrator (-6 dB/octave), scaled back up to an audible level

use crate::error::EngineError;
use crate::graph::{Producer, ProducerId, SignalGraph};
use core::fmt;
use core::str::FromStr;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Gain applied to the brown integrator output
const BROWN_GAIN: f64 = 3.5;

/// Spectral color of the noise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    White,
    Pink,
    Brown,
}

impl NoiseColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoiseColor::White => "white",
            NoiseColor::Pink => "pink",
            NoiseColor::Brown => "brown",
        }
    }

    /// Short description for the host's info line
    pub fn description(&self) -> &'static str {
        match self {
            NoiseColor::White => {
                "Equal energy at all frequencies. Useful for testing and masking sounds."
            }
            NoiseColor::Pink => {
                "Equal energy per octave. Best for speaker testing and room acoustics measurement."
            }
            NoiseColor::Brown => {
                "Deeper, bass-heavy noise. Good for relaxation and masking low-frequency sounds."
            }
        }
    }
}

impl fmt::Display for NoiseColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoiseColor {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => Ok(NoiseColor::White),
            "pink" => Ok(NoiseColor::Pink),
            "brown" | "brownian" | "red" => Ok(NoiseColor::Brown),
            _ => Err(EngineError::UnknownNoiseColor(s.to_string())),
        }
    }
}

/// Paul Kellet's refined pink filter
#[derive(Debug, Clone, Default)]
pub struct PinkFilter {
    b: [f64; 7],
}

impl PinkFilter {
    #[inline]
    pub fn process(&mut self, white: f64) -> f64 {
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + white * 0.0555179;
        b[1] = 0.99332 * b[1] + white * 0.0750759;
        b[2] = 0.96900 * b[2] + white * 0.1538520;
        b[3] = 0.86650 * b[3] + white * 0.3104856;
        b[4] = 0.55000 * b[4] + white * 0.5329522;
        b[5] = -0.7616 * b[5] - white * 0.0168980;
        let out = (b.iter().sum::<f64>() + white * 0.5362) * 0.11;
        b[6] = white * 0.115926;
        out
    }

    pub fn taps(&self) -> &[f64] {
        &self.b
    }
}

/// Leaky integrator for brown noise
#[derive(Debug, Clone, Default)]
pub struct BrownFilter {
    last: f64,
}

impl BrownFilter {
    #[inline]
    pub fn process(&mut self, white: f64) -> f64 {
        self.last = (self.last + 0.02 * white) / 1.02;
        self.last * BROWN_GAIN
    }

    pub fn taps(&self) -> &[f64] {
        core::slice::from_ref(&self.last)
    }
}

/// Filter memory for one buffer's worth of noise
#[derive(Debug, Clone)]
pub enum NoiseState {
    White,
    Pink(PinkFilter),
    Brown(BrownFilter),
}

impl NoiseState {
    /// Zeroed memory for a color
    pub fn fresh(color: NoiseColor) -> Self {
        match color {
            NoiseColor::White => NoiseState::White,
            NoiseColor::Pink => NoiseState::Pink(PinkFilter::default()),
            NoiseColor::Brown => NoiseState::Brown(BrownFilter::default()),
        }
    }

    pub fn color(&self) -> NoiseColor {
        match self {
            NoiseState::White => NoiseColor::White,
            NoiseState::Pink(_) => NoiseColor::Pink,
            NoiseState::Brown(_) => NoiseColor::Brown,
        }
    }

    /// 7 taps for pink, 1 for brown, none for white
    pub fn filter_memory(&self) -> &[f64] {
        match self {
            NoiseState::White => &[],
            NoiseState::Pink(f) => f.taps(),
            NoiseState::Brown(f) => f.taps(),
        }
    }

    #[inline]
    pub fn process(&mut self, white: f64) -> f64 {
        match self {
            NoiseState::White => white,
            NoiseState::Pink(f) => f.process(white),
            NoiseState::Brown(f) => f.process(white),
        }
    }
}

/// Fill a fresh buffer of `len` samples of the given color
pub fn fill_noise_buffer<R: Rng + ?Sized>(color: NoiseColor, len: usize, rng: &mut R) -> Vec<f32> {
    let mut state = NoiseState::fresh(color);
    (0..len)
        .map(|_| {
            let white: f64 = rng.gen_range(-1.0..=1.0);
            state.process(white) as f32
        })
        .collect()
}

/// A looping noise buffer, the producer behind the Noise Source
#[derive(Debug, Clone)]
pub struct NoiseLoop {
    color: NoiseColor,
    buffer: Vec<f32>,
    position: usize,
}

impl NoiseLoop {
    pub fn new(color: NoiseColor, buffer: Vec<f32>) -> Self {
        Self {
            color,
            buffer,
            position: 0,
        }
    }

    pub fn color(&self) -> NoiseColor {
        self.color
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        let Some(&sample) = self.buffer.get(self.position) else {
            return 0.0;
        };
        self.position += 1;
        if self.position == self.buffer.len() {
            self.position = 0;
        }
        sample as f64
    }
}

/// Owner of the noise producer slot
#[derive(Debug, Default)]
pub struct NoiseSource {
    producer: Option<ProducerId>,
}

impl NoiseSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a buffer of `buffer_seconds` and attach it, looping
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        graph: &mut SignalGraph,
        color: NoiseColor,
        buffer_seconds: f64,
        rng: &mut R,
    ) -> ProducerId {
        let len = (buffer_seconds * graph.sample_rate()).round().max(1.0) as usize;
        let buffer = fill_noise_buffer(color, len, rng);
        let id = graph.attach(Producer::Noise(NoiseLoop::new(color, buffer)));
        tracing::debug!(%color, len, "noise started");
        self.producer = Some(id);
        id
    }

    /// Detach the noise. No-op when nothing is playing.
    pub fn stop(&mut self, graph: &mut SignalGraph) -> bool {
        match self.producer.take() {
            Some(id) => graph.detach(id),
            None => false,
        }
    }

    /// Color currently playing, if any
    pub fn current(&self, graph: &SignalGraph) -> Option<NoiseColor> {
        match graph.producer(self.producer?) {
            Some(Producer::Noise(noise)) => Some(noise.color()),
            _ => None,
        }
    }

    pub fn is_running(&self, graph: &SignalGraph) -> bool {
        self.current(graph).is_some()
    }
}
