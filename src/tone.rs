//! Tone Source
//!
//! A single periodic oscillator attached to the signal graph. The source
//! itself only remembers which producer slot it claimed; the oscillator is
//! owned by the graph, so a tone that has been evicted by some other
//! producer simply stops being found.
//!
//! Retargeting changes frequency in place and keeps phase continuous.
//! Starting always builds a fresh oscillator at phase zero.

use crate::graph::{GraphCommand, Producer, ProducerId, SignalGraph};
use crate::settings::{clamp_and_quantize, Waveform};
use core::f64::consts::TAU;

/// Phase-accumulating oscillator with band-limited edges
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    frequency: f64,
    /// Normalized phase in [0, 1)
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        Self {
            waveform,
            frequency,
            phase: 0.0,
            sample_rate,
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Produce one sample in [-1, 1] and advance the phase
    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        let inc = (self.frequency / self.sample_rate).min(0.5);
        let p = self.phase;

        let value = match self.waveform {
            Waveform::Sine => libm::sin(p * TAU),
            Waveform::Triangle => 4.0 * ((p + 0.75).fract() - 0.5).abs() - 1.0,
            Waveform::Sawtooth => {
                // Rising ramp crossing zero at phase 0, wrapping at 0.5
                let t = (p + 0.5).fract();
                2.0 * t - 1.0 - poly_blep(t, inc)
            }
            Waveform::Square => {
                let naive = if p < 0.5 { 1.0 } else { -1.0 };
                naive + poly_blep(p, inc) - poly_blep((p + 0.5).fract(), inc)
            }
        };

        self.phase = (p + inc).fract();
        value
    }
}

/// Polynomial correction around a unit step at t = 0
#[inline]
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

/// Owner of the tone producer slot
#[derive(Debug, Default)]
pub struct ToneSource {
    producer: Option<ProducerId>,
}

impl ToneSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh oscillator and attach it to the graph input
    pub fn start(&mut self, graph: &mut SignalGraph, waveform: Waveform, frequency: f64) -> f64 {
        let frequency = clamp_and_quantize(frequency);
        let osc = Oscillator::new(waveform, frequency, graph.sample_rate());
        self.producer = Some(graph.attach(Producer::Tone(osc)));
        tracing::debug!(frequency, %waveform, "tone started");
        frequency
    }

    /// Move a running tone to a new frequency without restarting it.
    ///
    /// Returns the quantized frequency, or `None` when no tone is running.
    pub fn retarget(&self, graph: &mut SignalGraph, frequency: f64) -> Option<f64> {
        let id = self.running_id(graph)?;
        let frequency = clamp_and_quantize(frequency);
        graph.apply(GraphCommand::Retarget {
            producer: id,
            frequency,
        });
        Some(frequency)
    }

    /// Change the shape of a running tone
    pub fn set_waveform(&self, graph: &mut SignalGraph, waveform: Waveform) -> bool {
        match self.running_id(graph) {
            Some(id) => {
                graph.apply(GraphCommand::Reshape {
                    producer: id,
                    waveform,
                });
                true
            }
            None => false,
        }
    }

    /// Detach the tone. No-op when it is not running.
    pub fn stop(&mut self, graph: &mut SignalGraph) -> bool {
        match self.producer.take() {
            Some(id) => {
                let stopped = graph.detach(id);
                if stopped {
                    tracing::debug!("tone stopped");
                }
                stopped
            }
            None => false,
        }
    }

    pub fn is_running(&self, graph: &SignalGraph) -> bool {
        self.running_id(graph).is_some()
    }

    /// Frequency of the live oscillator, if any
    pub fn frequency(&self, graph: &SignalGraph) -> Option<f64> {
        match graph.producer(self.producer?) {
            Some(Producer::Tone(osc)) => Some(osc.frequency()),
            _ => None,
        }
    }

    fn running_id(&self, graph: &SignalGraph) -> Option<ProducerId> {
        self.producer.filter(|&id| graph.contains(id))
    }
}
