//! Signal Graph
//!
//! The fixed output topology every producer plays through:
//!
//! ```text
//! Producer → MasterGain → Splitter → {LeftGain, RightGain} → Merger → AnalysisTap → Destination
//! ```
//!
//! The graph exclusively owns the producer currently feeding its input.
//! Sources never hold the producer itself, only a generational
//! [`ProducerId`]; once a producer is evicted the id goes stale and every
//! lookup through it returns `None`. At most one producer is attached at any
//! time.
//!
//! Gain edges are the only mutable part of the topology. They move towards
//! their targets with an exponential approach (time constant
//! `gain_time_constant`) so level and routing changes never click. While the
//! host has suspended audio, gain and frequency changes are queued and
//! applied in order once [`SignalGraph::resume`] is called.

use crate::analysis::AnalysisTap;
use crate::config::EngineConfig;
use crate::noise::NoiseLoop;
use crate::sequencer::PolarityPair;
use crate::settings::{Channel, Waveform};
use crate::tone::Oscillator;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Weak handle to the producer attached to the graph input
    pub struct ProducerId;
}

/// The kinds of audio producer that can hold the graph input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKind {
    Tone,
    Noise,
    PolarityPair,
}

/// An audio producer owned by the graph
pub enum Producer {
    Tone(Oscillator),
    Noise(NoiseLoop),
    PolarityPair(PolarityPair),
}

/// One rendered producer frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    /// Mono signal, routed through master gain and the channel splitter
    Mono(f64),
    /// Private stereo pair, already leveled, entering at the merger
    Stereo(f64, f64),
}

impl Producer {
    pub fn kind(&self) -> ProducerKind {
        match self {
            Producer::Tone(_) => ProducerKind::Tone,
            Producer::Noise(_) => ProducerKind::Noise,
            Producer::PolarityPair(_) => ProducerKind::PolarityPair,
        }
    }

    #[inline]
    fn next_frame(&mut self) -> Frame {
        match self {
            Producer::Tone(osc) => Frame::Mono(osc.next_sample()),
            Producer::Noise(noise) => Frame::Mono(noise.next_sample()),
            Producer::PolarityPair(pair) => {
                let (left, right) = pair.next_frame();
                Frame::Stereo(left, right)
            }
        }
    }
}

/// Roles of the fixed graph nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Input,
    MasterGain,
    Splitter,
    LeftGain,
    RightGain,
    Merger,
    AnalysisTap,
    Destination,
}

/// Wiring of the graph, as (from, to) role pairs
pub const TOPOLOGY: [(NodeRole, NodeRole); 8] = [
    (NodeRole::Input, NodeRole::MasterGain),
    (NodeRole::MasterGain, NodeRole::Splitter),
    (NodeRole::Splitter, NodeRole::LeftGain),
    (NodeRole::Splitter, NodeRole::RightGain),
    (NodeRole::LeftGain, NodeRole::Merger),
    (NodeRole::RightGain, NodeRole::Merger),
    (NodeRole::Merger, NodeRole::AnalysisTap),
    (NodeRole::AnalysisTap, NodeRole::Destination),
];

/// Gain with a smoothed (exponential approach) transition to its target
#[derive(Debug, Clone)]
pub struct SmoothedGain {
    current: f64,
    target: f64,
    /// Per-sample retention factor, exp(-1 / (tau * sample_rate))
    coefficient: f64,
}

impl SmoothedGain {
    pub fn new(value: f64, time_constant: f64, sample_rate: f64) -> Self {
        Self {
            current: value,
            target: value,
            coefficient: libm::exp(-1.0 / (time_constant * sample_rate)),
        }
    }

    /// Start moving towards a new target
    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn value(&self) -> f64 {
        self.current
    }

    /// Advance one sample and return the gain for it
    #[inline]
    pub fn next(&mut self) -> f64 {
        self.current = self.target + (self.current - self.target) * self.coefficient;
        self.current
    }
}

/// Host audio lifecycle as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    Running,
    Suspended,
}

/// A parameter change that must wait for a running host
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GraphCommand {
    MasterVolume(f64),
    ChannelGains(Channel),
    Retarget {
        producer: ProducerId,
        frequency: f64,
    },
    Reshape {
        producer: ProducerId,
        waveform: Waveform,
    },
}

impl GraphCommand {
    /// True when both commands set the same parameter, so only the later one matters
    pub fn same_target(&self, other: &GraphCommand) -> bool {
        match (self, other) {
            (GraphCommand::MasterVolume(_), GraphCommand::MasterVolume(_))
            | (GraphCommand::ChannelGains(_), GraphCommand::ChannelGains(_)) => true,
            (
                GraphCommand::Retarget { producer: a, .. },
                GraphCommand::Retarget { producer: b, .. },
            )
            | (
                GraphCommand::Reshape { producer: a, .. },
                GraphCommand::Reshape { producer: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

/// Gain stages and analysis tap, created by `initialize`
struct Stages {
    master: SmoothedGain,
    left: SmoothedGain,
    right: SmoothedGain,
    tap: AnalysisTap,
}

/// The engine's audio output graph
pub struct SignalGraph {
    config: EngineConfig,
    stages: Option<Stages>,
    producers: SlotMap<ProducerId, Producer>,
    host: HostState,
    resume_requested: bool,
    deferred: Vec<GraphCommand>,
    frames_rendered: u64,
}

impl SignalGraph {
    /// Create an unbuilt graph; nothing renders until `initialize`
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.clone(),
            stages: None,
            producers: SlotMap::with_key(),
            host: HostState::Running,
            resume_requested: false,
            deferred: Vec::new(),
            frames_rendered: 0,
        }
    }

    /// Build the topology with the given starting levels. No-op once built.
    pub fn initialize(&mut self, volume: f64, channel: Channel) {
        if self.stages.is_some() {
            return;
        }

        let tau = self.config.gain_time_constant;
        let sr = self.config.sample_rate;
        let (left, right) = channel.gains();
        self.stages = Some(Stages {
            master: SmoothedGain::new(volume, tau, sr),
            left: SmoothedGain::new(left, tau, sr),
            right: SmoothedGain::new(right, tau, sr),
            tap: AnalysisTap::new(&self.config),
        });
        tracing::debug!(volume, %channel, "signal graph initialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.stages.is_some()
    }

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    /// Audio clock in seconds; only advances while rendering
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.config.sample_rate
    }

    // =========================================================================
    // Host lifecycle
    // =========================================================================

    pub fn host_state(&self) -> HostState {
        self.host
    }

    /// The host suspended audio output
    pub fn suspend(&mut self) {
        if self.host != HostState::Suspended {
            tracing::info!("host audio suspended");
        }
        self.host = HostState::Suspended;
    }

    /// Whether a deferred change is waiting for the host to resume
    pub fn resume_requested(&self) -> bool {
        self.resume_requested
    }

    /// Flag that the host should resume before the next change lands
    pub fn request_resume(&mut self) {
        if self.host == HostState::Suspended {
            self.resume_requested = true;
        }
    }

    /// The host resumed audio output; flush deferred changes in order
    pub fn resume(&mut self) {
        self.host = HostState::Running;
        self.resume_requested = false;
        let deferred = core::mem::take(&mut self.deferred);
        if !deferred.is_empty() {
            tracing::info!(count = deferred.len(), "applying deferred graph changes");
        }
        for command in deferred {
            self.execute(command);
        }
    }

    /// Number of changes waiting for resume
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    // =========================================================================
    // Parameter changes
    // =========================================================================

    /// Apply a change now, or queue it while the host is suspended.
    ///
    /// The queue holds at most one change per parameter; a newer change
    /// replaces the queued one.
    pub fn apply(&mut self, command: GraphCommand) {
        if self.host == HostState::Suspended {
            tracing::debug!(?command, "host suspended, deferring change");
            self.resume_requested = true;
            match self.deferred.iter_mut().find(|c| c.same_target(&command)) {
                Some(queued) => *queued = command,
                None => self.deferred.push(command),
            }
            return;
        }
        self.execute(command);
    }

    pub fn set_master_volume(&mut self, volume: f64) {
        self.apply(GraphCommand::MasterVolume(volume.clamp(0.0, 1.0)));
    }

    pub fn set_channel_gains(&mut self, channel: Channel) {
        self.apply(GraphCommand::ChannelGains(channel));
    }

    fn execute(&mut self, command: GraphCommand) {
        match command {
            GraphCommand::MasterVolume(volume) => {
                if let Some(stages) = self.stages.as_mut() {
                    stages.master.set_target(volume);
                }
            }
            GraphCommand::ChannelGains(channel) => {
                if let Some(stages) = self.stages.as_mut() {
                    let (left, right) = channel.gains();
                    stages.left.set_target(left);
                    stages.right.set_target(right);
                }
            }
            GraphCommand::Retarget {
                producer,
                frequency,
            } => {
                if let Some(Producer::Tone(osc)) = self.producers.get_mut(producer) {
                    osc.set_frequency(frequency);
                }
            }
            GraphCommand::Reshape { producer, waveform } => {
                if let Some(Producer::Tone(osc)) = self.producers.get_mut(producer) {
                    osc.set_waveform(waveform);
                }
            }
        }
    }

    /// Current target gains (master, left, right)
    pub fn gain_targets(&self) -> Option<(f64, f64, f64)> {
        self.stages
            .as_ref()
            .map(|s| (s.master.target(), s.left.target(), s.right.target()))
    }

    /// Current instantaneous gains (master, left, right)
    pub fn gain_values(&self) -> Option<(f64, f64, f64)> {
        self.stages
            .as_ref()
            .map(|s| (s.master.value(), s.left.value(), s.right.value()))
    }

    // =========================================================================
    // Producer slot
    // =========================================================================

    /// Attach a producer to the graph input, evicting whatever held it
    pub fn attach(&mut self, producer: Producer) -> ProducerId {
        for kind in self.detach_all() {
            tracing::warn!(?kind, "producer evicted by attach");
        }
        let kind = producer.kind();
        let id = self.producers.insert(producer);
        tracing::debug!(?kind, "producer attached");
        id
    }

    /// Detach one producer; false when the id is stale
    pub fn detach(&mut self, id: ProducerId) -> bool {
        match self.producers.remove(id) {
            Some(producer) => {
                tracing::debug!(kind = ?producer.kind(), "producer detached");
                true
            }
            None => false,
        }
    }

    /// Detach everything, returning the kinds that were removed
    pub fn detach_all(&mut self) -> Vec<ProducerKind> {
        self.producers.drain().map(|(_, p)| p.kind()).collect()
    }

    pub fn contains(&self, id: ProducerId) -> bool {
        self.producers.contains_key(id)
    }

    pub fn producer(&self, id: ProducerId) -> Option<&Producer> {
        self.producers.get(id)
    }

    /// Number of attached producers, always 0 or 1
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Kind of the attached producer, if any
    pub fn active_kind(&self) -> Option<ProducerKind> {
        self.producers.values().next().map(Producer::kind)
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render one stereo frame through the topology
    #[inline]
    fn render_frame(&mut self) -> (f32, f32) {
        let Some(stages) = self.stages.as_mut() else {
            return (0.0, 0.0);
        };

        let master = stages.master.next();
        let left_gain = stages.left.next();
        let right_gain = stages.right.next();

        let frame = self.producers.values_mut().next().map(Producer::next_frame);
        let (left, right) = match frame {
            Some(Frame::Mono(sample)) => {
                let leveled = sample * master;
                (leveled * left_gain, leveled * right_gain)
            }
            Some(Frame::Stereo(left, right)) => (left, right),
            None => (0.0, 0.0),
        };

        let (left, right) = (left as f32, right as f32);
        stages.tap.push(0.5 * (left + right));
        (left, right)
    }

    /// Fill planar output buffers. Silent, with the clock held, while suspended.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        if self.host == HostState::Suspended {
            left.fill(0.0);
            right.fill(0.0);
            return;
        }

        for i in 0..frames {
            let (l, r) = self.render_frame();
            left[i] = l;
            right[i] = r;
        }
        self.frames_rendered += frames as u64;
    }

    /// Fill an interleaved stereo buffer
    pub fn render_interleaved(&mut self, output: &mut [f32]) {
        if self.host == HostState::Suspended {
            output.fill(0.0);
            return;
        }

        let mut frames = 0u64;
        for pair in output.chunks_exact_mut(2) {
            let (l, r) = self.render_frame();
            pair[0] = l;
            pair[1] = r;
            frames += 1;
        }
        self.frames_rendered += frames;
    }

    // =========================================================================
    // Analysis tap
    // =========================================================================

    /// Amplitude codes from the analysis tap
    pub fn byte_time_domain_data(&self) -> Option<Vec<u8>> {
        self.stages.as_ref().map(|s| s.tap.byte_time_domain_data())
    }

    /// Magnitude codes from the analysis tap
    pub fn byte_frequency_data(&mut self) -> Option<Vec<u8>> {
        self.stages.as_mut().map(|s| s.tap.byte_frequency_data())
    }

    /// Snapshot length of the analysis tap
    pub fn bin_count(&self) -> usize {
        self.config.bin_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn graph() -> SignalGraph {
        let mut graph = SignalGraph::new(&EngineConfig::default());
        graph.initialize(1.0, Channel::Both);
        graph
    }

    fn tone(freq: f64) -> Producer {
        Producer::Tone(Oscillator::new(Waveform::Sine, freq, 44_100.0))
    }

    #[test]
    fn test_topology_is_a_chain_to_destination() {
        assert_eq!(TOPOLOGY.first().unwrap().0, NodeRole::Input);
        assert_eq!(TOPOLOGY.last().unwrap().1, NodeRole::Destination);
        let into_merger = TOPOLOGY
            .iter()
            .filter(|(_, to)| *to == NodeRole::Merger)
            .count();
        assert_eq!(into_merger, 2);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut graph = graph();
        graph.set_master_volume(0.3);
        graph.initialize(0.9, Channel::Left);
        assert_eq!(graph.gain_targets(), Some((0.3, 1.0, 1.0)));
    }

    #[test]
    fn test_uninitialized_graph_renders_silence() {
        let mut graph = SignalGraph::new(&EngineConfig::default());
        graph.attach(tone(440.0));
        let mut left = [1.0f32; 64];
        let mut right = [1.0f32; 64];
        graph.render(&mut left, &mut right);
        assert!(left.iter().chain(right.iter()).all(|&s| s == 0.0));
        assert!(graph.byte_time_domain_data().is_none());
    }

    #[test]
    fn test_attach_evicts_incumbent() {
        let mut graph = graph();
        let first = graph.attach(tone(440.0));
        let second = graph.attach(tone(880.0));
        assert_eq!(graph.producer_count(), 1);
        assert!(!graph.contains(first));
        assert!(graph.contains(second));
        assert!(!graph.detach(first));
        assert!(graph.detach(second));
        assert_eq!(graph.producer_count(), 0);
    }

    #[test]
    fn test_channel_gains_are_smoothed() {
        let mut graph = graph();
        graph.attach(tone(440.0));
        graph.set_channel_gains(Channel::Left);

        let mut left = [0.0f32; 1];
        let mut right = [0.0f32; 1];
        graph.render(&mut left, &mut right);

        // One sample later the right gain has barely moved
        let (_, l, r) = graph.gain_values().unwrap();
        assert_eq!(l, 1.0);
        assert!(r > 0.99, "right gain dropped instantly: {}", r);

        // After five time constants it has essentially arrived
        let frames = (0.25 * 44_100.0) as usize;
        let mut left = vec![0.0f32; frames];
        let mut right = vec![0.0f32; frames];
        graph.render(&mut left, &mut right);
        let (_, _, r) = graph.gain_values().unwrap();
        assert!(r < 0.01);
    }

    #[test]
    fn test_smoothed_gain_time_constant() {
        let sr = 1000.0;
        let mut gain = SmoothedGain::new(1.0, 0.05, sr);
        gain.set_target(0.0);
        for _ in 0..50 {
            gain.next();
        }
        // One time constant: 1/e of the distance remains
        assert_abs_diff_eq!(gain.value(), (-1.0f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn test_suspended_changes_are_deferred() {
        let mut graph = graph();
        let id = graph.attach(tone(440.0));
        graph.suspend();

        graph.set_master_volume(0.2);
        graph.apply(GraphCommand::Retarget {
            producer: id,
            frequency: 1000.0,
        });

        assert!(graph.resume_requested());
        assert_eq!(graph.deferred_count(), 2);
        assert_eq!(graph.gain_targets().unwrap().0, 1.0);

        graph.resume();
        assert!(!graph.resume_requested());
        assert_eq!(graph.deferred_count(), 0);
        assert_eq!(graph.gain_targets().unwrap().0, 0.2);
        match graph.producer(id) {
            Some(Producer::Tone(osc)) => assert_eq!(osc.frequency(), 1000.0),
            _ => panic!("Expected tone producer"),
        }
    }

    #[test]
    fn test_suspended_changes_coalesce_per_parameter() {
        let mut graph = graph();
        let id = graph.attach(tone(440.0));
        graph.suspend();

        for i in 0..600 {
            graph.apply(GraphCommand::Retarget {
                producer: id,
                frequency: 100.0 + i as f64,
            });
            graph.set_master_volume(0.5);
        }
        graph.set_channel_gains(Channel::Right);
        graph.apply(GraphCommand::Reshape {
            producer: id,
            waveform: Waveform::Square,
        });
        assert_eq!(graph.deferred_count(), 4);

        // A different producer gets its own entry
        let other = graph.attach(tone(880.0));
        graph.apply(GraphCommand::Retarget {
            producer: other,
            frequency: 300.0,
        });
        assert_eq!(graph.deferred_count(), 5);

        graph.resume();
        assert_eq!(graph.deferred_count(), 0);
        assert_eq!(graph.gain_targets(), Some((0.5, 0.0, 1.0)));
        match graph.producer(other) {
            Some(Producer::Tone(osc)) => assert_eq!(osc.frequency(), 300.0),
            _ => panic!("Expected tone producer"),
        }
    }

    #[test]
    fn test_suspended_render_holds_clock() {
        let mut graph = graph();
        graph.attach(tone(440.0));
        let mut buf = vec![0.0f32; 256];
        graph.render_interleaved(&mut buf);
        let t = graph.current_time();
        assert_abs_diff_eq!(t, 128.0 / 44_100.0, epsilon = 1e-12);

        graph.suspend();
        graph.render_interleaved(&mut buf);
        assert_eq!(graph.current_time(), t);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_tap_sees_rendered_signal() {
        let mut graph = graph();
        graph.attach(tone(1000.0));
        let mut left = vec![0.0f32; 4096];
        let mut right = vec![0.0f32; 4096];
        graph.render(&mut left, &mut right);

        let bytes = graph.byte_time_domain_data().unwrap();
        assert!(bytes.iter().any(|&b| b > 200));
        assert!(bytes.iter().any(|&b| b < 56));
    }
}
