//! Engine
//!
//! The one context object that owns everything: playback settings, the
//! signal graph, both sources, the sweep controller and the running test.
//! Every operation the UI can trigger is a method here.
//!
//! Two host clocks drive it:
//!
//! - the frame clock calls [`Engine::on_frame`] (or [`Engine::advance_sweep`]
//!   with an explicit audio time) to move a running sweep
//! - the timer clock calls [`Engine::tick`] with milliseconds to step test
//!   sequences and fire timed playback cutoffs
//!
//! Audio is pulled with [`Engine::render`]. All producer changes funnel
//! through one arbitration step that stops the incumbent before anything
//! new is attached, so the graph never carries two producers.

use crate::config::EngineConfig;
use crate::graph::{HostState, Producer, ProducerId, ProducerKind, SignalGraph};
use crate::noise::{NoiseColor, NoiseSource};
use crate::pitch;
use crate::presets::{Preset, STEREO_TEST_HZ};
use crate::rng::NoiseRng;
use crate::sequencer::{
    HearingResult, HearingThresholdTest, PolarityComparator, PolarityPair, SequenceAction,
    SequenceEvent, TestReport, TestSequencer, TinnitusOctaveCheck,
};
use crate::settings::{clamp_and_quantize, Channel, PlaybackDuration, PlaybackSettings, Waveform};
use crate::sweep::{SweepController, SweepParams, SweepPhase, SweepStep};
use crate::tone::ToneSource;
use crate::visual::{self, Bar, PeakMarker, Viewport, WaveformTrace};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Coarse engine state for the status badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Ready,
    Playing,
    Sweeping,
}

/// Who is asking for the graph input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claimant {
    User,
    Test,
}

/// Timed stop for a tone with a finite duration
#[derive(Debug, Clone, Copy, PartialEq)]
enum Cutoff {
    /// Armed by the next timer tick, this many ms after it
    Pending(f64),
    /// Fires at this timer time
    Due(f64),
}

/// Everything a display frame needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualFrame {
    pub waveform: WaveformTrace,
    pub bars: Vec<Bar>,
    pub peak: PeakMarker,
}

/// The tone generator engine
pub struct Engine {
    config: EngineConfig,
    settings: PlaybackSettings,
    graph: SignalGraph,
    tone: ToneSource,
    noise: NoiseSource,
    sweep: SweepController,
    sweep_params: SweepParams,
    /// Exact frequency being produced, unquantized while sweeping
    display_frequency: f64,
    test: Option<Box<dyn TestSequencer>>,
    last_report: Option<TestReport>,
    polarity: Option<ProducerId>,
    rng: NoiseRng,
    selected_ear: Channel,
    tinnitus_playing: bool,
    tinnitus_frequency: f64,
    cutoff: Option<Cutoff>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.sanitized();
        let rng = match config.noise_seed {
            Some(seed) => NoiseRng::seed_from_u64(seed),
            None => NoiseRng::from_host_entropy(),
        };
        let settings = config.initial.clone();
        tracing::info!(sample_rate = config.sample_rate, "engine created");

        Self {
            graph: SignalGraph::new(&config),
            display_frequency: settings.frequency,
            sweep_params: config.sweep,
            settings,
            tone: ToneSource::new(),
            noise: NoiseSource::new(),
            sweep: SweepController::new(),
            test: None,
            last_report: None,
            polarity: None,
            rng,
            selected_ear: Channel::Both,
            tinnitus_playing: false,
            tinnitus_frequency: 4_000.0,
            cutoff: None,
            config,
        }
    }

    pub fn with_sample_rate(sample_rate: f64) -> Self {
        Self::new(EngineConfig::with_sample_rate(sample_rate))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    pub fn graph(&self) -> &SignalGraph {
        &self.graph
    }

    // =========================================================================
    // Arbitration
    // =========================================================================

    /// Clear the graph input for a new producer of `kind`.
    ///
    /// Builds the graph if needed, asks a suspended host to resume, cancels
    /// whatever the new producer displaces and detaches every producer.
    fn attach_producer(&mut self, kind: ProducerKind, claimant: Claimant) {
        self.graph.initialize(self.settings.volume, self.settings.channel);
        self.graph.request_resume();

        if claimant == Claimant::User {
            self.finish_test(true);
        }
        // A user tone restart keeps the sweep; anything else ends it
        if self.sweep.is_sweeping() && (kind != ProducerKind::Tone || claimant == Claimant::Test)
        {
            self.end_sweep();
        }

        self.stop_producers();
        self.tinnitus_playing = false;
        self.cutoff = None;
        tracing::debug!(?kind, ?claimant, "graph input cleared");
    }

    fn stop_producers(&mut self) {
        self.tone.stop(&mut self.graph);
        self.noise.stop(&mut self.graph);
        if let Some(id) = self.polarity.take() {
            self.graph.detach(id);
        }
    }

    /// Number of producers on the graph input, always 0 or 1
    pub fn producer_count(&self) -> usize {
        self.graph.producer_count()
    }

    pub fn status(&self) -> EngineStatus {
        if self.sweep.is_sweeping() {
            EngineStatus::Sweeping
        } else if self.graph.producer_count() > 0 {
            EngineStatus::Playing
        } else {
            EngineStatus::Ready
        }
    }

    // =========================================================================
    // Playback settings
    // =========================================================================

    /// Set the target frequency, retargeting a running tone
    pub fn set_frequency(&mut self, frequency: f64) -> f64 {
        let frequency = self.settings.set_frequency(frequency);
        self.display_frequency = frequency;
        self.tone.retarget(&mut self.graph, frequency);
        frequency
    }

    /// Adjust the frequency by `delta` Hz
    pub fn nudge_frequency(&mut self, delta: f64) -> f64 {
        self.set_frequency(self.settings.frequency + delta)
    }

    pub fn frequency(&self) -> f64 {
        self.settings.frequency
    }

    /// Frequency actually sounding, exact while a sweep runs
    pub fn display_frequency(&self) -> f64 {
        self.display_frequency
    }

    /// Note name of the display frequency
    pub fn note_name(&self) -> String {
        pitch::describe(self.display_frequency)
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.settings.waveform = waveform;
        self.tone.set_waveform(&mut self.graph, waveform);
    }

    pub fn set_volume(&mut self, volume: f64) -> f64 {
        let volume = self.settings.set_volume(volume);
        self.graph.set_master_volume(volume);
        volume
    }

    pub fn set_channel(&mut self, channel: Channel) {
        self.settings.channel = channel;
        self.graph.set_channel_gains(channel);
    }

    pub fn set_duration(&mut self, duration: PlaybackDuration) {
        self.settings.duration = duration;
    }

    // =========================================================================
    // Tone
    // =========================================================================

    /// Start the tone from the current settings.
    ///
    /// A finite duration is counted from the next `tick`, so the tone can
    /// outlast it by up to one timer interval. Use [`Engine::play_at`] when
    /// the timer time is known.
    pub fn play(&mut self) {
        self.start_tone();
        self.cutoff = self.settings.duration.as_millis().map(Cutoff::Pending);
    }

    /// Start the tone at timer time `now_ms`, counting a finite duration from it
    pub fn play_at(&mut self, now_ms: f64) {
        self.start_tone();
        self.cutoff = self
            .settings
            .duration
            .as_millis()
            .map(|delay_ms| Cutoff::Due(now_ms + delay_ms));
    }

    fn start_tone(&mut self) {
        self.attach_producer(ProducerKind::Tone, Claimant::User);
        self.tone
            .start(&mut self.graph, self.settings.waveform, self.settings.frequency);
        self.display_frequency = self.settings.frequency;
        self.graph.set_channel_gains(self.settings.channel);
    }

    /// Stop the tone; a running sweep is cancelled with it
    pub fn stop(&mut self) {
        self.end_sweep();
        self.tone.stop(&mut self.graph);
        self.tinnitus_playing = false;
        self.cutoff = None;
    }

    /// Play when idle, stop when playing
    pub fn toggle(&mut self) -> bool {
        if self.is_playing() {
            self.stop();
            false
        } else {
            self.play();
            true
        }
    }

    /// Whether the tone is sounding
    pub fn is_playing(&self) -> bool {
        self.tone.is_running(&self.graph)
    }

    /// Silence everything: tests, sweep, noise and tone
    pub fn stop_all(&mut self) {
        self.finish_test(true);
        self.end_sweep();
        self.stop_producers();
        self.tinnitus_playing = false;
        self.cutoff = None;
    }

    // =========================================================================
    // Noise
    // =========================================================================

    pub fn play_noise(&mut self, color: NoiseColor) {
        self.attach_producer(ProducerKind::Noise, Claimant::User);
        self.noise.start(
            &mut self.graph,
            color,
            self.config.noise_buffer_seconds,
            &mut self.rng,
        );
        self.graph.set_channel_gains(self.settings.channel);
    }

    pub fn stop_noise(&mut self) -> bool {
        self.noise.stop(&mut self.graph)
    }

    /// Stop when `color` is playing, otherwise play it
    pub fn toggle_noise(&mut self, color: NoiseColor) -> bool {
        if self.noise.current(&self.graph) == Some(color) {
            self.stop_noise();
            false
        } else {
            self.play_noise(color);
            true
        }
    }

    pub fn noise_color(&self) -> Option<NoiseColor> {
        self.noise.current(&self.graph)
    }

    // =========================================================================
    // Sweep
    // =========================================================================

    pub fn sweep_params(&self) -> &SweepParams {
        &self.sweep_params
    }

    /// Store the parameters `toggle_sweep` will use
    pub fn set_sweep_params(&mut self, params: SweepParams) {
        self.sweep_params = params.sanitized(&self.config.sweep);
    }

    /// Start a sweep at the current audio time
    pub fn start_sweep(&mut self, params: SweepParams) {
        let params = params.sanitized(&self.config.sweep);
        self.sweep_params = params;

        if self.tone.is_running(&self.graph) {
            self.finish_test(true);
            self.tone.retarget(&mut self.graph, params.start_freq);
        } else {
            self.attach_producer(ProducerKind::Tone, Claimant::User);
            self.tone
                .start(&mut self.graph, self.settings.waveform, params.start_freq);
            self.graph.set_channel_gains(self.settings.channel);
        }

        let start = self.sweep.start(params, self.graph.current_time());
        self.settings.frequency = clamp_and_quantize(start);
        self.display_frequency = start;
    }

    /// Start from the stored parameters when idle, cancel when sweeping
    pub fn toggle_sweep(&mut self) -> bool {
        if self.sweep.is_sweeping() {
            self.cancel_sweep();
            false
        } else {
            self.start_sweep(self.sweep_params);
            true
        }
    }

    /// Move the sweep to audio time `now` (seconds)
    pub fn advance_sweep(&mut self, now: f64) -> Option<SweepStep> {
        let step = self.sweep.advance(now)?;
        self.settings.frequency = clamp_and_quantize(step.frequency);
        self.display_frequency = step.frequency;
        self.tone.retarget(&mut self.graph, step.frequency);

        if step.completed {
            self.sweep.settle();
            self.tone.stop(&mut self.graph);
            self.cutoff = None;
        }
        Some(step)
    }

    /// Frame clock callback: advance the sweep to the graph's audio time
    pub fn on_frame(&mut self) -> Option<SweepStep> {
        let now = self.graph.current_time();
        self.advance_sweep(now)
    }

    /// Cancel a running sweep and stop its tone
    pub fn cancel_sweep(&mut self) -> bool {
        if !self.end_sweep() {
            return false;
        }
        self.tone.stop(&mut self.graph);
        self.cutoff = None;
        true
    }

    /// Cancel a running sweep and return the controller to idle
    fn end_sweep(&mut self) -> bool {
        let cancelled = self.sweep.cancel();
        self.sweep.settle();
        cancelled
    }

    pub fn sweep_phase(&self) -> SweepPhase {
        self.sweep.phase()
    }

    /// Sweep progress in [0, 1]
    pub fn sweep_progress(&self) -> f64 {
        self.sweep.progress()
    }

    // =========================================================================
    // Timer clock
    // =========================================================================

    /// Timer clock callback at `now_ms`.
    ///
    /// Fires a due playback cutoff and steps the running test. Returns the
    /// test's report when it finished during this tick.
    pub fn tick(&mut self, now_ms: f64) -> Option<TestReport> {
        self.run_cutoff(now_ms);

        let events = match self.test.as_mut() {
            Some(test) => test.tick(now_ms),
            None => return None,
        };

        let mut finished = None;
        for event in events {
            if let Some(report) = self.apply_event(event) {
                finished = Some(report);
            }
        }
        finished
    }

    fn run_cutoff(&mut self, now_ms: f64) {
        match self.cutoff {
            Some(Cutoff::Pending(delay_ms)) => {
                self.cutoff = Some(Cutoff::Due(now_ms + delay_ms));
            }
            Some(Cutoff::Due(at)) if now_ms >= at => {
                self.cutoff = None;
                if self.is_playing() && !self.sweep.is_sweeping() {
                    tracing::debug!("timed playback finished");
                    self.stop();
                }
            }
            _ => {}
        }
    }

    // =========================================================================
    // Tests
    // =========================================================================

    fn start_test(&mut self, mut test: Box<dyn TestSequencer>, now_ms: f64) {
        self.finish_test(true);
        self.end_sweep();
        self.stop_producers();
        self.tinnitus_playing = false;
        self.cutoff = None;

        tracing::info!(test = test.name(), "test started");
        let first = test.start(now_ms);
        self.test = Some(test);
        self.apply_event(first);
    }

    /// Carry out one sequence event; returns the report on exhaustion
    fn apply_event(&mut self, event: SequenceEvent) -> Option<TestReport> {
        match event {
            SequenceEvent::Apply { index, action } => {
                tracing::debug!(index, ?action, "test step");
                self.apply_action(action);
                None
            }
            SequenceEvent::Exhausted => {
                self.stop_producers();
                self.finish_test(false)
            }
        }
    }

    fn apply_action(&mut self, action: SequenceAction) {
        match action {
            SequenceAction::PlayTone {
                frequency,
                waveform,
            } => {
                // Test tones leave the user's frequency setting alone
                let frequency = clamp_and_quantize(frequency);
                self.display_frequency = frequency;
                match waveform {
                    None if self.tone.is_running(&self.graph) => {
                        self.tone.retarget(&mut self.graph, frequency);
                    }
                    shape => {
                        let shape = shape.unwrap_or(self.settings.waveform);
                        self.attach_producer(ProducerKind::Tone, Claimant::Test);
                        self.tone.start(&mut self.graph, shape, frequency);
                    }
                }
            }
            SequenceAction::Silence => {
                self.tone.stop(&mut self.graph);
            }
            SequenceAction::PlayPolarityPair { in_phase } => {
                self.attach_producer(ProducerKind::PolarityPair, Claimant::Test);
                let pair =
                    PolarityPair::new(in_phase, self.settings.volume, self.graph.sample_rate());
                self.polarity = Some(self.graph.attach(Producer::PolarityPair(pair)));
            }
        }
    }

    /// Drop the running test, keeping its report
    fn finish_test(&mut self, cancel: bool) -> Option<TestReport> {
        let mut test = self.test.take()?;
        if cancel {
            test.cancel();
        }
        let report = test.report();
        tracing::info!(test = test.name(), cancelled = cancel, ?report, "test finished");
        self.last_report = Some(report.clone());
        Some(report)
    }

    /// Start the rising-frequency hearing test
    pub fn start_hearing_test(&mut self, now_ms: f64) {
        self.start_test(Box::new(HearingThresholdTest::new()), now_ms);
    }

    /// Stop the running test and its sound, returning its report
    pub fn stop_test(&mut self) -> Option<TestReport> {
        let report = self.finish_test(true)?;
        self.stop_producers();
        Some(report)
    }

    /// Play `base`, an octave up, then an octave down
    pub fn check_tinnitus_octave(&mut self, base: f64, now_ms: f64) {
        self.start_test(Box::new(TinnitusOctaveCheck::new(base)), now_ms);
    }

    /// Play the 75 Hz pair for the polarity window
    pub fn play_polarity_test(&mut self, in_phase: bool, now_ms: f64) {
        self.start_test(Box::new(PolarityComparator::new(in_phase)), now_ms);
    }

    pub fn is_test_running(&self) -> bool {
        self.test.as_ref().is_some_and(|t| t.is_running())
    }

    /// Report of the running test, or of the last one to finish
    pub fn test_report(&self) -> Option<TestReport> {
        match &self.test {
            Some(test) => Some(test.report()),
            None => self.last_report.clone(),
        }
    }

    /// Best hearing result so far
    pub fn hearing_result(&self) -> Option<HearingResult> {
        match self.test_report()? {
            TestReport::Hearing(result) => Some(result),
            _ => None,
        }
    }

    // =========================================================================
    // Tinnitus matcher
    // =========================================================================

    /// Play or stop a steady tone at `frequency`; true when now playing
    pub fn toggle_tinnitus_tone(&mut self, frequency: f64) -> bool {
        if self.tinnitus_playing && self.is_playing() {
            self.stop();
            return false;
        }
        self.tinnitus_frequency = frequency;
        self.set_frequency(frequency);
        self.play();
        self.tinnitus_playing = true;
        true
    }

    /// Retune the matcher, live when its tone is playing
    pub fn set_tinnitus_frequency(&mut self, frequency: f64) {
        self.tinnitus_frequency = frequency;
        if self.tinnitus_playing && self.is_playing() {
            self.set_frequency(frequency);
        }
    }

    pub fn tinnitus_frequency(&self) -> f64 {
        self.tinnitus_frequency
    }

    // =========================================================================
    // Presets
    // =========================================================================

    /// Apply a single-shot preset
    pub fn apply_preset(&mut self, preset: Preset) {
        tracing::debug!(?preset, "preset applied");
        match preset {
            Preset::Stereo(channel) => {
                self.set_channel(channel);
                if !self.is_playing() {
                    self.set_frequency(STEREO_TEST_HZ);
                    self.play();
                }
            }
            Preset::Audiometric(frequency) => {
                self.set_channel(self.selected_ear);
                self.set_frequency(frequency);
                if !self.is_playing() {
                    self.play();
                }
            }
            Preset::Bass(frequency) | Preset::Frequency(frequency) => {
                self.set_frequency(frequency);
                if !self.is_playing() {
                    self.play();
                }
            }
        }
    }

    pub fn play_stereo_test(&mut self, channel: Channel) {
        self.apply_preset(Preset::Stereo(channel));
    }

    pub fn play_bass_test(&mut self, frequency: f64) {
        self.apply_preset(Preset::Bass(frequency));
    }

    pub fn play_audiometric(&mut self, frequency: f64) {
        self.apply_preset(Preset::Audiometric(frequency));
    }

    pub fn play_preset_frequency(&mut self, frequency: f64) {
        self.apply_preset(Preset::Frequency(frequency));
    }

    /// Choose the ear for audiometric tones, rerouting a playing tone
    pub fn set_selected_ear(&mut self, ear: Channel) {
        self.selected_ear = ear;
        if self.is_playing() {
            self.set_channel(ear);
        }
    }

    pub fn selected_ear(&self) -> Channel {
        self.selected_ear
    }

    // =========================================================================
    // Host audio
    // =========================================================================

    /// Fill planar stereo output
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.graph.render(left, right);
    }

    /// Fill interleaved stereo output
    pub fn render_interleaved(&mut self, output: &mut [f32]) {
        self.graph.render_interleaved(output);
    }

    /// Audio clock in seconds
    pub fn current_time(&self) -> f64 {
        self.graph.current_time()
    }

    pub fn suspend(&mut self) {
        self.graph.suspend();
    }

    pub fn resume(&mut self) {
        self.graph.resume();
    }

    pub fn host_state(&self) -> HostState {
        self.graph.host_state()
    }

    /// Whether the host should resume audio
    pub fn resume_requested(&self) -> bool {
        self.graph.resume_requested()
    }

    // =========================================================================
    // Visualization
    // =========================================================================

    pub fn waveform(&self, viewport: Viewport) -> Option<WaveformTrace> {
        let data = self.graph.byte_time_domain_data()?;
        Some(visual::waveform_trace(
            &data,
            self.graph.sample_rate(),
            self.settings.frequency,
            viewport,
        ))
    }

    pub fn spectrum(&mut self, viewport: Viewport) -> Option<Vec<Bar>> {
        let data = self.graph.byte_frequency_data()?;
        Some(visual::spectrum_bars(&data, viewport))
    }

    pub fn peak_marker(&self, viewport: Viewport) -> PeakMarker {
        visual::peak_marker(self.settings.frequency, self.graph.sample_rate(), viewport)
    }

    /// Waveform, bars and marker for one display frame
    pub fn visual_frame(&mut self, viewport: Viewport) -> Option<VisualFrame> {
        Some(VisualFrame {
            waveform: self.waveform(viewport)?,
            bars: self.spectrum(viewport)?,
            peak: self.peak_marker(viewport),
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::{HearingBand, HEARING_STEP_MS, POLARITY_WINDOW_MS, TINNITUS_STEP_MS};
    use crate::sweep::SweepCurve;
    use approx::assert_relative_eq;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            noise_seed: Some(7),
            ..Default::default()
        })
    }

    fn render_frames(engine: &mut Engine, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0f32; frames];
        let mut right = vec![0.0f32; frames];
        engine.render(&mut left, &mut right);
        (left, right)
    }

    #[test]
    fn test_play_and_stop() {
        let mut engine = engine();
        assert_eq!(engine.status(), EngineStatus::Ready);
        engine.play();
        assert!(engine.is_playing());
        assert_eq!(engine.status(), EngineStatus::Playing);
        assert_eq!(engine.producer_count(), 1);

        let (left, _) = render_frames(&mut engine, 512);
        assert!(left.iter().any(|&s| s.abs() > 0.1));

        engine.stop();
        assert!(!engine.is_playing());
        assert_eq!(engine.producer_count(), 0);
        engine.stop();
    }

    #[test]
    fn test_toggle() {
        let mut engine = engine();
        assert!(engine.toggle());
        assert!(!engine.toggle());
        assert_eq!(engine.status(), EngineStatus::Ready);
    }

    #[test]
    fn test_noise_replaces_tone() {
        let mut engine = engine();
        engine.play();
        engine.play_noise(NoiseColor::Pink);
        assert!(!engine.is_playing());
        assert_eq!(engine.noise_color(), Some(NoiseColor::Pink));
        assert_eq!(engine.producer_count(), 1);

        engine.play();
        assert_eq!(engine.noise_color(), None);
        assert_eq!(engine.producer_count(), 1);
    }

    #[test]
    fn test_toggle_noise() {
        let mut engine = engine();
        assert!(engine.toggle_noise(NoiseColor::White));
        assert!(engine.toggle_noise(NoiseColor::Brown));
        assert_eq!(engine.noise_color(), Some(NoiseColor::Brown));
        assert!(!engine.toggle_noise(NoiseColor::Brown));
        assert_eq!(engine.producer_count(), 0);
    }

    #[test]
    fn test_frequency_is_clamped_and_retargets() {
        let mut engine = engine();
        engine.play();
        assert_eq!(engine.set_frequency(30_000.0), 22_000.0);
        assert_eq!(engine.nudge_frequency(-0.1), 21_999.9);
        assert_eq!(engine.tone.frequency(&engine.graph), Some(21_999.9));
        assert_eq!(engine.note_name(), pitch::describe(21_999.9));
    }

    #[test]
    fn test_channel_routing_reaches_output() {
        let mut engine = engine();
        engine.set_channel(Channel::Left);
        engine.play();
        let (left, right) = render_frames(&mut engine, 1024);
        assert!(left.iter().any(|&s| s.abs() > 0.1));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sweep_runs_and_completes() {
        let mut engine = engine();
        engine.start_sweep(SweepParams::new(100.0, 1100.0, 10.0, SweepCurve::Linear));
        assert!(engine.is_playing());
        assert_eq!(engine.status(), EngineStatus::Sweeping);

        let step = engine.advance_sweep(5.0).unwrap();
        assert_eq!(step.frequency, 600.0);
        assert_eq!(engine.frequency(), 600.0);
        assert_eq!(engine.tone.frequency(&engine.graph), Some(600.0));

        let step = engine.advance_sweep(10.0).unwrap();
        assert!(step.completed);
        assert_eq!(step.progress, 1.0);
        assert!(!engine.is_playing());
        assert_eq!(engine.sweep_phase(), SweepPhase::Idle);
        assert_eq!(engine.status(), EngineStatus::Ready);
    }

    #[test]
    fn test_sweep_returns_to_idle() {
        let mut engine = Engine::with_sample_rate(8_000.0);
        engine.start_sweep(SweepParams::new(100.0, 200.0, 0.1, SweepCurve::Linear));
        let mut completed = false;
        for _ in 0..100 {
            render_frames(&mut engine, 80);
            if let Some(step) = engine.on_frame() {
                completed |= step.completed;
            }
            engine.tick(0.0);
        }
        assert!(completed);
        assert_eq!(engine.sweep_phase(), SweepPhase::Idle);
        assert_eq!(engine.sweep_progress(), 0.0);
        assert_eq!(engine.on_frame(), None);

        engine.start_sweep(SweepParams::default());
        engine.advance_sweep(engine.current_time() + 1.0);
        assert!(engine.sweep_progress() > 0.0);
        assert!(engine.cancel_sweep());
        assert_eq!(engine.sweep_phase(), SweepPhase::Idle);
        assert_eq!(engine.sweep_progress(), 0.0);

        engine.start_sweep(SweepParams::default());
        engine.stop();
        assert_eq!(engine.sweep_phase(), SweepPhase::Idle);
        engine.start_sweep(SweepParams::default());
        engine.start_hearing_test(0.0);
        assert_eq!(engine.sweep_phase(), SweepPhase::Idle);
    }

    #[test]
    fn test_suspended_sweep_does_not_pile_up_changes() {
        let mut engine = engine();
        engine.start_sweep(SweepParams::new(100.0, 1_100.0, 10.0, SweepCurve::Linear));
        engine.suspend();
        for i in 0..600 {
            engine.advance_sweep(i as f64 / 60.0);
            engine.set_volume(0.4);
        }
        // One retarget and one volume change, whatever the frame count
        assert_eq!(engine.graph().deferred_count(), 2);

        engine.resume();
        assert_eq!(engine.graph().deferred_count(), 0);
        assert_eq!(
            engine.tone.frequency(&engine.graph),
            Some(clamp_and_quantize(100.0 + 1_000.0 * (599.0 / 60.0) / 10.0))
        );
    }

    #[test]
    fn test_log_sweep_midpoint_through_engine() {
        let mut engine = engine();
        engine.start_sweep(SweepParams::default());
        let step = engine.advance_sweep(5.0).unwrap();
        assert_relative_eq!(step.frequency, 632.455_532, epsilon = 1e-5);
        assert_relative_eq!(engine.display_frequency(), step.frequency);
        assert_eq!(engine.frequency(), 632.5);
        assert_eq!(engine.note_name(), pitch::describe(step.frequency));
    }

    #[test]
    fn test_sweep_follows_audio_clock() {
        let mut engine = Engine::with_sample_rate(8_000.0);
        engine.start_sweep(SweepParams::new(100.0, 200.0, 1.0, SweepCurve::Linear));
        render_frames(&mut engine, 4_000);
        let step = engine.on_frame().unwrap();
        assert_relative_eq!(step.progress, 0.5, epsilon = 1e-12);
        assert_relative_eq!(step.frequency, 150.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cancel_sweep_resets_progress() {
        let mut engine = engine();
        engine.start_sweep(SweepParams::default());
        engine.advance_sweep(2.0);
        assert!(engine.sweep_progress() > 0.0);
        assert!(engine.cancel_sweep());
        assert_eq!(engine.sweep_progress(), 0.0);
        assert!(!engine.is_playing());
        assert!(!engine.cancel_sweep());
    }

    #[test]
    fn test_toggle_sweep_uses_stored_params() {
        let mut engine = engine();
        engine.set_sweep_params(SweepParams::new(0.0, 500.0, -1.0, SweepCurve::Linear));
        assert_eq!(engine.sweep_params().start_freq, 20.0);
        assert_eq!(engine.sweep_params().duration_secs, 10.0);

        assert!(engine.toggle_sweep());
        assert_eq!(engine.frequency(), 20.0);
        assert!(!engine.toggle_sweep());
        assert_eq!(engine.sweep_phase(), SweepPhase::Idle);
    }

    #[test]
    fn test_noise_cancels_sweep() {
        let mut engine = engine();
        engine.start_sweep(SweepParams::default());
        engine.play_noise(NoiseColor::White);
        assert_eq!(engine.sweep_phase(), SweepPhase::Idle);
        assert_eq!(engine.producer_count(), 1);
        assert_eq!(engine.advance_sweep(3.0), None);
    }

    #[test]
    fn test_user_stop_cancels_sweep() {
        let mut engine = engine();
        engine.start_sweep(SweepParams::default());
        engine.stop();
        assert!(!engine.sweep.is_sweeping());
        assert_eq!(engine.status(), EngineStatus::Ready);
    }

    #[test]
    fn test_timed_playback_cutoff() {
        let mut engine = engine();
        engine.set_duration(PlaybackDuration::Seconds(1.0));
        engine.play();
        engine.tick(100.0);
        engine.tick(1_099.0);
        assert!(engine.is_playing());
        engine.tick(1_100.0);
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_play_at_counts_from_start() {
        let mut engine = engine();
        engine.set_duration(PlaybackDuration::Seconds(1.0));
        engine.play_at(100.0);
        engine.tick(1_099.0);
        assert!(engine.is_playing());
        engine.tick(1_100.0);
        assert!(!engine.is_playing());

        engine.set_duration(PlaybackDuration::Continuous);
        engine.play_at(0.0);
        engine.tick(1.0e9);
        assert!(engine.is_playing());
    }

    #[test]
    fn test_cutoff_skipped_while_sweeping() {
        let mut engine = engine();
        engine.set_duration(PlaybackDuration::Seconds(1.0));
        engine.play();
        engine.tick(0.0);
        engine.start_sweep(SweepParams::default());
        engine.tick(5_000.0);
        assert!(engine.is_playing());
    }

    #[test]
    fn test_hearing_test_through_engine() {
        let mut engine = engine();
        engine.play_noise(NoiseColor::Pink);
        engine.start_hearing_test(0.0);

        assert_eq!(engine.noise_color(), None);
        assert!(engine.is_playing());
        assert_eq!(engine.tone.frequency(&engine.graph), Some(8_000.0));
        assert!(engine.is_test_running());

        for step in 1..=4 {
            assert!(engine.tick(step as f64 * HEARING_STEP_MS).is_none());
            assert_eq!(engine.producer_count(), 1);
        }
        assert_eq!(engine.tone.frequency(&engine.graph), Some(12_000.0));
        assert_eq!(engine.display_frequency(), 12_000.0);

        let report = engine.stop_test().unwrap();
        assert!(!engine.is_playing());
        match report {
            TestReport::Hearing(result) => {
                assert_eq!(result.highest_heard, 11_000.0);
                assert_eq!(result.band, HearingBand::SomeLoss);
            }
            other => panic!("Expected hearing report, got {:?}", other),
        }
        assert_eq!(engine.hearing_result().unwrap().highest_heard, 11_000.0);
    }

    #[test]
    fn test_hearing_test_completes() {
        let mut engine = engine();
        engine.start_hearing_test(0.0);
        let report = engine.tick(1.0e9).unwrap();
        assert!(!engine.is_playing());
        assert!(!engine.is_test_running());
        match report {
            TestReport::Hearing(result) => {
                assert!(result.completed);
                assert_eq!(result.highest_heard, 20_000.0);
            }
            other => panic!("Expected hearing report, got {:?}", other),
        }
    }

    #[test]
    fn test_user_play_cancels_test() {
        let mut engine = engine();
        engine.set_frequency(1_000.0);
        engine.start_hearing_test(0.0);
        engine.tick(HEARING_STEP_MS);
        engine.play();
        assert!(!engine.is_test_running());
        assert_eq!(engine.hearing_result().unwrap().highest_heard, 8_000.0);
        // The old sequence no longer drives the tone
        engine.tick(10.0 * HEARING_STEP_MS);
        assert_eq!(engine.producer_count(), 1);
        assert_eq!(engine.tone.frequency(&engine.graph), Some(1_000.0));
    }

    #[test]
    fn test_tests_keep_user_frequency() {
        let mut engine = engine();
        engine.set_frequency(1_000.0);
        engine.start_hearing_test(0.0);
        engine.tick(HEARING_STEP_MS);
        engine.tick(2.0 * HEARING_STEP_MS);
        assert_eq!(engine.display_frequency(), 10_000.0);
        engine.stop_test();
        assert_eq!(engine.frequency(), 1_000.0);

        engine.check_tinnitus_octave(4_000.0, 0.0);
        engine.tick(TINNITUS_STEP_MS);
        assert_eq!(engine.frequency(), 1_000.0);
        engine.stop_test();
        engine.play();
        assert_eq!(engine.tone.frequency(&engine.graph), Some(1_000.0));
    }

    #[test]
    fn test_tinnitus_octave_check() {
        let mut engine = engine();
        engine.check_tinnitus_octave(4_000.0, 0.0);
        assert_eq!(engine.tone.frequency(&engine.graph), Some(4_000.0));
        engine.tick(TINNITUS_STEP_MS);
        assert_eq!(engine.tone.frequency(&engine.graph), Some(8_000.0));
        engine.tick(2.0 * TINNITUS_STEP_MS);
        assert_eq!(engine.tone.frequency(&engine.graph), Some(2_000.0));
        assert!(engine.is_playing());
        assert!(engine.tick(3.0 * TINNITUS_STEP_MS).is_some());
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_tinnitus_skipped_step_is_silent() {
        let mut engine = engine();
        engine.check_tinnitus_octave(12_000.0, 0.0);
        engine.tick(TINNITUS_STEP_MS);
        assert!(!engine.is_playing());
        engine.tick(2.0 * TINNITUS_STEP_MS);
        assert!(engine.is_playing());
        assert_eq!(engine.tone.frequency(&engine.graph), Some(6_000.0));
    }

    #[test]
    fn test_polarity_pair_is_private_and_timed() {
        let mut engine = engine();
        engine.set_frequency(1_000.0);
        engine.play();
        engine.play_polarity_test(false, 0.0);

        assert!(!engine.is_playing());
        assert_eq!(engine.producer_count(), 1);
        assert_eq!(engine.graph.active_kind(), Some(ProducerKind::PolarityPair));
        assert_eq!(engine.frequency(), 1_000.0);

        let (left, right) = render_frames(&mut engine, 256);
        for (l, r) in left.iter().zip(right.iter()) {
            assert_eq!(*l, -*r);
        }

        let report = engine.tick(POLARITY_WINDOW_MS).unwrap();
        assert_eq!(engine.producer_count(), 0);
        assert!(matches!(
            report,
            TestReport::Polarity(ref r) if !r.in_phase && r.completed
        ));
    }

    #[test]
    fn test_stereo_preset() {
        let mut engine = engine();
        engine.set_frequency(1_000.0);
        engine.play_stereo_test(Channel::Right);
        assert!(engine.is_playing());
        assert_eq!(engine.frequency(), 440.0);
        assert_eq!(engine.settings().channel, Channel::Right);

        // Already playing: only the routing changes
        engine.set_frequency(500.0);
        engine.play_stereo_test(Channel::Left);
        assert_eq!(engine.frequency(), 500.0);
        assert_eq!(engine.settings().channel, Channel::Left);
    }

    #[test]
    fn test_audiometric_uses_selected_ear() {
        let mut engine = engine();
        engine.set_selected_ear(Channel::Left);
        engine.play_audiometric(2_000.0);
        assert_eq!(engine.settings().channel, Channel::Left);
        assert_eq!(engine.frequency(), 2_000.0);
        assert!(engine.is_playing());

        engine.set_selected_ear(Channel::Right);
        assert_eq!(engine.settings().channel, Channel::Right);
    }

    #[test]
    fn test_bass_and_preset_frequency() {
        let mut engine = engine();
        engine.play_bass_test(40.0);
        assert!(engine.is_playing());
        engine.play_preset_frequency(1_000.0);
        assert_eq!(engine.frequency(), 1_000.0);
        assert_eq!(engine.producer_count(), 1);
    }

    #[test]
    fn test_tinnitus_tone_toggle() {
        let mut engine = engine();
        assert!(engine.toggle_tinnitus_tone(6_000.0));
        assert_eq!(engine.frequency(), 6_000.0);
        engine.set_tinnitus_frequency(6_500.0);
        assert_eq!(engine.frequency(), 6_500.0);
        assert!(!engine.toggle_tinnitus_tone(6_500.0));
        assert!(!engine.is_playing());

        // Not playing: the slider only moves the stored value
        engine.set_tinnitus_frequency(3_000.0);
        assert_eq!(engine.frequency(), 6_500.0);
        assert_eq!(engine.tinnitus_frequency(), 3_000.0);
    }

    #[test]
    fn test_suspended_host_defers_changes() {
        let mut engine = engine();
        engine.play();
        engine.suspend();
        engine.set_volume(0.1);
        assert!(engine.resume_requested());
        assert_eq!(engine.graph.gain_targets().unwrap().0, 0.5);

        engine.resume();
        assert_eq!(engine.host_state(), HostState::Running);
        assert_eq!(engine.graph.gain_targets().unwrap().0, 0.1);
    }

    #[test]
    fn test_visual_frame() {
        let mut engine = engine();
        let view = Viewport::new(640.0, 100.0);
        assert!(engine.visual_frame(view).is_none());

        engine.set_frequency(441.0);
        engine.play();
        render_frames(&mut engine, 4_096);
        let frame = engine.visual_frame(view).unwrap();
        assert_eq!(frame.bars.len(), visual::BAR_COUNT);
        assert_eq!(frame.waveform.samples_per_cycle, 100);
        assert_eq!(frame.peak.label, "441 Hz");
    }

    #[test]
    fn test_stop_all() {
        let mut engine = engine();
        engine.start_hearing_test(0.0);
        engine.stop_all();
        assert_eq!(engine.producer_count(), 0);
        assert!(!engine.is_test_running());
        assert_eq!(engine.status(), EngineStatus::Ready);
    }
}
