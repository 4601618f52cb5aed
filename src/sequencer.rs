//! Test Sequencers
//!
//! Timed tests are explicit step lists advanced by a poll-based driver. A
//! [`StepSequence`] applies step 0 on `start`, then every `tick(now_ms)`
//! emits the steps whose due time has passed, each scheduled `delay_ms`
//! after the previous step was due. After the last step's delay the
//! sequence reports [`SequenceEvent::Exhausted`] and stops.
//!
//! Cancellation is cooperative: `cancel` clears the running flag so the
//! next step is never emitted, while whatever the current step started
//! keeps sounding until the owner stops it.
//!
//! Three tests are built on it:
//!
//! - [`HearingThresholdTest`]: rising sine steps from 8 kHz to 20 kHz
//! - [`TinnitusOctaveCheck`]: base, one octave up, one octave down
//! - [`PolarityComparator`]: a private 75 Hz stereo pair, in or out of phase

use crate::settings::Waveform;
use crate::tone::Oscillator;
use core::fmt;
use serde::{Deserialize, Serialize};

/// What a step asks the engine to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SequenceAction {
    /// Play a tone at `frequency`. With a waveform the oscillator is rebuilt
    /// in that shape; without one a running tone is retargeted.
    PlayTone {
        frequency: f64,
        waveform: Option<Waveform>,
    },
    /// No tone for this step
    Silence,
    /// Attach the private polarity pair
    PlayPolarityPair { in_phase: bool },
}

/// One scheduled step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    /// Time from this step to the next (or to exhaustion)
    pub delay_ms: f64,
    pub action: SequenceAction,
}

/// Output of driving a sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SequenceEvent {
    Apply { index: usize, action: SequenceAction },
    Exhausted,
}

/// Ordered step list with a cursor and a running flag
#[derive(Debug, Clone)]
pub struct StepSequence {
    steps: Vec<Step>,
    cursor: usize,
    running: bool,
    next_due: f64,
}

impl StepSequence {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            cursor: 0,
            running: false,
            next_due: 0.0,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of the step currently in effect
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Apply step 0 at `now_ms`
    pub fn start(&mut self, now_ms: f64) -> SequenceEvent {
        self.cursor = 0;
        match self.steps.first() {
            Some(step) => {
                self.running = true;
                self.next_due = now_ms + step.delay_ms;
                SequenceEvent::Apply {
                    index: 0,
                    action: step.action,
                }
            }
            None => {
                self.running = false;
                SequenceEvent::Exhausted
            }
        }
    }

    /// Emit every step that has come due by `now_ms`
    pub fn tick(&mut self, now_ms: f64) -> Vec<SequenceEvent> {
        let mut events = Vec::new();
        while self.running && now_ms >= self.next_due {
            let next = self.cursor + 1;
            match self.steps.get(next) {
                Some(step) => {
                    self.cursor = next;
                    self.next_due += step.delay_ms;
                    events.push(SequenceEvent::Apply {
                        index: next,
                        action: step.action,
                    });
                }
                None => {
                    self.running = false;
                    events.push(SequenceEvent::Exhausted);
                }
            }
        }
        events
    }

    /// Stop scheduling further steps. False when already stopped.
    pub fn cancel(&mut self) -> bool {
        std::mem::replace(&mut self.running, false)
    }
}

/// Result payload of a finished or cancelled test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum TestReport {
    Hearing(HearingResult),
    Tinnitus(TinnitusReport),
    Polarity(PolarityReport),
}

/// Common driver interface of the timed tests
pub trait TestSequencer {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Begin at `now_ms`, returning the first step
    fn start(&mut self, now_ms: f64) -> SequenceEvent;

    /// Advance to `now_ms`
    fn tick(&mut self, now_ms: f64) -> Vec<SequenceEvent>;

    /// Cooperative cancel; the report keeps the best value so far
    fn cancel(&mut self) -> bool;

    fn is_running(&self) -> bool;

    fn report(&self) -> TestReport;
}

// =============================================================================
// Hearing threshold
// =============================================================================

/// First frequency of the hearing test
pub const HEARING_START_HZ: f64 = 8_000.0;

/// Highest frequency the hearing test plays
pub const HEARING_LIMIT_HZ: f64 = 20_000.0;

/// Time each hearing test tone is held
pub const HEARING_STEP_MS: f64 = 2_000.0;

/// Next candidate after `frequency`
pub fn next_hearing_frequency(frequency: f64) -> f64 {
    if frequency < 12_000.0 {
        frequency + 1_000.0
    } else if frequency < 16_000.0 {
        frequency + 500.0
    } else {
        frequency + 250.0
    }
}

/// Every frequency the hearing test plays, in order
pub fn hearing_schedule() -> Vec<f64> {
    let mut frequencies = Vec::new();
    let mut frequency = HEARING_START_HZ;
    while frequency <= HEARING_LIMIT_HZ {
        frequencies.push(frequency);
        frequency = next_hearing_frequency(frequency);
    }
    frequencies
}

/// Qualitative hearing range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HearingBand {
    Excellent,
    Good,
    Average,
    SomeLoss,
    ConsultSpecialist,
}

impl HearingBand {
    pub fn from_frequency(highest_heard: f64) -> Self {
        if highest_heard >= 17_000.0 {
            HearingBand::Excellent
        } else if highest_heard >= 15_000.0 {
            HearingBand::Good
        } else if highest_heard >= 12_000.0 {
            HearingBand::Average
        } else if highest_heard >= 8_000.0 {
            HearingBand::SomeLoss
        } else {
            HearingBand::ConsultSpecialist
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HearingBand::Excellent => "Excellent - Under 25",
            HearingBand::Good => "Good - 25-35 years",
            HearingBand::Average => "Average - 35-50 years",
            HearingBand::SomeLoss => "Some high-frequency loss",
            HearingBand::ConsultSpecialist => "Consider consulting an audiologist",
        }
    }
}

/// Outcome of the hearing test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HearingResult {
    /// Highest frequency held for a full step, 0 if none
    pub highest_heard: f64,
    pub band: HearingBand,
    /// False when the user stopped the test early
    pub completed: bool,
}

impl fmt::Display for HearingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz ({})", self.highest_heard, self.band.label())
    }
}

/// Rising-frequency audibility test
#[derive(Debug, Clone)]
pub struct HearingThresholdTest {
    sequence: StepSequence,
    frequencies: Vec<f64>,
    highest_heard: f64,
    completed: bool,
}

impl HearingThresholdTest {
    pub fn new() -> Self {
        let frequencies = hearing_schedule();
        let steps = frequencies
            .iter()
            .map(|&frequency| Step {
                delay_ms: HEARING_STEP_MS,
                action: SequenceAction::PlayTone {
                    frequency,
                    waveform: Some(Waveform::Sine),
                },
            })
            .collect();
        Self {
            sequence: StepSequence::new(steps),
            frequencies,
            highest_heard: 0.0,
            completed: false,
        }
    }

    /// Frequency of the step currently playing
    pub fn current_frequency(&self) -> Option<f64> {
        if self.sequence.is_running() {
            self.frequencies.get(self.sequence.cursor()).copied()
        } else {
            None
        }
    }

    pub fn result(&self) -> HearingResult {
        HearingResult {
            highest_heard: self.highest_heard,
            band: HearingBand::from_frequency(self.highest_heard),
            completed: self.completed,
        }
    }
}

impl Default for HearingThresholdTest {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSequencer for HearingThresholdTest {
    fn name(&self) -> &'static str {
        "hearing threshold"
    }

    fn start(&mut self, now_ms: f64) -> SequenceEvent {
        self.highest_heard = 0.0;
        self.completed = false;
        self.sequence.start(now_ms)
    }

    fn tick(&mut self, now_ms: f64) -> Vec<SequenceEvent> {
        let events = self.sequence.tick(now_ms);
        for event in &events {
            // Surviving a full step counts the previous tone as heard
            let held = match event {
                SequenceEvent::Apply { index, .. } => index.checked_sub(1),
                SequenceEvent::Exhausted => {
                    self.completed = true;
                    self.frequencies.len().checked_sub(1)
                }
            };
            if let Some(&frequency) = held.and_then(|i| self.frequencies.get(i)) {
                self.highest_heard = frequency;
            }
        }
        events
    }

    fn cancel(&mut self) -> bool {
        self.sequence.cancel()
    }

    fn is_running(&self) -> bool {
        self.sequence.is_running()
    }

    fn report(&self) -> TestReport {
        TestReport::Hearing(self.result())
    }
}

// =============================================================================
// Tinnitus octave check
// =============================================================================

/// Time between octave probe steps
pub const TINNITUS_STEP_MS: f64 = 1_500.0;

/// Range a probe candidate must fall in to be played
pub const TINNITUS_RANGE_HZ: (f64, f64) = (20.0, 20_000.0);

/// Outcome of the octave probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TinnitusReport {
    pub base_frequency: f64,
    /// Base, octave up, octave down
    pub candidates: [f64; 3],
    /// Candidates outside the playable range
    pub skipped: Vec<f64>,
    pub completed: bool,
}

/// Plays the matched frequency and its neighbouring octaves
#[derive(Debug, Clone)]
pub struct TinnitusOctaveCheck {
    sequence: StepSequence,
    base_frequency: f64,
    candidates: [f64; 3],
    completed: bool,
}

impl TinnitusOctaveCheck {
    pub fn new(base_frequency: f64) -> Self {
        let candidates = [base_frequency, base_frequency * 2.0, base_frequency / 2.0];
        let (lo, hi) = TINNITUS_RANGE_HZ;
        let steps = candidates
            .iter()
            .map(|&frequency| Step {
                delay_ms: TINNITUS_STEP_MS,
                action: if (lo..=hi).contains(&frequency) {
                    SequenceAction::PlayTone {
                        frequency,
                        waveform: None,
                    }
                } else {
                    SequenceAction::Silence
                },
            })
            .collect();
        Self {
            sequence: StepSequence::new(steps),
            base_frequency,
            candidates,
            completed: false,
        }
    }

    pub fn candidates(&self) -> [f64; 3] {
        self.candidates
    }
}

impl TestSequencer for TinnitusOctaveCheck {
    fn name(&self) -> &'static str {
        "tinnitus octave check"
    }

    fn start(&mut self, now_ms: f64) -> SequenceEvent {
        self.completed = false;
        self.sequence.start(now_ms)
    }

    fn tick(&mut self, now_ms: f64) -> Vec<SequenceEvent> {
        let events = self.sequence.tick(now_ms);
        if events.contains(&SequenceEvent::Exhausted) {
            self.completed = true;
        }
        events
    }

    fn cancel(&mut self) -> bool {
        self.sequence.cancel()
    }

    fn is_running(&self) -> bool {
        self.sequence.is_running()
    }

    fn report(&self) -> TestReport {
        let (lo, hi) = TINNITUS_RANGE_HZ;
        TestReport::Tinnitus(TinnitusReport {
            base_frequency: self.base_frequency,
            candidates: self.candidates,
            skipped: self
                .candidates
                .iter()
                .copied()
                .filter(|f| !(lo..=hi).contains(f))
                .collect(),
            completed: self.completed,
        })
    }
}

// =============================================================================
// Polarity comparator
// =============================================================================

/// Frequency of the polarity test tones
pub const POLARITY_FREQUENCY_HZ: f64 = 75.0;

/// How long the polarity pair plays
pub const POLARITY_WINDOW_MS: f64 = 3_000.0;

/// Outcome of a polarity comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarityReport {
    pub in_phase: bool,
    pub completed: bool,
}

/// Two private sine oscillators, one per channel, right optionally inverted
#[derive(Debug, Clone)]
pub struct PolarityPair {
    left: Oscillator,
    right: Oscillator,
    /// +1 in phase, -1 inverted
    polarity: f64,
    level: f64,
}

impl PolarityPair {
    pub fn new(in_phase: bool, level: f64, sample_rate: f64) -> Self {
        Self {
            left: Oscillator::new(Waveform::Sine, POLARITY_FREQUENCY_HZ, sample_rate),
            right: Oscillator::new(Waveform::Sine, POLARITY_FREQUENCY_HZ, sample_rate),
            polarity: if in_phase { 1.0 } else { -1.0 },
            level: level.clamp(0.0, 1.0),
        }
    }

    pub fn in_phase(&self) -> bool {
        self.polarity > 0.0
    }

    /// Next (left, right) frame
    #[inline]
    pub fn next_frame(&mut self) -> (f64, f64) {
        let left = self.left.next_sample() * self.level;
        let right = self.right.next_sample() * self.polarity * self.level;
        (left, right)
    }
}

/// Fixed-window in-phase / out-of-phase comparison
#[derive(Debug, Clone)]
pub struct PolarityComparator {
    sequence: StepSequence,
    in_phase: bool,
    completed: bool,
}

impl PolarityComparator {
    pub fn new(in_phase: bool) -> Self {
        Self {
            sequence: StepSequence::new(vec![Step {
                delay_ms: POLARITY_WINDOW_MS,
                action: SequenceAction::PlayPolarityPair { in_phase },
            }]),
            in_phase,
            completed: false,
        }
    }
}

impl TestSequencer for PolarityComparator {
    fn name(&self) -> &'static str {
        "polarity"
    }

    fn start(&mut self, now_ms: f64) -> SequenceEvent {
        self.completed = false;
        self.sequence.start(now_ms)
    }

    fn tick(&mut self, now_ms: f64) -> Vec<SequenceEvent> {
        let events = self.sequence.tick(now_ms);
        if events.contains(&SequenceEvent::Exhausted) {
            self.completed = true;
        }
        events
    }

    fn cancel(&mut self) -> bool {
        self.sequence.cancel()
    }

    fn is_running(&self) -> bool {
        self.sequence.is_running()
    }

    fn report(&self) -> TestReport {
        TestReport::Polarity(PolarityReport {
            in_phase: self.in_phase,
            completed: self.completed,
        })
    }
}
