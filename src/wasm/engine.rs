//! ToneEngine - WASM interface for the tone engine

use super::error::to_js;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::noise::NoiseColor;
use crate::pitch;
use crate::presets::{PresetCategory, PresetLibrary};
use crate::settings::{Channel, PlaybackDuration, Waveform};
use crate::sweep::{SweepCurve, SweepParams};
use crate::visual::Viewport;
use wasm_bindgen::prelude::*;

/// Output is clamped to this level before it reaches the worklet
const SAFETY_LIMIT: f32 = 1.0;

fn to_js_value<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(to_js)
}

/// Main WASM interface for the tone engine
#[wasm_bindgen]
pub struct ToneEngine {
    engine: Engine,
}

#[wasm_bindgen]
impl ToneEngine {
    /// Create an engine at the AudioContext's sample rate
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> Self {
        // Initialize panic hook for better error messages
        console_error_panic_hook::set_once();

        Self {
            engine: Engine::with_sample_rate(sample_rate),
        }
    }

    /// Create an engine from a JSON configuration document
    pub fn from_config(config_json: &str) -> Result<ToneEngine, JsValue> {
        console_error_panic_hook::set_once();
        let config = EngineConfig::from_json(config_json).map_err(to_js)?;
        Ok(Self {
            engine: Engine::new(config),
        })
    }

    /// Get the sample rate
    #[wasm_bindgen(getter)]
    pub fn sample_rate(&self) -> f64 {
        self.engine.config().sample_rate
    }

    // =========================================================================
    // Playback Settings
    // =========================================================================

    /// Current playback settings
    pub fn get_settings(&self) -> Result<JsValue, JsValue> {
        to_js_value(self.engine.settings())
    }

    /// Set the frequency; returns the stored (clamped, quantized) value
    pub fn set_frequency(&mut self, frequency: f64) -> f64 {
        self.engine.set_frequency(frequency)
    }

    /// Arrow-key style adjustment
    pub fn nudge_frequency(&mut self, delta: f64) -> f64 {
        self.engine.nudge_frequency(delta)
    }

    #[wasm_bindgen(getter)]
    pub fn frequency(&self) -> f64 {
        self.engine.frequency()
    }

    /// Frequency actually sounding, exact while sweeping
    #[wasm_bindgen(getter)]
    pub fn display_frequency(&self) -> f64 {
        self.engine.display_frequency()
    }

    pub fn set_waveform(&mut self, waveform: &str) -> Result<(), JsValue> {
        let waveform: Waveform = waveform.parse().map_err(to_js)?;
        self.engine.set_waveform(waveform);
        Ok(())
    }

    pub fn set_volume(&mut self, volume: f64) -> f64 {
        self.engine.set_volume(volume)
    }

    pub fn set_channel(&mut self, channel: &str) -> Result<(), JsValue> {
        let channel: Channel = channel.parse().map_err(to_js)?;
        self.engine.set_channel(channel);
        Ok(())
    }

    /// "continuous" or a number of seconds
    pub fn set_duration(&mut self, duration: &str) -> Result<(), JsValue> {
        let duration: PlaybackDuration = duration.parse().map_err(to_js)?;
        self.engine.set_duration(duration);
        Ok(())
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Start the tone; pass the timer time so a finite duration counts from now
    pub fn play(&mut self, now_ms: Option<f64>) {
        match now_ms {
            Some(now_ms) => self.engine.play_at(now_ms),
            None => self.engine.play(),
        }
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    /// Space bar handler; true when now playing
    pub fn toggle(&mut self) -> bool {
        self.engine.toggle()
    }

    pub fn stop_all(&mut self) {
        self.engine.stop_all();
    }

    #[wasm_bindgen(getter)]
    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    /// "ready", "playing" or "sweeping"
    pub fn status(&self) -> Result<JsValue, JsValue> {
        to_js_value(&self.engine.status())
    }

    /// Note name for the display frequency
    pub fn note_name(&self) -> String {
        self.engine.note_name()
    }

    /// Note name for any frequency
    pub fn describe_frequency(frequency: f64) -> String {
        pitch::describe(frequency)
    }

    // =========================================================================
    // Noise
    // =========================================================================

    pub fn play_noise(&mut self, color: &str) -> Result<(), JsValue> {
        let color: NoiseColor = color.parse().map_err(to_js)?;
        self.engine.play_noise(color);
        Ok(())
    }

    pub fn stop_noise(&mut self) -> bool {
        self.engine.stop_noise()
    }

    /// Noise button handler; true when `color` is now playing
    pub fn toggle_noise(&mut self, color: &str) -> Result<bool, JsValue> {
        let color: NoiseColor = color.parse().map_err(to_js)?;
        Ok(self.engine.toggle_noise(color))
    }

    /// Color currently playing, or undefined
    pub fn noise_color(&self) -> Option<String> {
        self.engine.noise_color().map(|c| c.as_str().to_string())
    }

    /// Description shown under a noise button
    pub fn noise_description(color: &str) -> Result<String, JsValue> {
        let color: NoiseColor = color.parse().map_err(to_js)?;
        Ok(color.description().to_string())
    }

    // =========================================================================
    // Sweep
    // =========================================================================

    /// Start a sweep; unusable fields fall back to the configured defaults
    pub fn start_sweep(
        &mut self,
        start_freq: f64,
        end_freq: f64,
        duration_secs: f64,
        curve: &str,
    ) -> Result<(), JsValue> {
        let curve: SweepCurve = curve.parse().map_err(to_js)?;
        self.engine
            .start_sweep(SweepParams::new(start_freq, end_freq, duration_secs, curve));
        Ok(())
    }

    pub fn toggle_sweep(&mut self) -> bool {
        self.engine.toggle_sweep()
    }

    pub fn cancel_sweep(&mut self) -> bool {
        self.engine.cancel_sweep()
    }

    #[wasm_bindgen(getter)]
    pub fn sweep_progress(&self) -> f64 {
        self.engine.sweep_progress()
    }

    /// Frame callback; returns the sweep step, or undefined when idle
    pub fn on_frame(&mut self) -> Result<JsValue, JsValue> {
        match self.engine.on_frame() {
            Some(step) => to_js_value(&step),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    // =========================================================================
    // Tests and Presets
    // =========================================================================

    /// Timer callback; returns a test report when a test finished
    pub fn tick(&mut self, now_ms: f64) -> Result<JsValue, JsValue> {
        match self.engine.tick(now_ms) {
            Some(report) => to_js_value(&report),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    pub fn start_hearing_test(&mut self, now_ms: f64) {
        self.engine.start_hearing_test(now_ms);
    }

    /// Stop the running test; returns its report, or undefined
    pub fn stop_test(&mut self) -> Result<JsValue, JsValue> {
        match self.engine.stop_test() {
            Some(report) => to_js_value(&report),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Report of the running or last test, or undefined
    pub fn test_report(&self) -> Result<JsValue, JsValue> {
        match self.engine.test_report() {
            Some(report) => to_js_value(&report),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    pub fn check_tinnitus_octave(&mut self, base: f64, now_ms: f64) {
        self.engine.check_tinnitus_octave(base, now_ms);
    }

    pub fn toggle_tinnitus_tone(&mut self, frequency: f64) -> bool {
        self.engine.toggle_tinnitus_tone(frequency)
    }

    pub fn set_tinnitus_frequency(&mut self, frequency: f64) {
        self.engine.set_tinnitus_frequency(frequency);
    }

    pub fn play_polarity_test(&mut self, in_phase: bool, now_ms: f64) {
        self.engine.play_polarity_test(in_phase, now_ms);
    }

    pub fn play_stereo_test(&mut self, channel: &str) -> Result<(), JsValue> {
        let channel: Channel = channel.parse().map_err(to_js)?;
        self.engine.play_stereo_test(channel);
        Ok(())
    }

    pub fn play_bass_test(&mut self, frequency: f64) {
        self.engine.play_bass_test(frequency);
    }

    pub fn play_audiometric(&mut self, frequency: f64) {
        self.engine.play_audiometric(frequency);
    }

    pub fn play_preset_frequency(&mut self, frequency: f64) {
        self.engine.play_preset_frequency(frequency);
    }

    pub fn set_selected_ear(&mut self, ear: &str) -> Result<(), JsValue> {
        let ear: Channel = ear.parse().map_err(to_js)?;
        self.engine.set_selected_ear(ear);
        Ok(())
    }

    /// Full preset catalogue
    pub fn get_presets(&self) -> Result<JsValue, JsValue> {
        to_js_value(&PresetLibrary::list())
    }

    /// Apply a preset from the catalogue by category and name
    pub fn apply_preset(&mut self, category: &str, name: &str) -> Result<(), JsValue> {
        let category: PresetCategory = serde_json::from_value(serde_json::Value::from(category))
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        let preset = PresetLibrary::get(category, name)
            .ok_or_else(|| JsValue::from_str(&format!("Unknown preset: {}", name)))?;
        self.engine.apply_preset(preset);
        Ok(())
    }

    // =========================================================================
    // Audio Processing
    // =========================================================================

    /// Process a block of samples and return interleaved stereo Float32Array
    pub fn process_block(&mut self, num_samples: usize) -> js_sys::Float32Array {
        let mut block = vec![0.0f32; num_samples * 2];
        self.engine.render_interleaved(&mut block);
        for sample in block.iter_mut() {
            *sample = sample.clamp(-SAFETY_LIMIT, SAFETY_LIMIT);
        }
        js_sys::Float32Array::from(block.as_slice())
    }

    /// Audio clock in seconds
    #[wasm_bindgen(getter)]
    pub fn current_time(&self) -> f64 {
        self.engine.current_time()
    }

    /// The AudioContext was suspended
    pub fn suspend(&mut self) {
        self.engine.suspend();
    }

    /// The AudioContext resumed
    pub fn resume(&mut self) {
        self.engine.resume();
    }

    /// Whether the page should call `AudioContext.resume()`
    #[wasm_bindgen(getter)]
    pub fn resume_requested(&self) -> bool {
        self.engine.resume_requested()
    }

    // =========================================================================
    // Visualization
    // =========================================================================

    /// Waveform trace, spectrum bars and peak marker for a canvas size
    pub fn visual_frame(&mut self, width: f64, height: f64) -> Result<JsValue, JsValue> {
        match self.engine.visual_frame(Viewport::new(width, height)) {
            Some(frame) => to_js_value(&frame),
            None => Ok(JsValue::UNDEFINED),
        }
    }
}
