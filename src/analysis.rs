//! Analysis Tap
//!
//! A passive monitoring point at the end of the signal graph. It keeps the
//! most recent analysis window of the (mono-downmixed) output and produces
//! the two 8-bit snapshots the visualization mapper consumes:
//!
//! - time-domain amplitude codes, 128 = silence
//! - frequency-domain magnitude codes, Blackman-windowed FFT scaled between
//!   `min_decibels` and `max_decibels`, smoothed across snapshots
//!
//! Both snapshots are `fft_size / 2` entries long.

use crate::config::EngineConfig;
use core::f64::consts::PI;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Rolling analysis window with byte snapshot readout
pub struct AnalysisTap {
    fft_size: usize,
    /// Circular sample history
    ring: Vec<f32>,
    write_pos: usize,
    smoothing: f64,
    min_decibels: f64,
    max_decibels: f64,
    /// Smoothed linear magnitudes from the previous snapshot
    smoothed: Vec<f64>,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
    spectrum: Vec<Complex<f64>>,
}

impl AnalysisTap {
    pub fn new(config: &EngineConfig) -> Self {
        let fft_size = config.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        Self {
            fft_size,
            ring: vec![0.0; fft_size],
            write_pos: 0,
            smoothing: config.smoothing_time_constant,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            smoothed: vec![0.0; fft_size / 2],
            window: blackman_window(fft_size),
            fft,
            spectrum: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    /// Analysis window size in samples
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Length of both byte snapshots
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Record one output sample
    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.ring[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.fft_size;
    }

    /// The analysis window in chronological order, oldest first
    pub fn window_samples(&self) -> impl Iterator<Item = f32> + '_ {
        let (newer, older) = self.ring.split_at(self.write_pos);
        older.iter().chain(newer.iter()).copied()
    }

    /// Amplitude codes for the start of the current window
    pub fn byte_time_domain_data(&self) -> Vec<u8> {
        self.window_samples()
            .take(self.bin_count())
            .map(amplitude_to_byte)
            .collect()
    }

    /// Magnitude codes for every frequency bin up to Nyquist
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let mut spectrum = core::mem::take(&mut self.spectrum);
        let (newer, older) = self.ring.split_at(self.write_pos);
        for ((slot, &sample), &w) in spectrum
            .iter_mut()
            .zip(older.iter().chain(newer.iter()))
            .zip(self.window.iter())
        {
            *slot = Complex::new(sample as f64 * w, 0.0);
        }
        self.fft.process(&mut spectrum);

        let scale = 1.0 / self.fft_size as f64;
        let range = self.max_decibels - self.min_decibels;
        let mut bytes = Vec::with_capacity(self.bin_count());

        for (k, bin) in spectrum.iter().take(self.bin_count()).enumerate() {
            let magnitude = bin.norm() * scale;
            let value = self.smoothing * self.smoothed[k] + (1.0 - self.smoothing) * magnitude;
            self.smoothed[k] = if value.is_finite() { value } else { 0.0 };

            let db = linear_to_decibels(self.smoothed[k]);
            let scaled = 255.0 / range * (db - self.min_decibels);
            bytes.push(scaled.clamp(0.0, 255.0) as u8);
        }

        self.spectrum = spectrum;
        bytes
    }

    /// Forget all history
    pub fn clear(&mut self) {
        self.ring.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
    }
}

/// Convert a sample in [-1, 1] to an unsigned amplitude code
#[inline]
pub fn amplitude_to_byte(sample: f32) -> u8 {
    (128.0 * (sample + 1.0)).clamp(0.0, 255.0) as u8
}

fn linear_to_decibels(value: f64) -> f64 {
    if value > 0.0 {
        20.0 * libm::log10(value)
    } else {
        f64::NEG_INFINITY
    }
}

fn blackman_window(size: usize) -> Vec<f64> {
    const A0: f64 = 0.42;
    const A1: f64 = 0.5;
    const A2: f64 = 0.08;

    (0..size)
        .map(|i| {
            let x = i as f64 / size as f64;
            A0 - A1 * libm::cos(2.0 * PI * x) + A2 * libm::cos(4.0 * PI * x)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tap() -> AnalysisTap {
        AnalysisTap::new(&EngineConfig::default())
    }

    #[test]
    fn test_snapshot_lengths() {
        let mut tap = tap();
        assert_eq!(tap.bin_count(), 1024);
        assert_eq!(tap.byte_time_domain_data().len(), 1024);
        assert_eq!(tap.byte_frequency_data().len(), 1024);
    }

    #[test]
    fn test_silence_codes() {
        let mut tap = tap();
        assert!(tap.byte_time_domain_data().iter().all(|&b| b == 128));
        assert!(tap.byte_frequency_data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_amplitude_codes_clamp() {
        assert_eq!(amplitude_to_byte(0.0), 128);
        assert_eq!(amplitude_to_byte(-1.0), 0);
        assert_eq!(amplitude_to_byte(1.0), 255);
        assert_eq!(amplitude_to_byte(3.0), 255);
    }

    #[test]
    fn test_window_is_chronological() {
        let config = EngineConfig {
            fft_size: 32,
            ..Default::default()
        };
        let mut tap = AnalysisTap::new(&config);
        for i in 0..40 {
            tap.push(i as f32);
        }
        let window: Vec<f32> = tap.window_samples().collect();
        assert_eq!(window.first().copied(), Some(8.0));
        assert_eq!(window.last().copied(), Some(39.0));
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        let mut tap = tap();
        let sample_rate = 44_100.0;
        let freq = 1000.0;
        for i in 0..tap.fft_size() {
            let t = i as f64 / sample_rate;
            tap.push((0.5 * (2.0 * PI * freq * t).sin()) as f32);
        }

        let bytes = tap.byte_frequency_data();
        let (peak_bin, peak) = bytes
            .iter()
            .enumerate()
            .max_by_key(|&(_, b)| *b)
            .unwrap();

        let expected = (freq * tap.fft_size() as f64 / sample_rate).round() as usize;
        assert!(peak_bin.abs_diff(expected) <= 1, "peak at bin {}", peak_bin);
        assert!(*peak > 0);
    }

    #[test]
    fn test_clear_resets_history() {
        let mut tap = tap();
        for _ in 0..100 {
            tap.push(0.9);
        }
        tap.clear();
        assert!(tap.byte_time_domain_data().iter().all(|&b| b == 128));
    }
}
