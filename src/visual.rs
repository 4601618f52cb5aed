//! Visualization Mapper
//!
//! Turns the analysis tap's byte snapshots into display geometry. The host
//! draws whatever comes out; nothing here touches a canvas.
//!
//! - waveform: a cycle-aligned prefix of the time-domain codes, stretched
//!   across the width so a steady tone shows 2 to 5 clean periods
//! - spectrum: 128 bars sampling bin `floor((i/128)² · len)`, a squared warp
//!   that widens the low end
//! - peak marker: `sqrt(f / nyquist) · width`, the inverse of the bar warp

use serde::{Deserialize, Serialize};

/// Number of spectrum bars
pub const BAR_COUNT: usize = 128;

/// Most periods the waveform trace shows
pub const MAX_CYCLES: usize = 5;

/// Fewest periods the waveform trace shows
pub const MIN_CYCLES: usize = 2;

/// Display surface size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Polyline for the waveform display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformTrace {
    /// (x, y) pairs, y measured down from the top
    pub points: Vec<(f64, f64)>,
    pub samples_per_cycle: usize,
    pub cycles: usize,
}

/// How many leading samples the trace covers for a steady `frequency`
pub fn samples_to_show(buffer_len: usize, sample_rate: f64, frequency: f64) -> (usize, usize, usize) {
    let per_cycle = libm::round(sample_rate / frequency);
    let samples_per_cycle = if per_cycle.is_finite() && per_cycle >= 1.0 {
        per_cycle as usize
    } else {
        1
    };
    let cycles = (buffer_len / samples_per_cycle).min(MAX_CYCLES).max(MIN_CYCLES);
    let shown = buffer_len.min(samples_per_cycle.saturating_mul(cycles));
    (shown, samples_per_cycle, cycles)
}

/// Map time-domain codes to a polyline across the viewport
pub fn waveform_trace(
    data: &[u8],
    sample_rate: f64,
    frequency: f64,
    viewport: Viewport,
) -> WaveformTrace {
    let (shown, samples_per_cycle, cycles) = samples_to_show(data.len(), sample_rate, frequency);
    let slice_width = if shown > 0 {
        viewport.width / shown as f64
    } else {
        0.0
    };

    let points = data[..shown]
        .iter()
        .enumerate()
        .map(|(i, &code)| {
            let v = code as f64 / 128.0;
            (i as f64 * slice_width, v * viewport.height / 2.0)
        })
        .collect();

    WaveformTrace {
        points,
        samples_per_cycle,
        cycles,
    }
}

/// HSL colour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsl {
    pub hue: f64,
    pub saturation: f64,
    pub lightness: f64,
}

impl Hsl {
    /// Colour for a magnitude code: teal when quiet, green when loud
    pub fn for_magnitude(value: u8) -> Self {
        let level = value as f64 / 255.0;
        Self {
            hue: 160.0 - level * 40.0,
            saturation: 80.0,
            lightness: 40.0 + level * 30.0,
        }
    }

    /// CSS `hsl()` string
    pub fn to_css(&self) -> String {
        format!("hsl({}, {}%, {}%)", self.hue, self.saturation, self.lightness)
    }
}

/// One spectrum bar, anchored at the bottom of the viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: Hsl,
}

/// Frequency bin sampled by bar `i`
#[inline]
pub fn bar_bin_index(i: usize, buffer_len: usize) -> usize {
    if buffer_len == 0 {
        return 0;
    }
    let t = i as f64 / BAR_COUNT as f64;
    let index = libm::floor(t * t * buffer_len as f64) as usize;
    index.min(buffer_len - 1)
}

/// Map magnitude codes to [`BAR_COUNT`] bars
pub fn spectrum_bars(data: &[u8], viewport: Viewport) -> Vec<Bar> {
    let bar_width = viewport.width / BAR_COUNT as f64;

    (0..BAR_COUNT)
        .map(|i| {
            let value = data.get(bar_bin_index(i, data.len())).copied().unwrap_or(0);
            let height = value as f64 / 255.0 * viewport.height;
            Bar {
                x: i as f64 * bar_width,
                y: viewport.height - height,
                // One pixel gap between bars
                width: (bar_width - 1.0).max(0.0),
                height,
                color: Hsl::for_magnitude(value),
            }
        })
        .collect()
}

/// Vertical line at the playing frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakMarker {
    pub x: f64,
    pub label: String,
}

/// Marker position on the bar axis for `frequency`
pub fn peak_marker(frequency: f64, sample_rate: f64, viewport: Viewport) -> PeakMarker {
    let normalized = frequency / (sample_rate / 2.0);
    PeakMarker {
        x: libm::sqrt(normalized.max(0.0)) * viewport.width,
        label: format!("{} Hz", libm::round(frequency)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const VIEW: Viewport = Viewport {
        width: 800.0,
        height: 200.0,
    };

    #[test]
    fn test_waveform_shows_five_cycles() {
        // 441 Hz at 44.1 kHz: 100 samples per cycle, 10 fit, 5 shown
        let data = vec![128u8; 1024];
        let trace = waveform_trace(&data, 44_100.0, 441.0, VIEW);
        assert_eq!(trace.samples_per_cycle, 100);
        assert_eq!(trace.cycles, 5);
        assert_eq!(trace.points.len(), 500);
        assert_abs_diff_eq!(trace.points[1].0, 800.0 / 500.0, epsilon = 1e-9);
        // Silence sits on the centre line
        assert!(trace.points.iter().all(|&(_, y)| y == 100.0));
    }

    #[test]
    fn test_waveform_low_frequency_shows_whole_buffer() {
        let data = vec![128u8; 1024];
        let trace = waveform_trace(&data, 44_100.0, 20.0, VIEW);
        assert_eq!(trace.cycles, MIN_CYCLES);
        assert_eq!(trace.points.len(), 1024);
    }

    #[test]
    fn test_waveform_tiny_frequency_saturates() {
        let (shown, samples_per_cycle, cycles) = samples_to_show(1024, 44_100.0, 1e-300);
        assert_eq!(samples_per_cycle, usize::MAX);
        assert_eq!(cycles, MIN_CYCLES);
        assert_eq!(shown, 1024);

        let trace = waveform_trace(&[128u8; 64], 44_100.0, 1e-300, VIEW);
        assert_eq!(trace.points.len(), 64);
    }

    #[test]
    fn test_waveform_extremes() {
        let data = [0u8, 255u8];
        let trace = waveform_trace(&data, 44_100.0, 22_050.0, VIEW);
        assert_eq!(trace.points[0].1, 0.0);
        assert_abs_diff_eq!(trace.points[1].1, 255.0 / 128.0 * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bar_warp() {
        assert_eq!(bar_bin_index(0, 1024), 0);
        assert_eq!(bar_bin_index(64, 1024), 256);
        assert_eq!(bar_bin_index(127, 1024), 1008);
        for i in 1..BAR_COUNT {
            assert!(bar_bin_index(i, 1024) >= bar_bin_index(i - 1, 1024));
        }
        assert_eq!(bar_bin_index(5, 0), 0);
    }

    #[test]
    fn test_spectrum_bars_geometry() {
        let mut data = vec![0u8; 1024];
        data[256] = 255;
        let bars = spectrum_bars(&data, VIEW);
        assert_eq!(bars.len(), BAR_COUNT);

        let loud = &bars[64];
        assert_eq!(loud.height, 200.0);
        assert_eq!(loud.y, 0.0);
        assert_eq!(loud.x, 64.0 * 6.25);
        assert_eq!(loud.width, 5.25);
        assert_eq!(loud.color.hue, 120.0);
        assert_eq!(loud.color.lightness, 70.0);

        let quiet = &bars[10];
        assert_eq!(quiet.height, 0.0);
        assert_eq!(quiet.color.hue, 160.0);
        assert_eq!(quiet.color.to_css(), "hsl(160, 80%, 40%)");
    }

    #[test]
    fn test_peak_marker_inverts_warp() {
        let marker = peak_marker(5512.5, 44_100.0, VIEW);
        assert_abs_diff_eq!(marker.x, 400.0, epsilon = 1e-9);
        assert_eq!(marker.label, "5513 Hz");

        // The marker lands on the bar that samples that frequency's bin
        let bar = (marker.x / (VIEW.width / BAR_COUNT as f64)) as usize;
        let bin = bar_bin_index(bar, 1024);
        assert_eq!(bin, 256);
    }
}
