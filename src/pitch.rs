//! Pitch Namer
//!
//! Nearest equal-tempered note for a frequency, with the deviation in cents.
//! Notes are indexed from C0 = 0, so A4 (440 Hz) is index 57; indices outside
//! 0..=127 have no name.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Chromatic note names starting at C
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Reference pitch for A4
pub const A4_HZ: f64 = 440.0;

/// Index of A4 counted from C0
pub const A4_INDEX: i64 = 57;

/// Text shown for frequencies with no note
pub const UNKNOWN: &str = "unknown";

/// A named pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pitch {
    pub name: &'static str,
    pub octave: u8,
    /// Deviation from the named note, -50..=50
    pub cents: i32,
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.octave)?;
        match self.cents {
            0 => Ok(()),
            c if c > 0 => write!(f, " +{}c", c),
            c => write!(f, " {}c", c),
        }
    }
}

/// Round half towards positive infinity
#[inline]
fn round_half_up(x: f64) -> f64 {
    libm::floor(x + 0.5)
}

/// Nearest note to `frequency`, or `None` when out of range
pub fn name_of(frequency: f64) -> Option<Pitch> {
    let semitones = 12.0 * libm::log2(frequency / A4_HZ);
    if !semitones.is_finite() {
        return None;
    }

    let index = round_half_up(semitones) as i64 + A4_INDEX;
    if !(0..=127).contains(&index) {
        return None;
    }

    let exact = semitones + A4_INDEX as f64;
    let cents = round_half_up((exact - index as f64) * 100.0) as i32;

    Some(Pitch {
        name: NOTE_NAMES[(index % 12) as usize],
        octave: (index / 12) as u8,
        cents,
    })
}

/// Display text for `frequency`, "unknown" when it has no note
pub fn describe(frequency: f64) -> String {
    name_of(frequency)
        .map(|p| p.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concert_pitch() {
        assert_eq!(describe(440.0), "A4");
        assert_eq!(describe(880.0), "A5");
        assert_eq!(describe(220.0), "A3");
    }

    #[test]
    fn test_middle_c() {
        let pitch = name_of(261.63).unwrap();
        assert_eq!(pitch.name, "C");
        assert_eq!(pitch.octave, 4);
        assert_eq!(pitch.cents, 0);
    }

    #[test]
    fn test_sharp_with_cents() {
        let pitch = name_of(466.16).unwrap();
        assert_eq!(pitch.name, "A#");
        assert_eq!(pitch.octave, 4);
        assert!(pitch.cents.abs() <= 1);

        assert_eq!(describe(446.0), "A4 +23c");
        assert_eq!(describe(434.0), "A4 -24c");
    }

    #[test]
    fn test_unknown() {
        assert_eq!(describe(0.0), UNKNOWN);
        assert_eq!(describe(-10.0), UNKNOWN);
        assert_eq!(describe(f64::NAN), UNKNOWN);
        assert_eq!(describe(1.0e12), UNKNOWN);
        // Below C0
        assert_eq!(describe(10.0), UNKNOWN);
    }

    #[test]
    fn test_range_edges() {
        assert_eq!(describe(16.35), "C0");
        assert_eq!(name_of(12_543.85).map(|p| p.octave), Some(9));
        assert_eq!(describe(20_000.0), "D#10 +8c");
    }
}
