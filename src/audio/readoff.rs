//! Frequency read-off helpers: bin/frequency conversion, peak picking and
//! musical note labels for read-off lines and their harmonics.

use crate::audio::constants::{MIDDLE_C_FREQUENCY, READOFF_HARMONICS, SEMITONES_PER_OCTAVE};
use crate::audio::fft_engine::SpectralSlice;
use libm::log2f;
use std::fmt;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "G#", "A", "Bb", "B",
];

/// Centre frequency of `bin` in Hz
pub fn bin_to_frequency(bin: usize, sample_rate: u32, fft_length: usize) -> f32 {
    bin as f32 * sample_rate as f32 / fft_length as f32
}

/// Fractional bin index of `frequency`
pub fn frequency_to_bin(frequency: f32, sample_rate: u32, fft_length: usize) -> f32 {
    frequency * fft_length as f32 / sample_rate as f32
}

/// Frequency of the strongest bin, ignoring DC
pub fn peak_frequency(slice: &SpectralSlice, sample_rate: u32, fft_length: usize) -> Option<f32> {
    let (bin, power) = slice
        .iter()
        .copied()
        .enumerate()
        .skip(1)
        .fold(None, |best: Option<(usize, f32)>, (i, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((i, p)),
        })?;

    if power <= 0.0 {
        return None;
    }
    Some(bin_to_frequency(bin, sample_rate, fft_length))
}

/// Nearest equal-tempered note, octaves numbered so middle C is C4
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    /// Semitones from middle C
    pub semitone: i32,
    pub octave: i32,
}

impl Note {
    pub fn from_frequency(frequency: f32) -> Option<Self> {
        if !(frequency.is_finite() && frequency > 0.0) {
            return None;
        }
        let semitone =
            (SEMITONES_PER_OCTAVE as f32 * log2f(frequency / MIDDLE_C_FREQUENCY)).round() as i32;
        Some(Self {
            semitone,
            octave: 4 + semitone.div_euclid(SEMITONES_PER_OCTAVE),
        })
    }

    pub fn name(&self) -> &'static str {
        NOTE_NAMES[self.semitone.rem_euclid(SEMITONES_PER_OCTAVE) as usize]
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name(), self.octave)
    }
}

/// A horizontal read-off line at a selected frequency or one of its harmonics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadoffLine {
    /// 1 for the selected frequency, n for the n-th harmonic
    pub harmonic: usize,
    pub frequency: f32,
    pub note: Option<Note>,
}

impl ReadoffLine {
    /// Label as drawn next to the line, e.g. `440 A4`
    pub fn label(&self) -> String {
        match self.note {
            Some(note) => format!("{} {}", self.frequency.round() as i64, note),
            None => format!("{}", self.frequency.round() as i64),
        }
    }
}

/// Read-off lines for `frequency`, plus its harmonics when requested.
/// Lines above `max_frequency` (usually Nyquist) are dropped.
pub fn readoff_lines(frequency: f32, with_harmonics: bool, max_frequency: f32) -> Vec<ReadoffLine> {
    if frequency.is_nan() || frequency <= 0.0 {
        return Vec::new();
    }
    let count = if with_harmonics { READOFF_HARMONICS } else { 1 };

    (1..=count)
        .map(|harmonic| {
            let frequency = harmonic as f32 * frequency;
            ReadoffLine {
                harmonic,
                frequency,
                note: Note::from_frequency(frequency),
            }
        })
        .take_while(|line| line.frequency <= max_frequency)
        .collect()
}
