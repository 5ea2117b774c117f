//! Measure rendering - one full bar of mixed click audio
//!
//! Renders accent, beat and subdivision clicks into a single measure-length
//! buffer. The buffer length is derived purely from tempo and time
//! signature, so a muted measure has exactly the same length as an audible
//! one and the playback loop stays on the grid either way.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::audio::click::{synthesize, SoundParams};
use crate::error::CommandError;

/// Time signature as beats-per-measure over note value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Number of beats per measure (numerator, 1-32)
    pub beats_per_measure: u8,
    /// Note value that gets one beat (denominator: 2, 4, 8, 16 or 32)
    pub note_value: u8,
}

impl TimeSignature {
    /// Standard 4/4 time.
    pub const FOUR_FOUR: TimeSignature = TimeSignature {
        beats_per_measure: 4,
        note_value: 4,
    };

    /// Create a validated time signature.
    pub fn new(beats_per_measure: u8, note_value: u8) -> Result<Self, CommandError> {
        if !(1..=32).contains(&beats_per_measure) || !matches!(note_value, 2 | 4 | 8 | 16 | 32) {
            return Err(CommandError::InvalidTimeSignature {
                numerator: beats_per_measure,
                denominator: note_value,
            });
        }
        Ok(Self {
            beats_per_measure,
            note_value,
        })
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_measure, self.note_value)
    }
}

impl FromStr for TimeSignature {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CommandError::InvalidTimeSignature {
            numerator: 0,
            denominator: 0,
        };
        let (num, den) = s.split_once('/').ok_or_else(invalid)?;
        let numerator: u8 = num.trim().parse().map_err(|_| invalid())?;
        let denominator: u8 = den.trim().parse().map_err(|_| invalid())?;
        TimeSignature::new(numerator, denominator)
    }
}

/// Tempo, signature and subdivision level for one measure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoState {
    /// Beats per minute (5-1000)
    pub bpm: u32,
    pub signature: TimeSignature,
    /// Clicks per beat: 0 = off, 2, 4 or 8
    pub subdivision_level: u8,
}

impl TempoState {
    /// Samples in one beat at the given sample rate.
    ///
    /// `round(sample_rate * 60/bpm * 4/note_value)` — the note value scales
    /// the quarter-note duration (an eighth lasts half a quarter).
    pub fn samples_per_beat(&self, sample_rate: u32) -> usize {
        (sample_rate as f64 * 60.0 / self.bpm as f64 * 4.0 / self.signature.note_value as f64)
            .round() as usize
    }

    /// Samples in one full measure at the given sample rate.
    pub fn samples_per_measure(&self, sample_rate: u32) -> usize {
        self.samples_per_beat(sample_rate) * self.signature.beats_per_measure as usize
    }
}

/// The three click voices of the metronome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSet {
    pub accent: SoundParams,
    pub beat: SoundParams,
    pub subdivision: SoundParams,
}

impl Default for VoiceSet {
    fn default() -> Self {
        Self {
            accent: SoundParams::accent_default(),
            beat: SoundParams::beat_default(),
            subdivision: SoundParams::subdivision_default(),
        }
    }
}

/// Render one measure of click audio.
///
/// The accent click lands on beat 0, the beat click on every other beat, and
/// the subdivision click on `subdivision_level - 1` evenly spaced interior
/// offsets within each beat (offset 0 belongs to the main click). Clicks
/// running past the measure end are truncated. After mixing, the buffer is
/// rescaled by its peak if that peak exceeds full scale, then quantized to
/// `i16`. A muted measure is all zeros of the same length.
pub fn render_measure(
    tempo: &TempoState,
    voices: &VoiceSet,
    muted: bool,
    sample_rate: u32,
) -> Vec<i16> {
    let samples_per_beat = tempo.samples_per_beat(sample_rate);
    let samples_per_measure = tempo.samples_per_measure(sample_rate);

    if muted {
        return vec![0; samples_per_measure];
    }

    let accent = synthesize(&voices.accent, sample_rate);
    let beat = synthesize(&voices.beat, sample_rate);
    let subdivision = synthesize(&voices.subdivision, sample_rate);

    let mut mix = vec![0.0f32; samples_per_measure];

    for beat_index in 0..tempo.signature.beats_per_measure as usize {
        let start = beat_index * samples_per_beat;
        let main_click = if beat_index == 0 { &accent } else { &beat };
        overlay(&mut mix, main_click, start);

        if tempo.subdivision_level > 1 && !subdivision.is_empty() {
            let samples_per_sub = samples_per_beat / tempo.subdivision_level as usize;
            for sub_index in 1..tempo.subdivision_level as usize {
                let sub_start = start + sub_index * samples_per_sub;
                if sub_start >= samples_per_measure {
                    break;
                }
                overlay(&mut mix, &subdivision, sub_start);
            }
        }
    }

    // Per-measure normalization: overlapping clicks may sum past full scale
    let peak = mix.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
    if peak > 1.0 {
        for x in &mut mix {
            *x /= peak;
        }
    }

    mix.into_iter().map(|x| (x * 32767.0) as i16).collect()
}

/// Add a click into the mix starting at `start`, truncated at the buffer end.
fn overlay(mix: &mut [f32], click: &[i16], start: usize) {
    if start >= mix.len() {
        return;
    }
    let end = (start + click.len()).min(mix.len());
    for (dst, &src) in mix[start..end].iter_mut().zip(click.iter()) {
        *dst += src as f32 / 32767.0;
    }
}
