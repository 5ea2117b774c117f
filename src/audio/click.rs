//! Click synthesis - sine bursts shaped by a linear attack/sustain/decay envelope
//!
//! This module generates the short audible "beep" for a single metronome
//! voice. Key properties:
//! - Pure function (no shared state, deterministic output)
//! - Degenerate durations produce silence, never an error
//! - Attack/decay are rescaled proportionally if they would not fit the
//!   click duration, so the sustain span can never go negative

use serde::{Deserialize, Serialize};

use crate::error::CommandError;

/// Synthesis parameters for one metronome voice.
///
/// Invariant (enforced by [`SoundParams::validate`] before a mutation is
/// accepted): `attack_ms + decay_ms <= duration_ms`. The synthesizer itself
/// tolerates violated sets by rescaling the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoundParams {
    /// Audible click length in milliseconds
    pub duration_ms: f32,
    /// Output level, 0-100
    pub volume_percent: u8,
    /// Linear fade-in length in milliseconds
    pub attack_ms: f32,
    /// Linear fade-out length in milliseconds
    pub decay_ms: f32,
    /// Sine frequency in Hz
    pub frequency_hz: f32,
}

impl SoundParams {
    /// Factory default for the accent voice (first beat of the measure).
    pub fn accent_default() -> Self {
        Self {
            duration_ms: 70.0,
            volume_percent: 50,
            attack_ms: 5.0,
            decay_ms: 8.0,
            frequency_hz: 915.0,
        }
    }

    /// Factory default for the regular beat voice.
    pub fn beat_default() -> Self {
        Self {
            duration_ms: 40.0,
            volume_percent: 35,
            attack_ms: 5.0,
            decay_ms: 12.0,
            frequency_hz: 550.0,
        }
    }

    /// Factory default for the subdivision voice.
    pub fn subdivision_default() -> Self {
        Self {
            duration_ms: 10.0,
            volume_percent: 15,
            attack_ms: 2.0,
            decay_ms: 8.0,
            frequency_hz: 1030.0,
        }
    }

    /// Check the per-voice invariants.
    pub fn validate(&self) -> Result<(), CommandError> {
        if self.duration_ms <= 0.0 {
            return Err(CommandError::NonPositiveParameter { name: "duration" });
        }
        if self.frequency_hz <= 0.0 {
            return Err(CommandError::NonPositiveParameter { name: "frequency" });
        }
        if self.attack_ms < 0.0 {
            return Err(CommandError::NonPositiveParameter { name: "attack" });
        }
        if self.decay_ms < 0.0 {
            return Err(CommandError::NonPositiveParameter { name: "decay" });
        }
        if self.volume_percent > 100 {
            return Err(CommandError::VolumeOutOfRange {
                volume: self.volume_percent as f32,
            });
        }
        if self.attack_ms + self.decay_ms > self.duration_ms {
            return Err(CommandError::EnvelopeExceedsDuration {
                attack_ms: self.attack_ms,
                decay_ms: self.decay_ms,
                duration_ms: self.duration_ms,
            });
        }
        Ok(())
    }
}

/// Render one click into a mono `i16` sample vector.
///
/// Returns an empty vector when the duration rounds down to zero samples
/// (a valid "no click" result).
pub fn synthesize(params: &SoundParams, sample_rate: u32) -> Vec<i16> {
    let beep_samples = (sample_rate as f32 * params.duration_ms / 1000.0) as usize;
    if beep_samples == 0 {
        return Vec::new();
    }

    let mut attack_samples = (sample_rate as f32 * params.attack_ms / 1000.0) as usize;
    let mut decay_samples = (sample_rate as f32 * params.decay_ms / 1000.0) as usize;

    // Rescale proportionally if the envelope is longer than the click itself
    let envelope_samples = attack_samples + decay_samples;
    if envelope_samples > beep_samples {
        let ratio = beep_samples as f32 / envelope_samples as f32;
        attack_samples = (attack_samples as f32 * ratio) as usize;
        decay_samples = (decay_samples as f32 * ratio) as usize;
    }
    let sustain_samples = beep_samples.saturating_sub(attack_samples + decay_samples);

    let amplitude = params.volume_percent as f32 / 100.0;
    let phase_step = 2.0 * std::f32::consts::PI * params.frequency_hz / sample_rate as f32;

    let mut samples = Vec::with_capacity(beep_samples);
    for n in 0..beep_samples {
        let wave = (phase_step * n as f32).sin();
        let gain = envelope_gain(n, attack_samples, sustain_samples, decay_samples);
        let value = (amplitude * wave * gain).clamp(-1.0, 1.0);
        samples.push((value * 32767.0) as i16);
    }
    samples
}

/// Piecewise-linear envelope: 0→1 over the attack, 1 over the sustain,
/// 1→0 over the decay. Ramp endpoints are inclusive.
fn envelope_gain(n: usize, attack: usize, sustain: usize, decay: usize) -> f32 {
    if n < attack {
        if attack > 1 {
            n as f32 / (attack - 1) as f32
        } else {
            0.0
        }
    } else if n < attack + sustain {
        1.0
    } else {
        let i = n - attack - sustain;
        if decay > 1 {
            1.0 - i as f32 / (decay - 1) as f32
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44100;

    #[test]
    fn test_synthesize_length() {
        let params = SoundParams::beat_default();
        let click = synthesize(&params, SAMPLE_RATE);
        let expected = (SAMPLE_RATE as f32 * params.duration_ms / 1000.0) as usize;
        assert_eq!(click.len(), expected);
    }

    #[test]
    fn test_zero_duration_is_silence() {
        let mut params = SoundParams::beat_default();
        params.duration_ms = 0.01; // rounds down to zero samples
        assert!(synthesize(&params, SAMPLE_RATE).is_empty());
    }

    #[test]
    fn test_synthesize_deterministic() {
        let params = SoundParams::accent_default();
        let a = synthesize(&params, SAMPLE_RATE);
        let b = synthesize(&params, SAMPLE_RATE);
        assert_eq!(a, b);
    }

    #[test]
    fn test_amplitude_bounded_by_volume() {
        let params = SoundParams::accent_default();
        let click = synthesize(&params, SAMPLE_RATE);
        let limit = (params.volume_percent as f32 / 100.0 * 32767.0) as i16;
        for &s in &click {
            assert!(s.abs() <= limit, "sample {} above volume limit {}", s, limit);
        }
    }

    #[test]
    fn test_envelope_starts_and_ends_quiet() {
        let params = SoundParams {
            duration_ms: 50.0,
            volume_percent: 100,
            attack_ms: 10.0,
            decay_ms: 10.0,
            frequency_hz: 1000.0,
        };
        let click = synthesize(&params, SAMPLE_RATE);
        // First sample sits at envelope gain 0
        assert_eq!(click[0], 0);
        // The last decay sample carries a near-zero gain
        let tail = *click.last().unwrap();
        assert!(tail.abs() < 1000, "tail sample {} too loud", tail);
    }

    #[test]
    fn test_oversized_envelope_rescaled() {
        // attack + decay = 3x duration; must not panic and must fill the
        // whole click with a valid envelope
        let params = SoundParams {
            duration_ms: 10.0,
            volume_percent: 80,
            attack_ms: 20.0,
            decay_ms: 10.0,
            frequency_hz: 700.0,
        };
        let click = synthesize(&params, SAMPLE_RATE);
        assert_eq!(click.len(), (SAMPLE_RATE as f32 * 0.01) as usize);
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(SoundParams::accent_default().validate().is_ok());
        assert!(SoundParams::beat_default().validate().is_ok());
        assert!(SoundParams::subdivision_default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_envelope_overflow() {
        let params = SoundParams {
            duration_ms: 10.0,
            volume_percent: 50,
            attack_ms: 8.0,
            decay_ms: 8.0,
            frequency_hz: 700.0,
        };
        assert_eq!(
            params.validate(),
            Err(CommandError::EnvelopeExceedsDuration {
                attack_ms: 8.0,
                decay_ms: 8.0,
                duration_ms: 10.0,
            })
        );
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut params = SoundParams::beat_default();
        params.volume_percent = 101;
        assert!(params.validate().is_err());

        let mut params = SoundParams::beat_default();
        params.frequency_hz = 0.0;
        assert!(params.validate().is_err());

        let mut params = SoundParams::beat_default();
        params.attack_ms = -1.0;
        assert!(params.validate().is_err());
    }
}
