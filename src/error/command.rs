// Command validation errors
//
// Every mutator validates its input before touching engine state; a
// CommandError therefore always means "nothing changed".

use std::fmt;

/// Errors returned by engine mutators when a command is rejected.
///
/// Validation happens before any state mutation, so the engine is left
/// exactly as it was when one of these is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// BPM outside the supported range [5, 1000]
    BpmOutOfRange { bpm: u32 },

    /// Time signature numerator must be 1-32, denominator one of 2/4/8/16/32
    InvalidTimeSignature { numerator: u8, denominator: u8 },

    /// Subdivision level must be 0, 2, 4 or 8
    InvalidSubdivision { level: u8 },

    /// Volume must be 0-100 percent
    VolumeOutOfRange { volume: f32 },

    /// Duration and frequency must be positive, attack/decay non-negative
    NonPositiveParameter { name: &'static str },

    /// Attack + decay may not exceed the click duration
    EnvelopeExceedsDuration {
        attack_ms: f32,
        decay_ms: f32,
        duration_ms: f32,
    },

    /// Subdivision volume must stay strictly below both accent and beat
    SubdivisionTooLoud { volume: u8, limit: u8 },

    /// Subdivision duration must stay strictly below both accent and beat
    SubdivisionTooLong { duration_ms: f32, limit_ms: f32 },

    /// Program segment bars must satisfy 0 < start_bar <= end_bar
    InvalidSegmentRange { start_bar: u32, end_bar: u32 },

    /// Program segment target tempo must be positive
    InvalidSegmentBpm { target_bpm: u32 },

    /// No program segment starts at the given bar
    SegmentNotFound { start_bar: u32 },

    /// Manual tempo changes are rejected while a ramp is running
    TempoLockedByRamp,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::BpmOutOfRange { bpm } => {
                write!(f, "BPM {} out of range (5-1000)", bpm)
            }
            CommandError::InvalidTimeSignature {
                numerator,
                denominator,
            } => {
                write!(
                    f,
                    "invalid time signature {}/{}: numerator 1-32, denominator 2/4/8/16/32",
                    numerator, denominator
                )
            }
            CommandError::InvalidSubdivision { level } => {
                write!(f, "invalid subdivision level {} (use 0, 2, 4 or 8)", level)
            }
            CommandError::VolumeOutOfRange { volume } => {
                write!(f, "volume {} out of range (0-100)", volume)
            }
            CommandError::NonPositiveParameter { name } => {
                write!(f, "{} must be positive", name)
            }
            CommandError::EnvelopeExceedsDuration {
                attack_ms,
                decay_ms,
                duration_ms,
            } => {
                write!(
                    f,
                    "attack {}ms + decay {}ms exceeds click duration {}ms",
                    attack_ms, decay_ms, duration_ms
                )
            }
            CommandError::SubdivisionTooLoud { volume, limit } => {
                write!(
                    f,
                    "subdivision volume {} must be below accent and beat (limit {})",
                    volume, limit
                )
            }
            CommandError::SubdivisionTooLong {
                duration_ms,
                limit_ms,
            } => {
                write!(
                    f,
                    "subdivision duration {}ms must be below accent and beat (limit {}ms)",
                    duration_ms, limit_ms
                )
            }
            CommandError::InvalidSegmentRange { start_bar, end_bar } => {
                write!(
                    f,
                    "invalid segment range {}-{}: need 0 < start <= end",
                    start_bar, end_bar
                )
            }
            CommandError::InvalidSegmentBpm { target_bpm } => {
                write!(f, "segment target BPM {} must be positive", target_bpm)
            }
            CommandError::SegmentNotFound { start_bar } => {
                write!(f, "no program segment starts at bar {}", start_bar)
            }
            CommandError::TempoLockedByRamp => {
                write!(f, "tempo is controlled by an active ramp; stop playback first")
            }
        }
    }
}

impl std::error::Error for CommandError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = CommandError::BpmOutOfRange { bpm: 1200 };
        assert!(err.to_string().contains("1200"));

        let err = CommandError::InvalidTimeSignature {
            numerator: 0,
            denominator: 3,
        };
        assert!(err.to_string().contains("0/3"));

        let err = CommandError::EnvelopeExceedsDuration {
            attack_ms: 30.0,
            decay_ms: 50.0,
            duration_ms: 40.0,
        };
        assert!(err.to_string().contains("40"));

        let err = CommandError::TempoLockedByRamp;
        assert!(err.to_string().contains("ramp"));
    }
}
