// Audio lifecycle error types

use log::error;
use std::fmt;

/// Audio-related errors
///
/// These cover engine lifecycle (start/stop) and output stream management.
/// The real-time render path itself never produces an error; underruns and
/// poisoned locks degrade to silence there.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Audio engine is already running
    AlreadyRunning,

    /// Audio engine is not running
    NotRunning,

    /// Failed to open the output stream
    StreamOpenFailed { reason: String },

    /// Hardware error while starting or stopping a stream
    HardwareError { details: String },

    /// Failed to write a rendered WAV file
    WavWriteFailed { reason: String },
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::AlreadyRunning => {
                write!(f, "metronome already running; stop it first")
            }
            AudioError::NotRunning => {
                write!(f, "metronome not running; start it first")
            }
            AudioError::StreamOpenFailed { reason } => {
                write!(f, "failed to open audio stream: {}", reason)
            }
            AudioError::HardwareError { details } => {
                write!(f, "hardware error: {}", details)
            }
            AudioError::WavWriteFailed { reason } => {
                write!(f, "failed to write WAV file: {}", reason)
            }
        }
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}

/// Log an audio error with the context it occurred in.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!("Audio error in {}: {}", context, err);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert!(AudioError::AlreadyRunning.to_string().contains("already"));
        assert!(AudioError::NotRunning.to_string().contains("not running"));

        let err = AudioError::StreamOpenFailed {
            reason: "no device".to_string(),
        };
        assert!(err.to_string().contains("no device"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::other("test io error");
        let audio_err: AudioError = io_err.into();
        match audio_err {
            AudioError::HardwareError { details } => {
                assert!(details.contains("test io error"));
            }
            _ => panic!("Expected HardwareError"),
        }
    }
}
