// Error types for the clicktrack metronome
//
// This module defines custom error types for command validation, audio
// lifecycle, and preset persistence. Every error is recoverable at the point
// of the offending command; the real-time audio path has no error type at
// all and degrades to silence instead.

mod audio;
mod command;
mod preset;

pub use audio::{log_audio_error, AudioError};
pub use command::CommandError;
pub use preset::PresetError;
