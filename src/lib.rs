// Clicktrack Core - programmable metronome engine
// Real-time click playback with measure-boundary tempo automation

// Module declarations
pub mod audio;
pub mod engine;
pub mod error;
pub mod offline;
pub mod preset;
pub mod program;

// Re-exports for convenience
pub use audio::{PlaybackCore, SoundParams, TempoState, TimeSignature, VoiceSet};
pub use engine::{MetronomeEngine, SoundParam, Voice, DEFAULT_BPM, SAMPLE_RATE};
pub use preset::{PresetState, PresetStore};
pub use program::ProgramSegment;
