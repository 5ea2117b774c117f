// Audio module - click synthesis, measure rendering and real-time playback

pub mod click;
pub mod measure;
pub mod output;
pub mod playback;

// Re-export commonly used types for convenience
pub use click::{synthesize, SoundParams};
pub use measure::{render_measure, TempoState, TimeSignature, VoiceSet};
pub use playback::{PlaybackCore, RebuildRequest};
