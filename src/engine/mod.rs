//! MetronomeEngine - engine facade and rebuild worker
//!
//! Owns the playback core, the render configuration and the output stream,
//! and exposes every mutator the command shell needs. All mutators validate
//! before touching state and synthesize replacement measures in the calling
//! (control) context; the rebuild worker thread does the same for rebuilds
//! requested by the automation boundary hook, so the real-time callback
//! never synthesizes anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;

use cpal::traits::StreamTrait;
use log::info;

use crate::audio::click::SoundParams;
use crate::audio::measure::{render_measure, TempoState, TimeSignature, VoiceSet};
use crate::audio::output::build_output_stream;
use crate::audio::playback::{PlaybackCore, RebuildRequest};
use crate::error::{log_audio_error, AudioError, CommandError};
use crate::preset::PresetState;
use crate::program::ProgramSegment;

/// Default output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44100;

/// Default tempo after construction and factory reset.
pub const DEFAULT_BPM: u32 = 120;

const BPM_MIN: u32 = 5;
const BPM_MAX: u32 = 1000;

/// Capacity of the boundary-hook-to-worker rebuild queue. Requests
/// coalesce, so a small queue is plenty.
const REBUILD_QUEUE_CAPACITY: usize = 64;

/// The three metronome voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voice {
    Accent,
    Beat,
    Subdivision,
}

/// Mutable fields of a voice's sound parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundParam {
    DurationMs,
    VolumePercent,
    AttackMs,
    DecayMs,
    FrequencyHz,
}

/// Render configuration read by every synthesis site. Tempo itself lives in
/// the playback core's atomic so the automation hook can update it.
#[derive(Debug, Clone)]
struct RenderConfig {
    signature: TimeSignature,
    subdivision_level: u8,
    voices: VoiceSet,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            signature: TimeSignature::FOUR_FOUR,
            subdivision_level: 0,
            voices: VoiceSet::default(),
        }
    }
}

/// Read-only snapshot for status display.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub bpm: u32,
    pub signature: TimeSignature,
    pub subdivision_level: u8,
    pub voices: VoiceSet,
    pub running: bool,
    pub muted: bool,
    pub ramp_active: bool,
    pub measures_elapsed: u64,
    pub segments: Vec<ProgramSegment>,
}

/// Engine facade: playback core + render config + output stream + worker.
pub struct MetronomeEngine {
    playback: Arc<PlaybackCore>,
    config: Arc<RwLock<RenderConfig>>,
    sample_rate: u32,
    running: AtomicBool,
    stream: Option<cpal::Stream>,
    worker_shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MetronomeEngine {
    /// Create an engine with factory defaults and spawn its rebuild worker.
    pub fn new(sample_rate: u32) -> Self {
        let (rebuild_tx, rebuild_rx) = rtrb::RingBuffer::new(REBUILD_QUEUE_CAPACITY);
        let playback = Arc::new(PlaybackCore::new(DEFAULT_BPM, rebuild_tx));
        let config = Arc::new(RwLock::new(RenderConfig::default()));
        let worker_shutdown = Arc::new(AtomicBool::new(false));

        let worker = spawn_rebuild_worker(
            rebuild_rx,
            Arc::clone(&playback),
            Arc::clone(&config),
            sample_rate,
            Arc::clone(&worker_shutdown),
        );

        Self {
            playback,
            config,
            sample_rate,
            running: AtomicBool::new(false),
            stream: None,
            worker_shutdown,
            worker: Some(worker),
        }
    }

    /// Shared handle to the playback core (for driving the render step from
    /// an external output facility or from tests).
    pub fn playback_handle(&self) -> Arc<PlaybackCore> {
        Arc::clone(&self.playback)
    }

    /// Synthesize one measure from the current configuration.
    pub fn render_current_measure(&self) -> Vec<i16> {
        render_snapshot(&self.playback, &self.config, self.sample_rate)
    }

    /// Start playback: render the first measure, open and play the stream.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }

        let initial = self.render_current_measure();
        self.playback.begin(initial);

        let stream = build_output_stream(Arc::clone(&self.playback), self.sample_rate)
            .inspect_err(|err| log_audio_error(err, "start"))?;
        stream.play().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to start output stream: {}", e),
        })?;

        self.stream = Some(stream);
        self.running.store(true, Ordering::SeqCst);
        info!("[Engine] Playback started at {} BPM", self.playback.bpm());
        Ok(())
    }

    /// Stop playback and reset cursors, counters and automation transients.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AudioError::NotRunning);
        }

        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        self.playback.reset();
        self.running.store(false, Ordering::SeqCst);
        info!("[Engine] Playback stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Set the tempo. Rejected while a ramp is driving it and playback is
    /// running. Takes effect at the next measure boundary.
    pub fn set_bpm(&self, bpm: u32) -> Result<(), CommandError> {
        if !(BPM_MIN..=BPM_MAX).contains(&bpm) {
            return Err(CommandError::BpmOutOfRange { bpm });
        }
        // Stop clears ramps, so an active ramp always means live playback
        if self.playback.ramp_active() {
            return Err(CommandError::TempoLockedByRamp);
        }
        self.playback.set_bpm(bpm);
        self.rebuild();
        Ok(())
    }

    pub fn bpm(&self) -> u32 {
        self.playback.bpm()
    }

    /// Set the time signature. Takes effect at the next measure boundary.
    pub fn set_time_signature(&self, numerator: u8, denominator: u8) -> Result<(), CommandError> {
        let signature = TimeSignature::new(numerator, denominator)?;
        write_config(&self.config).signature = signature;
        self.rebuild();
        Ok(())
    }

    /// Set the subdivision level: 0 (off), 2, 4 or 8 clicks per beat.
    pub fn set_subdivision(&self, level: u8) -> Result<(), CommandError> {
        if !matches!(level, 0 | 2 | 4 | 8) {
            return Err(CommandError::InvalidSubdivision { level });
        }
        write_config(&self.config).subdivision_level = level;
        self.rebuild();
        Ok(())
    }

    /// Update one field of one voice's sound parameters.
    ///
    /// The per-voice envelope invariant and the cross-voice subdivision
    /// limits are checked against the candidate value; a rejected update
    /// leaves every parameter unchanged.
    pub fn set_sound_param(
        &self,
        voice: Voice,
        param: SoundParam,
        value: f32,
    ) -> Result<(), CommandError> {
        let mut config = write_config(&self.config);

        let current = match voice {
            Voice::Accent => config.voices.accent,
            Voice::Beat => config.voices.beat,
            Voice::Subdivision => config.voices.subdivision,
        };
        let mut candidate = current;
        match param {
            SoundParam::DurationMs => candidate.duration_ms = value,
            SoundParam::VolumePercent => {
                if !(0.0..=100.0).contains(&value) {
                    return Err(CommandError::VolumeOutOfRange { volume: value });
                }
                candidate.volume_percent = value.round() as u8;
            }
            SoundParam::AttackMs => candidate.attack_ms = value,
            SoundParam::DecayMs => candidate.decay_ms = value,
            SoundParam::FrequencyHz => candidate.frequency_hz = value,
        }
        candidate.validate()?;

        // The subdivision click must stay strictly quieter and shorter than
        // both main voices
        if voice == Voice::Subdivision {
            let volume_limit = config
                .voices
                .accent
                .volume_percent
                .min(config.voices.beat.volume_percent);
            if candidate.volume_percent >= volume_limit {
                return Err(CommandError::SubdivisionTooLoud {
                    volume: candidate.volume_percent,
                    limit: volume_limit,
                });
            }
            let duration_limit = config
                .voices
                .accent
                .duration_ms
                .min(config.voices.beat.duration_ms);
            if candidate.duration_ms >= duration_limit {
                return Err(CommandError::SubdivisionTooLong {
                    duration_ms: candidate.duration_ms,
                    limit_ms: duration_limit,
                });
            }
        }

        match voice {
            Voice::Accent => config.voices.accent = candidate,
            Voice::Beat => config.voices.beat = candidate,
            Voice::Subdivision => config.voices.subdivision = candidate,
        }
        drop(config);
        self.rebuild();
        Ok(())
    }

    /// Add a program segment (replacing any segment with the same start
    /// bar). Takes effect at the next boundary evaluation.
    pub fn add_segment(&self, segment: ProgramSegment) -> Result<(), CommandError> {
        segment.validate()?;
        self.playback.add_segment(segment);
        Ok(())
    }

    /// Remove the program segment starting at `start_bar`.
    pub fn remove_segment(&self, start_bar: u32) -> Result<(), CommandError> {
        self.playback.remove_segment(start_bar)
    }

    pub fn segments(&self) -> Vec<ProgramSegment> {
        self.playback.segments()
    }

    /// Restore factory defaults: tempo, signature, subdivision, voices and
    /// an empty program.
    pub fn reset_to_defaults(&self) {
        *write_config(&self.config) = RenderConfig::default();
        self.playback.set_bpm(DEFAULT_BPM);
        self.playback.clear_segments();
        self.rebuild();
        info!("[Engine] Factory defaults restored");
    }

    /// Capture the complete current state for persistence.
    pub fn capture_state(&self) -> PresetState {
        let config = read_config(&self.config);
        PresetState {
            bpm: self.playback.bpm(),
            time_signature: config.signature.to_string(),
            subdivision_level: config.subdivision_level,
            accent: config.voices.accent,
            beat: config.voices.beat,
            subdivision: config.voices.subdivision,
            program: self.playback.segments(),
        }
    }

    /// Apply a persisted state. Everything is validated before anything is
    /// written, so a rejected state leaves the engine untouched. Counts as
    /// a manual tempo change for the ramp guard.
    pub fn apply_state(&self, state: &PresetState) -> Result<(), CommandError> {
        let signature: TimeSignature = state.time_signature.parse()?;
        if !(BPM_MIN..=BPM_MAX).contains(&state.bpm) {
            return Err(CommandError::BpmOutOfRange { bpm: state.bpm });
        }
        if !matches!(state.subdivision_level, 0 | 2 | 4 | 8) {
            return Err(CommandError::InvalidSubdivision {
                level: state.subdivision_level,
            });
        }
        state.accent.validate()?;
        state.beat.validate()?;
        state.subdivision.validate()?;
        let volume_limit = state.accent.volume_percent.min(state.beat.volume_percent);
        if state.subdivision.volume_percent >= volume_limit {
            return Err(CommandError::SubdivisionTooLoud {
                volume: state.subdivision.volume_percent,
                limit: volume_limit,
            });
        }
        let duration_limit = state.accent.duration_ms.min(state.beat.duration_ms);
        if state.subdivision.duration_ms >= duration_limit {
            return Err(CommandError::SubdivisionTooLong {
                duration_ms: state.subdivision.duration_ms,
                limit_ms: duration_limit,
            });
        }
        for segment in &state.program {
            segment.validate()?;
        }
        if self.playback.ramp_active() {
            return Err(CommandError::TempoLockedByRamp);
        }

        {
            let mut config = write_config(&self.config);
            config.signature = signature;
            config.subdivision_level = state.subdivision_level;
            config.voices = VoiceSet {
                accent: state.accent,
                beat: state.beat,
                subdivision: state.subdivision,
            };
        }
        self.playback.set_bpm(state.bpm);
        self.playback.set_segments(state.program.clone());
        self.rebuild();
        Ok(())
    }

    /// Snapshot for status display.
    pub fn status(&self) -> EngineStatus {
        let config = read_config(&self.config);
        EngineStatus {
            bpm: self.playback.bpm(),
            signature: config.signature,
            subdivision_level: config.subdivision_level,
            voices: config.voices,
            running: self.is_running(),
            muted: self.playback.is_muted(),
            ramp_active: self.playback.ramp_active(),
            measures_elapsed: self.playback.measures_elapsed(),
            segments: self.playback.segments(),
        }
    }

    /// Synthesize a measure from current state and hand it to the playback
    /// core as the pending buffer.
    fn rebuild(&self) {
        let buffer = self.render_current_measure();
        self.playback.request_rebuild(buffer);
    }

    /// One voice's current parameters.
    pub fn voice_params(&self, voice: Voice) -> SoundParams {
        let config = read_config(&self.config);
        match voice {
            Voice::Accent => config.voices.accent,
            Voice::Beat => config.voices.beat,
            Voice::Subdivision => config.voices.subdivision,
        }
    }
}

impl Drop for MetronomeEngine {
    fn drop(&mut self) {
        self.worker_shutdown.store(true, Ordering::SeqCst);
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn read_config(config: &RwLock<RenderConfig>) -> std::sync::RwLockReadGuard<'_, RenderConfig> {
    config.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_config(config: &RwLock<RenderConfig>) -> std::sync::RwLockWriteGuard<'_, RenderConfig> {
    config
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Render one measure from the shared state. Used by control-context
/// mutators and the rebuild worker; never by the real-time callback.
fn render_snapshot(
    playback: &PlaybackCore,
    config: &RwLock<RenderConfig>,
    sample_rate: u32,
) -> Vec<i16> {
    let (signature, subdivision_level, voices) = {
        let config = read_config(config);
        (config.signature, config.subdivision_level, config.voices)
    };
    let tempo = TempoState {
        bpm: playback.bpm(),
        signature,
        subdivision_level,
    };
    render_measure(&tempo, &voices, playback.is_muted(), sample_rate)
}

/// Worker consuming rebuild requests queued by the automation boundary
/// hook. Synthesis happens here, outside every lock the real-time path
/// takes.
fn spawn_rebuild_worker(
    mut rebuild_rx: rtrb::Consumer<RebuildRequest>,
    playback: Arc<PlaybackCore>,
    config: Arc<RwLock<RenderConfig>>,
    sample_rate: u32,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        tracing::debug!("[RebuildWorker] Worker started");
        loop {
            match rebuild_rx.pop() {
                Ok(RebuildRequest) => {
                    // Drain the queue: every queued request would render the
                    // same snapshot, so only one synthesis is needed
                    while rebuild_rx.pop().is_ok() {}
                    let buffer = render_snapshot(&playback, &config, sample_rate);
                    playback.request_rebuild(buffer);
                }
                Err(_) => {
                    if shutdown.load(Ordering::SeqCst) {
                        tracing::debug!("[RebuildWorker] Shutdown flag set, exiting");
                        break;
                    }
                    // Small sleep to avoid a busy loop when idle
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MetronomeEngine {
        MetronomeEngine::new(SAMPLE_RATE)
    }

    #[test]
    fn test_defaults() {
        let engine = engine();
        let status = engine.status();
        assert_eq!(status.bpm, 120);
        assert_eq!(status.signature, TimeSignature::FOUR_FOUR);
        assert_eq!(status.subdivision_level, 0);
        assert!(!status.running);
        assert!(status.segments.is_empty());
    }

    #[test]
    fn test_set_bpm_validation() {
        let engine = engine();
        assert!(engine.set_bpm(4).is_err());
        assert!(engine.set_bpm(1001).is_err());
        assert!(engine.set_bpm(5).is_ok());
        assert!(engine.set_bpm(1000).is_ok());
        assert_eq!(engine.bpm(), 1000);
    }

    #[test]
    fn test_set_time_signature_validation() {
        let engine = engine();
        assert!(engine.set_time_signature(7, 8).is_ok());
        assert!(engine.set_time_signature(0, 4).is_err());
        assert!(engine.set_time_signature(33, 4).is_err());
        assert!(engine.set_time_signature(4, 5).is_err());
        assert_eq!(engine.status().signature.to_string(), "7/8");
    }

    #[test]
    fn test_set_subdivision_validation() {
        let engine = engine();
        assert!(engine.set_subdivision(2).is_ok());
        assert!(engine.set_subdivision(0).is_ok());
        assert!(engine.set_subdivision(3).is_err());
        assert!(engine.set_subdivision(16).is_err());
    }

    #[test]
    fn test_sound_param_envelope_rejected() {
        let engine = engine();
        // Beat defaults: duration 40, attack 5, decay 12: attack of 30
        // would overflow the envelope
        let err = engine
            .set_sound_param(Voice::Beat, SoundParam::AttackMs, 30.0)
            .unwrap_err();
        assert!(matches!(err, CommandError::EnvelopeExceedsDuration { .. }));
        // Unchanged on rejection
        assert_eq!(engine.voice_params(Voice::Beat).attack_ms, 5.0);
    }

    #[test]
    fn test_subdivision_volume_must_stay_below_main_voices() {
        let engine = engine();
        // Beat volume is 35: subdivision at 35 is rejected, 34 accepted
        let err = engine
            .set_sound_param(Voice::Subdivision, SoundParam::VolumePercent, 35.0)
            .unwrap_err();
        assert!(matches!(err, CommandError::SubdivisionTooLoud { .. }));
        assert_eq!(engine.voice_params(Voice::Subdivision).volume_percent, 15);

        assert!(engine
            .set_sound_param(Voice::Subdivision, SoundParam::VolumePercent, 34.0)
            .is_ok());
    }

    #[test]
    fn test_subdivision_duration_must_stay_below_main_voices() {
        let engine = engine();
        // Beat duration is 40ms
        let err = engine
            .set_sound_param(Voice::Subdivision, SoundParam::DurationMs, 40.0)
            .unwrap_err();
        assert!(matches!(err, CommandError::SubdivisionTooLong { .. }));
    }

    #[test]
    fn test_add_segment_validation() {
        let engine = engine();
        assert!(engine
            .add_segment(ProgramSegment {
                start_bar: 0,
                end_bar: 4,
                target_bpm: 120,
                is_audible: true,
            })
            .is_err());
        assert!(engine
            .add_segment(ProgramSegment {
                start_bar: 2,
                end_bar: 6,
                target_bpm: 150,
                is_audible: true,
            })
            .is_ok());
        assert_eq!(engine.segments().len(), 1);
        assert!(engine.remove_segment(2).is_ok());
        assert!(engine.remove_segment(2).is_err());
    }

    #[test]
    fn test_capture_apply_roundtrip() {
        let engine = engine();
        engine.set_bpm(93).unwrap();
        engine.set_time_signature(5, 8).unwrap();
        engine.set_subdivision(4).unwrap();
        engine
            .add_segment(ProgramSegment {
                start_bar: 3,
                end_bar: 9,
                target_bpm: 140,
                is_audible: false,
            })
            .unwrap();

        let state = engine.capture_state();

        let other = MetronomeEngine::new(SAMPLE_RATE);
        other.apply_state(&state).unwrap();
        assert_eq!(other.capture_state(), state);
    }

    #[test]
    fn test_apply_state_rejects_invalid_without_mutation() {
        let engine = engine();
        let mut state = engine.capture_state();
        state.bpm = 2000;
        assert!(engine.apply_state(&state).is_err());
        assert_eq!(engine.bpm(), 120);

        let mut state = engine.capture_state();
        state.time_signature = "4/7".to_string();
        assert!(engine.apply_state(&state).is_err());
        assert_eq!(engine.status().signature, TimeSignature::FOUR_FOUR);
    }

    #[test]
    fn test_reset_to_defaults() {
        let engine = engine();
        engine.set_bpm(200).unwrap();
        engine.set_subdivision(8).unwrap();
        engine
            .add_segment(ProgramSegment {
                start_bar: 1,
                end_bar: 2,
                target_bpm: 90,
                is_audible: true,
            })
            .unwrap();

        engine.reset_to_defaults();
        let status = engine.status();
        assert_eq!(status.bpm, DEFAULT_BPM);
        assert_eq!(status.subdivision_level, 0);
        assert!(status.segments.is_empty());
        assert_eq!(status.voices, VoiceSet::default());
    }

    #[test]
    fn test_render_current_measure_length_tracks_tempo() {
        let engine = engine();
        engine.set_bpm(60).unwrap();
        let slow = engine.render_current_measure();
        engine.set_bpm(120).unwrap();
        let fast = engine.render_current_measure();
        assert_eq!(slow.len(), fast.len() * 2);
    }

    #[test]
    fn test_stop_without_start_fails() {
        let mut engine = engine();
        assert_eq!(engine.stop(), Err(AudioError::NotRunning));
    }
}
