//! Offline rendering - deterministic program playback without a device
//!
//! Simulates the playback loop measure by measure: render, then run the
//! same boundary transition the real-time path runs. The result is exactly
//! the audio the live engine would produce for the first N measures of a
//! program, which makes this both a WAV export path and a test harness for
//! the automation machine.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::audio::measure::{render_measure, TempoState, TimeSignature, VoiceSet};
use crate::error::AudioError;
use crate::program::{ProgramSegment, ProgramState};

/// Render the first `measures` bars of a program to a PCM sample vector.
pub fn render_program(
    initial_bpm: u32,
    signature: TimeSignature,
    subdivision_level: u8,
    voices: &VoiceSet,
    segments: &[ProgramSegment],
    measures: u32,
    sample_rate: u32,
) -> Vec<i16> {
    let bpm = AtomicU32::new(initial_bpm);
    let mut program = ProgramState::new();
    program.set_segments(segments.to_vec());

    let mut output = Vec::new();
    for measure in 0..measures as u64 {
        let tempo = TempoState {
            bpm: bpm.load(Ordering::Relaxed),
            signature,
            subdivision_level,
        };
        output.extend(render_measure(
            &tempo,
            voices,
            program.is_muted(),
            sample_rate,
        ));
        // Same boundary numbering as live playback: bar N is evaluated
        // when its measure completes
        program.on_measure_boundary(measure + 1, &bpm);
    }
    output
}

/// Write mono 16-bit PCM samples to a WAV file.
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: &[i16],
    sample_rate: u32,
) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path.as_ref(), spec).map_err(|e| AudioError::WavWriteFailed {
            reason: e.to_string(),
        })?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| AudioError::WavWriteFailed {
                reason: e.to_string(),
            })?;
    }
    writer.finalize().map_err(|e| AudioError::WavWriteFailed {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44100;

    fn spm(bpm: u32, signature: TimeSignature) -> usize {
        TempoState {
            bpm,
            signature,
            subdivision_level: 0,
        }
        .samples_per_measure(SAMPLE_RATE)
    }

    #[test]
    fn test_constant_tempo_length() {
        let voices = VoiceSet::default();
        let signature = TimeSignature::FOUR_FOUR;
        let audio = render_program(120, signature, 0, &voices, &[], 4, SAMPLE_RATE);
        assert_eq!(audio.len(), 4 * spm(120, signature));
    }

    #[test]
    fn test_ramp_changes_measure_lengths() {
        // 100 -> 140 over bars 1-5: bar evaluated at its end, so the first
        // measure plays at 100 and each later one at the ramped tempo
        let voices = VoiceSet::default();
        let signature = TimeSignature::FOUR_FOUR;
        let segments = [ProgramSegment {
            start_bar: 1,
            end_bar: 5,
            target_bpm: 140,
            is_audible: true,
        }];
        let audio = render_program(100, signature, 0, &voices, &segments, 6, SAMPLE_RATE);

        // Bar N is evaluated as its measure completes, so the tempo it
        // computes is heard one measure later: 100, 100, 110, 120, 130, 140
        let expected: usize = [100, 100, 110, 120, 130, 140]
            .iter()
            .map(|&bpm| spm(bpm, signature))
            .sum();
        assert_eq!(audio.len(), expected);
    }

    #[test]
    fn test_muted_section_is_silent() {
        let voices = VoiceSet::default();
        let signature = TimeSignature::FOUR_FOUR;
        let segments = [ProgramSegment {
            start_bar: 1,
            end_bar: 1,
            target_bpm: 120,
            is_audible: false,
        }];
        let audio = render_program(120, signature, 0, &voices, &segments, 3, SAMPLE_RATE);

        let measure = spm(120, signature);
        // Bar 1 still audible (its boundary runs at its end); bars 2-3 muted
        assert!(audio[..measure].iter().any(|&s| s != 0));
        assert!(audio[measure..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_wav_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples: Vec<i16> = (0..1000).map(|i| (i % 128) as i16).collect();
        write_wav(&path, &samples, SAMPLE_RATE).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        let back: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(back, samples);
    }
}
