//! Audio output - cpal stream wiring
//!
//! Opens a mono-rendered output stream on the default device and hands every
//! callback block to [`PlaybackCore::render`]. The callback does no other
//! work beyond fanning the mono block out to the hardware channel count.

use cpal::traits::{DeviceTrait, HostTrait};
use std::sync::Arc;

use crate::audio::playback::PlaybackCore;
use crate::error::AudioError;

/// Build (but do not start) an output stream at the given sample rate.
pub fn build_output_stream(
    playback: Arc<PlaybackCore>,
    sample_rate: u32,
) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "No default output device found".to_string(),
        })?;

    let default_config =
        device
            .default_output_config()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Failed to get default output config: {:?}", e),
            })?;

    if default_config.sample_format() != cpal::SampleFormat::F32 {
        return Err(AudioError::StreamOpenFailed {
            reason: "Only F32 sample format is currently supported for output".to_string(),
        });
    }

    let stream_config = cpal::StreamConfig {
        channels: default_config.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = stream_config.channels as usize;

    let err_fn = |err| eprintln!("Output stream error: {}", err);

    // Scratch block reused across callbacks so the mono render target does
    // not allocate per block (it only grows if the host enlarges its block)
    let mut mono: Vec<f32> = Vec::new();

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                if channels == 1 {
                    playback.render(data);
                    return;
                }
                if mono.len() < frames {
                    mono.resize(frames, 0.0);
                }
                playback.render(&mut mono[..frames]);
                for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                    frame.fill(sample);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })?;

    Ok(stream)
}
