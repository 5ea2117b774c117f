//! Double-buffer playback core
//!
//! Holds the measure buffer currently being streamed ("active") and an
//! optional replacement prepared off the real-time path ("pending"). The
//! real-time callback consumes the active buffer block by block; at every
//! measure boundary it runs the automation hook and swaps in the pending
//! buffer if one is ready, otherwise the active buffer loops.
//!
//! Real-time contract for [`PlaybackCore::render`]:
//! - one short mutex acquisition, no allocation, no synthesis
//! - the automation hook only does arithmetic, atomic stores and a
//!   lock-free queue push
//! - any malformed state (empty buffer, poisoned lock) degrades to silence

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::program::{ProgramSegment, ProgramState};

/// Marker pushed to the rebuild worker; the worker snapshots current state
/// itself, so queued requests coalesce naturally.
#[derive(Debug, Clone, Copy)]
pub struct RebuildRequest;

struct Buffers {
    active: Vec<i16>,
    pending: Option<Vec<i16>>,
    playback_index: usize,
    measures_elapsed: u64,
    program: ProgramState,
    rebuild_tx: rtrb::Producer<RebuildRequest>,
}

/// Shared playback state: buffer pair and cursor under one mutex, tempo in
/// an atomic readable from any context.
pub struct PlaybackCore {
    buffers: Mutex<Buffers>,
    bpm: AtomicU32,
}

impl PlaybackCore {
    pub fn new(initial_bpm: u32, rebuild_tx: rtrb::Producer<RebuildRequest>) -> Self {
        Self {
            buffers: Mutex::new(Buffers {
                active: Vec::new(),
                pending: None,
                playback_index: 0,
                measures_elapsed: 0,
                program: ProgramState::new(),
                rebuild_tx,
            }),
            bpm: AtomicU32::new(initial_bpm),
        }
    }

    /// Current tempo in BPM.
    pub fn bpm(&self) -> u32 {
        self.bpm.load(Ordering::Relaxed)
    }

    /// Set the tempo. Takes effect at the next rebuilt measure.
    pub fn set_bpm(&self, bpm: u32) {
        self.bpm.store(bpm, Ordering::Relaxed);
    }

    /// Install a freshly synthesized measure as the pending buffer.
    ///
    /// Last write wins: a rebuild requested before the previous one was
    /// consumed silently replaces it.
    pub fn request_rebuild(&self, buffer: Vec<i16>) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.pending = Some(buffer);
        }
    }

    /// Install the first buffer and reset cursors for a fresh run.
    pub fn begin(&self, initial: Vec<i16>) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.active = initial;
            buffers.pending = None;
            buffers.playback_index = 0;
            buffers.measures_elapsed = 0;
        }
    }

    /// Stop transition: clear buffers, cursors and automation transients.
    /// The program segment list survives.
    pub fn reset(&self) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.active = Vec::new();
            buffers.pending = None;
            buffers.playback_index = 0;
            buffers.measures_elapsed = 0;
            buffers.program.reset();
        }
    }

    /// Real-time consumption step: fill `output` with the next block of
    /// mono samples.
    pub fn render(&self, output: &mut [f32]) {
        let Ok(mut buffers) = self.buffers.lock() else {
            output.fill(0.0);
            return;
        };

        let mut written = 0;
        while written < output.len() {
            if buffers.active.is_empty() {
                output[written..].fill(0.0);
                return;
            }

            if buffers.playback_index >= buffers.active.len() {
                // Measure boundary: automation first, so the tempo for the
                // upcoming measure is settled before its buffer is chosen
                let current_bar = buffers.measures_elapsed + 1;
                let b = &mut *buffers;
                if b.program.on_measure_boundary(current_bar, &self.bpm) {
                    let _ = b.rebuild_tx.push(RebuildRequest);
                }
                if let Some(pending) = buffers.pending.take() {
                    buffers.active = pending;
                }
                buffers.measures_elapsed += 1;
                buffers.playback_index = 0;
            }

            let remaining = buffers.active.len() - buffers.playback_index;
            let count = remaining.min(output.len() - written);
            let start = buffers.playback_index;
            for (dst, &src) in output[written..written + count]
                .iter_mut()
                .zip(buffers.active[start..start + count].iter())
            {
                *dst = src as f32 / 32767.0;
            }
            buffers.playback_index += count;
            written += count;
        }
    }

    /// Measures completed since playback began.
    pub fn measures_elapsed(&self) -> u64 {
        self.buffers
            .lock()
            .map(|buffers| buffers.measures_elapsed)
            .unwrap_or(0)
    }

    /// Whether the automation currently mutes output.
    pub fn is_muted(&self) -> bool {
        self.buffers
            .lock()
            .map(|buffers| buffers.program.is_muted())
            .unwrap_or(false)
    }

    /// Whether a tempo ramp is in progress.
    pub fn ramp_active(&self) -> bool {
        self.buffers
            .lock()
            .map(|buffers| buffers.program.ramp_active())
            .unwrap_or(false)
    }

    pub fn add_segment(&self, segment: ProgramSegment) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.program.add_segment(segment);
        }
    }

    pub fn remove_segment(&self, start_bar: u32) -> Result<(), crate::error::CommandError> {
        match self.buffers.lock() {
            Ok(mut buffers) => buffers.program.remove_segment(start_bar),
            Err(_) => Ok(()),
        }
    }

    pub fn set_segments(&self, segments: Vec<ProgramSegment>) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.program.set_segments(segments);
        }
    }

    pub fn clear_segments(&self) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.program.clear_segments();
        }
    }

    pub fn segments(&self) -> Vec<ProgramSegment> {
        self.buffers
            .lock()
            .map(|buffers| buffers.program.segments().to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_with_queue(bpm: u32) -> (PlaybackCore, rtrb::Consumer<RebuildRequest>) {
        let (tx, rx) = rtrb::RingBuffer::new(16);
        (PlaybackCore::new(bpm, tx), rx)
    }

    #[test]
    fn test_empty_active_buffer_renders_silence() {
        let (core, _rx) = core_with_queue(120);
        let mut out = vec![1.0f32; 256];
        core.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_active_buffer_loops_without_pending() {
        let (core, _rx) = core_with_queue(120);
        core.begin(vec![100, 200, 300, 400]);

        let mut out = vec![0.0f32; 8];
        core.render(&mut out);
        let expected: Vec<f32> = [100, 200, 300, 400, 100, 200, 300, 400]
            .iter()
            .map(|&v| v as f32 / 32767.0)
            .collect();
        assert_eq!(out, expected);
        assert_eq!(core.measures_elapsed(), 1);
    }

    #[test]
    fn test_pending_swap_waits_for_boundary() {
        let (core, _rx) = core_with_queue(120);
        core.begin(vec![1000; 6]);

        // Consume half a measure, then request a rebuild
        let mut out = vec![0.0f32; 3];
        core.render(&mut out);
        core.request_rebuild(vec![-2000; 4]);

        // Rest of the current measure still streams the old buffer
        let mut out = vec![0.0f32; 3];
        core.render(&mut out);
        assert!(out.iter().all(|&s| s > 0.0));

        // Next block crosses the boundary: new buffer takes over
        let mut out = vec![0.0f32; 4];
        core.render(&mut out);
        assert!(out.iter().all(|&s| s < 0.0));
        assert_eq!(core.measures_elapsed(), 1);
    }

    #[test]
    fn test_block_larger_than_measure() {
        let (core, _rx) = core_with_queue(120);
        core.begin(vec![500; 4]);
        let mut out = vec![0.0f32; 11];
        core.render(&mut out);
        assert!(out.iter().all(|&s| s > 0.0));
        // 11 samples over 4-sample measures: two full boundaries crossed
        assert_eq!(core.measures_elapsed(), 2);
    }

    #[test]
    fn test_boundary_pushes_rebuild_request_from_program() {
        let (core, mut rx) = core_with_queue(100);
        core.add_segment(ProgramSegment {
            start_bar: 1,
            end_bar: 1,
            target_bpm: 160,
            is_audible: true,
        });
        core.begin(vec![100; 4]);

        let mut out = vec![0.0f32; 5]; // crosses one boundary
        core.render(&mut out);

        assert!(rx.pop().is_ok(), "boundary should have queued a rebuild");
        assert_eq!(core.bpm(), 160);
    }

    #[test]
    fn test_reset_clears_cursor_and_transients() {
        let (core, _rx) = core_with_queue(100);
        core.add_segment(ProgramSegment {
            start_bar: 1,
            end_bar: 8,
            target_bpm: 200,
            is_audible: false,
        });
        core.begin(vec![100; 4]);
        let mut out = vec![0.0f32; 6];
        core.render(&mut out);
        assert!(core.ramp_active());
        assert!(core.is_muted());

        core.reset();
        assert_eq!(core.measures_elapsed(), 0);
        assert!(!core.ramp_active());
        assert!(!core.is_muted());
        assert_eq!(core.segments().len(), 1);

        let mut out = vec![1.0f32; 4];
        core.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
