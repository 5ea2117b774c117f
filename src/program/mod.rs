//! Program automation - tempo ramps and muted sections across measures
//!
//! A program is an ordered list of measure-range segments, each with a
//! target tempo and an audible flag. The state machine runs once per
//! measure boundary, inside the real-time render path, and therefore does
//! nothing but bookkeeping: it scans the segment list, advances the active
//! ramp, stores the next measure's tempo into the shared atomic, and tells
//! the caller whether a buffer rebuild is needed. Synthesis itself always
//! happens elsewhere.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::CommandError;

/// One program segment: from `start_bar`, ramp (or snap) to `target_bpm`
/// by `end_bar`, audible or muted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSegment {
    /// First bar the segment applies to (1-based)
    pub start_bar: u32,
    /// Last bar of the tempo ramp; equal to `start_bar` for an instant snap
    pub end_bar: u32,
    /// Tempo reached at `end_bar`
    pub target_bpm: u32,
    /// False renders the segment's measures as silence
    pub is_audible: bool,
}

impl ProgramSegment {
    /// Check the segment invariants: `0 < start_bar <= end_bar`, positive
    /// target tempo.
    pub fn validate(&self) -> Result<(), CommandError> {
        if self.start_bar == 0 || self.end_bar < self.start_bar {
            return Err(CommandError::InvalidSegmentRange {
                start_bar: self.start_bar,
                end_bar: self.end_bar,
            });
        }
        if self.target_bpm == 0 {
            return Err(CommandError::InvalidSegmentBpm {
                target_bpm: self.target_bpm,
            });
        }
        Ok(())
    }
}

/// In-progress linear tempo ramp.
#[derive(Debug, Clone, PartialEq)]
struct RampState {
    initial_bpm: f64,
    increment_per_measure: f64,
    segment_index: usize,
}

/// Automation state advanced once per measure boundary.
///
/// The segment list is kept sorted ascending by `start_bar` and unique on
/// `start_bar`. Ranges may overlap; the last segment whose `start_bar` is at
/// or before the current bar wins.
#[derive(Debug, Default)]
pub struct ProgramState {
    segments: Vec<ProgramSegment>,
    ramp: Option<RampState>,
    active_index: Option<usize>,
    muted: bool,
}

impl ProgramState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a segment, replacing any existing segment with the same
    /// `start_bar`, keeping the list sorted.
    pub fn add_segment(&mut self, segment: ProgramSegment) {
        self.segments.retain(|s| s.start_bar != segment.start_bar);
        let pos = self
            .segments
            .partition_point(|s| s.start_bar < segment.start_bar);
        self.segments.insert(pos, segment);
    }

    /// Remove the segment starting at `start_bar`.
    pub fn remove_segment(&mut self, start_bar: u32) -> Result<(), CommandError> {
        let before = self.segments.len();
        self.segments.retain(|s| s.start_bar != start_bar);
        if self.segments.len() == before {
            return Err(CommandError::SegmentNotFound { start_bar });
        }
        Ok(())
    }

    /// Replace the whole segment list (preset load).
    pub fn set_segments(&mut self, mut segments: Vec<ProgramSegment>) {
        segments.sort_by_key(|s| s.start_bar);
        segments.dedup_by_key(|s| s.start_bar);
        self.segments = segments;
    }

    pub fn segments(&self) -> &[ProgramSegment] {
        &self.segments
    }

    pub fn clear_segments(&mut self) {
        self.segments.clear();
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn ramp_active(&self) -> bool {
        self.ramp.is_some()
    }

    /// Explicit stop transition: drop the ramp, the mute override and the
    /// active segment. The segment list itself survives.
    pub fn reset(&mut self) {
        self.ramp = None;
        self.active_index = None;
        self.muted = false;
    }

    /// Run the boundary transition for `current_bar`.
    ///
    /// Stores any tempo change into `bpm` and returns true when the next
    /// measure needs a rebuilt buffer (tempo, mute or segment change).
    pub fn on_measure_boundary(&mut self, current_bar: u64, bpm: &AtomicU32) -> bool {
        let mut rebuild = false;

        // Last segment whose start_bar <= current_bar wins; the list is
        // sorted, so counting the qualifying prefix finds it.
        let qualifying = self
            .segments
            .iter()
            .take_while(|s| s.start_bar as u64 <= current_bar)
            .count();
        let next_index = qualifying.checked_sub(1);

        if next_index != self.active_index {
            self.active_index = next_index;
            match next_index {
                Some(index) => {
                    let segment = self.segments[index];
                    self.muted = !segment.is_audible;
                    let current_bpm = bpm.load(Ordering::Relaxed);
                    if segment.end_bar > segment.start_bar {
                        self.ramp = Some(RampState {
                            initial_bpm: current_bpm as f64,
                            increment_per_measure: (segment.target_bpm as f64
                                - current_bpm as f64)
                                / (segment.end_bar - segment.start_bar) as f64,
                            segment_index: index,
                        });
                    } else {
                        self.ramp = None;
                        bpm.store(segment.target_bpm, Ordering::Relaxed);
                    }
                    rebuild = true;
                }
                None => {
                    self.ramp = None;
                    self.muted = false;
                    rebuild = true;
                }
            }
        }

        if let Some(ramp) = self.ramp.clone() {
            // A list edit can invalidate the index mid-ramp; drop the ramp
            // rather than indexing out of bounds on the real-time path.
            if ramp.segment_index >= self.segments.len() {
                self.ramp = None;
                return rebuild;
            }
            let segment = self.segments[ramp.segment_index];
            if current_bar <= segment.end_bar as u64 {
                let new_bpm = (ramp.initial_bpm
                    + ramp.increment_per_measure * (current_bar as f64 - segment.start_bar as f64))
                    .round() as u32;
                bpm.store(new_bpm, Ordering::Relaxed);
                rebuild = true;
            } else {
                bpm.store(segment.target_bpm, Ordering::Relaxed);
                if !segment.is_audible {
                    self.muted = false;
                }
                self.ramp = None;
                rebuild = true;
            }
        }

        rebuild
    }
}
