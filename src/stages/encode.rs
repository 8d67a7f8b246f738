//! Stage 1: Sequence Encoder
//!
//! Turns a [`NoteSequence`] into a `[n, 2]` feature table: the time since the
//! previous note and the note's quantized velocity bin.

use crate::config::{DeltaMode, EncodingConfig, VelocityPolicy, MAX_NUM_BINS};
use crate::error::{MidiVelError, Result};
use crate::sequence::{NoteSequence, MAX_MIDI_VELOCITY};
use ndarray::{Array2, ArrayView2};

/// Number of feature columns per note
pub const FEATURE_WIDTH: usize = 2;
/// Column holding the time delta in seconds
pub const TIME_DELTA_COL: usize = 0;
/// Column holding the velocity bin
pub const VELOCITY_BIN_COL: usize = 1;
/// Column names in persisted order
pub const FEATURE_NAMES: [&str; FEATURE_WIDTH] = ["time_delta", "velocity_bin"];

/// Feature table derived from one note sequence, one row per note
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSequence {
    features: Array2<f32>,
}

impl EncodedSequence {
    /// Wrap an existing `[n, FEATURE_WIDTH]` table
    pub fn from_array(features: Array2<f32>) -> Result<Self> {
        if features.ncols() != FEATURE_WIDTH {
            return Err(MidiVelError::InvalidConfiguration(format!(
                "encoded sequence needs {} columns, got {}",
                FEATURE_WIDTH,
                features.ncols()
            )));
        }
        Ok(Self { features })
    }

    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.features.view()
    }

    pub fn into_array(self) -> Array2<f32> {
        self.features
    }
}

/// Quantize a MIDI velocity into one of `num_bins` equal-width buckets
///
/// `bin = min(velocity * num_bins / 128, num_bins - 1)`. Velocities above 127 are
/// the caller's responsibility; they land in the top bin.
pub fn velocity_bin(velocity: u8, num_bins: usize) -> usize {
    debug_assert!(num_bins >= 1);
    let bin = velocity as u128 * num_bins as u128 / 128;
    usize::try_from(bin)
        .unwrap_or(usize::MAX)
        .min(num_bins.saturating_sub(1))
}

/// Encode a note sequence into `[time_delta, velocity_bin]` rows
pub fn encode(sequence: &NoteSequence, config: &EncodingConfig) -> Result<EncodedSequence> {
    if !(1..=MAX_NUM_BINS).contains(&config.num_bins) {
        return Err(MidiVelError::InvalidConfiguration(format!(
            "num_bins must be in 1..={}, got {}",
            MAX_NUM_BINS, config.num_bins
        )));
    }

    let mut features = Array2::<f32>::zeros((sequence.len(), FEATURE_WIDTH));

    for (i, note) in sequence.notes.iter().enumerate() {
        let velocity = match config.velocity_policy {
            VelocityPolicy::Clamp => note.velocity.min(MAX_MIDI_VELOCITY),
            VelocityPolicy::Reject if note.velocity > MAX_MIDI_VELOCITY => {
                return Err(MidiVelError::OutOfRangeInput(format!(
                    "note {} has velocity {} (max {})",
                    i, note.velocity, MAX_MIDI_VELOCITY
                )));
            }
            VelocityPolicy::Reject => note.velocity,
        };

        let time_delta = match i {
            0 => 0.0,
            _ => {
                let prev = &sequence.notes[i - 1];
                let reference = match config.delta_mode {
                    DeltaMode::StartToStart => prev.start_time,
                    DeltaMode::EndToStart => prev.end_time,
                };
                // Overlapping notes would go negative under end-to-start
                (note.start_time - reference).max(0.0)
            }
        };

        features[[i, TIME_DELTA_COL]] = time_delta as f32;
        features[[i, VELOCITY_BIN_COL]] = velocity_bin(velocity, config.num_bins) as f32;
    }

    Ok(EncodedSequence { features })
}
