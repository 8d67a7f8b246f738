//! Stage 2: Windowing Engine

use crate::error::{MidiVelError, Result};
use crate::stages::encode::{EncodedSequence, FEATURE_WIDTH};
use ndarray::{s, Array2, Array3, Axis};

/// One fixed-length training sample cut from a single encoded sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Index of the source sequence in the windowing input
    pub source: usize,
    /// First row of the source the window covers
    pub offset: usize,
    /// `[seq_length, FEATURE_WIDTH]` table
    pub features: Array2<f32>,
}

/// All samples before splitting, ordered by source then offset
pub type SamplePool = Vec<Sample>;

/// Number of windows of `seq_length` rows at stride `hop` in `len` rows
pub fn window_count(len: usize, seq_length: usize, hop: usize) -> usize {
    if seq_length == 0 || hop == 0 || len < seq_length {
        0
    } else {
        (len - seq_length) / hop + 1
    }
}

/// Slice every sequence into non-overlapping windows of `seq_length` rows
///
/// A trailing remainder shorter than `seq_length` is dropped.
pub fn window(sequences: &[EncodedSequence], seq_length: usize) -> Result<SamplePool> {
    window_with_hop(sequences, seq_length, seq_length)
}

/// Slice every sequence into windows of `seq_length` rows starting every `hop` rows
///
/// `hop < seq_length` gives overlapping samples, `hop > seq_length` skips rows.
/// Windows never cross from one sequence into the next.
pub fn window_with_hop(
    sequences: &[EncodedSequence],
    seq_length: usize,
    hop: usize,
) -> Result<SamplePool> {
    if seq_length == 0 {
        return Err(MidiVelError::InvalidConfiguration(
            "seq_length must be >= 1".to_string(),
        ));
    }
    if hop == 0 {
        return Err(MidiVelError::InvalidConfiguration(
            "hop must be >= 1".to_string(),
        ));
    }

    let total: usize = sequences
        .iter()
        .map(|seq| window_count(seq.len(), seq_length, hop))
        .sum();
    let mut pool = Vec::with_capacity(total);

    for (source, seq) in sequences.iter().enumerate() {
        let rows = seq.view();
        for n in 0..window_count(seq.len(), seq_length, hop) {
            let offset = n * hop;
            pool.push(Sample {
                source,
                offset,
                features: rows.slice(s![offset..offset + seq_length, ..]).to_owned(),
            });
        }
    }

    Ok(pool)
}

/// Stack samples into a `[n, seq_length, FEATURE_WIDTH]` array
pub fn stack_samples(samples: &[Sample], seq_length: usize) -> Result<Array3<f32>> {
    if samples.is_empty() {
        return Ok(Array3::zeros((0, seq_length, FEATURE_WIDTH)));
    }
    let views: Vec<_> = samples.iter().map(|sample| sample.features.view()).collect();
    ndarray::stack(Axis(0), &views)
        .map_err(|e| MidiVelError::ArrayFormat(format!("cannot stack samples: {}", e)))
}
