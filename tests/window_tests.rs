//! Validation tests for the windowing engine

use midivel::stages::encode::{EncodedSequence, FEATURE_WIDTH};
use midivel::stages::window::{stack_samples, window, window_with_hop};
use ndarray::{s, Array2};

/// Encoded sequence whose rows are tagged with the sequence id and row index,
/// so every value identifies exactly where it came from
fn tagged_sequence(id: usize, len: usize) -> EncodedSequence {
    let data = Array2::from_shape_fn((len, FEATURE_WIDTH), |(row, col)| {
        (id * 10_000 + row * 10 + col) as f32
    });
    EncodedSequence::from_array(data).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seven_notes_length_three() {
        let pool = window(&[tagged_sequence(0, 7)], 3).unwrap();
        assert_eq!(pool.len(), 2);
        for sample in &pool {
            assert_eq!(sample.features.shape(), &[3, FEATURE_WIDTH]);
        }
        // Row 6 is the discarded remainder
        assert_eq!(pool[1].features[[2, 0]], 50.0);
    }

    #[test]
    fn test_concatenation_is_prefix_of_source() {
        for len in 0..40 {
            for seq_length in 1..9 {
                let seq = tagged_sequence(1, len);
                let pool = window(&[seq.clone()], seq_length).unwrap();
                assert_eq!(pool.len(), len / seq_length);

                let covered = seq_length * (len / seq_length);
                let source = seq.view();
                let mut row = 0;
                for sample in &pool {
                    assert_eq!(sample.features.nrows(), seq_length);
                    for sample_row in sample.features.rows() {
                        assert_eq!(sample_row, source.row(row));
                        row += 1;
                    }
                }
                assert_eq!(row, covered);
            }
        }
    }

    #[test]
    fn test_no_cross_sequence_leakage() {
        let sequences = vec![tagged_sequence(1, 5), tagged_sequence(2, 4), tagged_sequence(3, 9)];
        let pool = window(&sequences, 2).unwrap();
        assert_eq!(pool.len(), 2 + 2 + 4);

        for sample in &pool {
            let ids: Vec<usize> = sample
                .features
                .iter()
                .map(|&value| value as usize / 10_000)
                .collect();
            assert!(ids.iter().all(|&id| id == sample.source + 1));
        }
    }

    #[test]
    fn test_pool_order_is_source_then_offset() {
        let sequences = vec![tagged_sequence(0, 6), tagged_sequence(1, 6)];
        let pool = window(&sequences, 3).unwrap();
        let order: Vec<(usize, usize)> = pool.iter().map(|s| (s.source, s.offset)).collect();
        assert_eq!(order, vec![(0, 0), (0, 3), (1, 0), (1, 3)]);
    }

    #[test]
    fn test_short_sequences_yield_nothing() {
        let pool = window(&[tagged_sequence(0, 2), tagged_sequence(1, 0)], 3).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_overlap_hop() {
        let pool = window_with_hop(&[tagged_sequence(0, 10)], 4, 2).unwrap();
        let offsets: Vec<usize> = pool.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 2, 4, 6]);
        // Shared rows are identical
        assert_eq!(
            pool[0].features.slice(s![2.., ..]),
            pool[1].features.slice(s![..2, ..])
        );
    }

    #[test]
    fn test_stack_samples_shape() {
        let pool = window(&[tagged_sequence(0, 12)], 4).unwrap();
        let stacked = stack_samples(&pool, 4).unwrap();
        assert_eq!(stacked.shape(), &[3, 4, FEATURE_WIDTH]);
        assert_eq!(stacked[[2, 0, 0]], 80.0);
    }
}
