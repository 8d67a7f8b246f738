//! Validation tests for the sequence encoder

use midivel::config::{DeltaMode, EncodingConfig, VelocityPolicy};
use midivel::stages::encode::{encode, velocity_bin, TIME_DELTA_COL, VELOCITY_BIN_COL};
use midivel::{MidiVelError, NoteEvent, NoteSequence};

/// Monophonic line with a gap between every note
fn generate_legato_line(n_notes: usize) -> NoteSequence {
    let notes = (0..n_notes)
        .map(|i| {
            let start = i as f64 * 0.5;
            NoteEvent::new(60 + (i % 12) as u8, ((i * 37) % 128) as u8, start, start + 0.4)
        })
        .collect();
    NoteSequence::from_notes(notes)
}

fn config(num_bins: usize, delta_mode: DeltaMode) -> EncodingConfig {
    EncodingConfig {
        num_bins,
        delta_mode,
        velocity_policy: VelocityPolicy::Clamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_matches_note_count() {
        for n in [0, 1, 7, 64] {
            let seq = generate_legato_line(n);
            for bins in [1, 2, 4, 32, 128] {
                let enc = encode(&seq, &config(bins, DeltaMode::StartToStart)).unwrap();
                assert_eq!(enc.len(), n);
                assert_eq!(enc.view().ncols(), 2);
            }
        }
    }

    #[test]
    fn test_bins_stay_in_range_for_all_velocities() {
        for bins in 1..=130 {
            for v in 0..=127u8 {
                let bin = velocity_bin(v, bins);
                assert!(bin < bins, "velocity {} bins {} -> {}", v, bins, bin);
            }
        }
    }

    #[test]
    fn test_velocity_127_with_four_bins_is_bin_3() {
        let seq = NoteSequence::from_notes(vec![NoteEvent::new(60, 127, 0.0, 1.0)]);
        let enc = encode(&seq, &config(4, DeltaMode::StartToStart)).unwrap();
        assert_eq!(enc.view()[[0, VELOCITY_BIN_COL]], 3.0);
    }

    #[test]
    fn test_start_to_start_deltas() {
        let seq = generate_legato_line(4);
        let enc = encode(&seq, &config(8, DeltaMode::StartToStart)).unwrap();
        let deltas: Vec<f32> = enc.view().column(TIME_DELTA_COL).to_vec();
        assert_eq!(deltas, vec![0.0, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_end_to_start_deltas() {
        let seq = generate_legato_line(3);
        let enc = encode(&seq, &config(8, DeltaMode::EndToStart)).unwrap();
        let deltas = enc.view().column(TIME_DELTA_COL).to_vec();
        for (got, want) in deltas.iter().zip([0.0f32, 0.1, 0.1]) {
            assert!((got - want).abs() < 1e-6, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_overlapping_notes_clamp_to_zero() {
        // Second note starts while the first still sounds
        let seq = NoteSequence::from_notes(vec![
            NoteEvent::new(60, 80, 0.0, 2.0),
            NoteEvent::new(64, 80, 1.0, 1.5),
        ]);
        let end = encode(&seq, &config(8, DeltaMode::EndToStart)).unwrap();
        assert_eq!(end.view()[[1, TIME_DELTA_COL]], 0.0);

        let start = encode(&seq, &config(8, DeltaMode::StartToStart)).unwrap();
        assert_eq!(start.view()[[1, TIME_DELTA_COL]], 1.0);
    }

    #[test]
    fn test_out_of_range_velocity_policies() {
        let seq = NoteSequence::from_notes(vec![
            NoteEvent::new(60, 100, 0.0, 1.0),
            NoteEvent::new(62, 200, 1.0, 2.0),
        ]);

        let clamped = encode(&seq, &config(4, DeltaMode::StartToStart)).unwrap();
        assert_eq!(clamped.view()[[1, VELOCITY_BIN_COL]], 3.0);

        let strict = EncodingConfig {
            velocity_policy: VelocityPolicy::Reject,
            ..config(4, DeltaMode::StartToStart)
        };
        let err = encode(&seq, &strict).unwrap_err();
        assert!(matches!(err, MidiVelError::OutOfRangeInput(msg) if msg.contains("note 1")));
    }

    #[test]
    fn test_input_is_not_modified() {
        let seq = generate_legato_line(10);
        let before = seq.clone();
        let _ = encode(&seq, &config(16, DeltaMode::EndToStart)).unwrap();
        assert_eq!(seq, before);
    }
}
