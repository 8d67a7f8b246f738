//! Validation tests for the batch MIDI conversion pipeline

use midivel::config::ConversionConfig;
use midivel::convert::{
    convert, convert_dir, decode_filemap, discover_midi_files, load_filemap, save_filemap,
};
use midivel::midi::sequence_to_midi_bytes;
use midivel::{MidiVelError, NoteEvent, NoteSequence};
use std::collections::BTreeSet;
use std::path::Path;

/// Scale of `n` notes with rising velocity
fn generate_performance(n: usize, seed: u8) -> NoteSequence {
    let notes = (0..n)
        .map(|i| {
            let start = i as f64 * 0.25;
            let velocity = 10 + ((i as u32 * 13 + seed as u32) % 110) as u8;
            NoteEvent::new(48 + (i % 24) as u8, velocity, start, start + 0.2)
        })
        .collect();
    NoteSequence::from_notes(notes)
}

fn write_midi(dir: &Path, name: &str, seq: &NoteSequence) {
    let bytes = sequence_to_midi_bytes(seq, 480).unwrap();
    std::fs::write(dir.join(name), bytes).unwrap();
}

/// Directory with `count` valid MIDI files named `piece_XX.mid`
fn midi_corpus(count: usize) -> (tempfile::TempDir, Vec<String>) {
    let dir = tempfile::tempdir().unwrap();
    let mut files = Vec::new();
    for i in 0..count {
        let name = format!("piece_{:02}.mid", i);
        write_midi(dir.path(), &name, &generate_performance(5 + i, i as u8));
        files.push(name);
    }
    (dir, files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_cover_file_list_for_any_worker_count() {
        let (dir, files) = midi_corpus(7);
        let expected: BTreeSet<String> = files
            .iter()
            .map(|f| f.trim_end_matches(".mid").to_string())
            .collect();

        for workers in 1..=files.len() {
            let report = convert(dir.path(), &files, workers, true).unwrap();
            let keys: BTreeSet<String> = report.filemap.keys().cloned().collect();
            assert_eq!(keys, expected, "workers = {}", workers);
            assert_eq!(report.filemap.len(), files.len());
            assert_eq!(report.shards, workers);
            assert!(report.failures.is_empty());
        }
    }

    #[test]
    fn test_more_workers_than_files() {
        let (dir, files) = midi_corpus(2);
        let report = convert(dir.path(), &files, 6, true).unwrap();
        assert_eq!(report.converted(), 2);
    }

    #[test]
    fn test_converted_sequences_decode() {
        let (dir, files) = midi_corpus(3);
        let report = convert(dir.path(), &files, 2, true).unwrap();
        let decoded = decode_filemap(&report.filemap).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].0, "piece_00");
        assert_eq!(decoded[0].1.len(), 5);
        assert_eq!(decoded[2].1.len(), 7);
        assert_eq!(decoded[1].1.notes[0].velocity, generate_performance(6, 1).notes[0].velocity);
    }

    #[test]
    fn test_corrupt_file_is_isolated() {
        let (dir, mut files) = midi_corpus(4);
        std::fs::write(dir.path().join("broken.mid"), b"MThd garbage").unwrap();
        files.insert(1, "broken.mid".to_string());

        let report = convert(dir.path(), &files, 2, true).unwrap();
        assert_eq!(report.converted(), 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].file, "broken.mid");
        assert!(report.failures[0].reason.starts_with("E003"));
    }

    #[test]
    fn test_corrupt_file_fails_run_without_isolation() {
        let (dir, mut files) = midi_corpus(2);
        std::fs::write(dir.path().join("broken.mid"), b"not midi").unwrap();
        files.push("broken.mid".to_string());

        let err = convert(dir.path(), &files, 1, false).unwrap_err();
        assert!(matches!(err, MidiVelError::ParseFailure { .. }));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_same_stem_is_duplicate_key() {
        let dir = tempfile::tempdir().unwrap();
        let seq = generate_performance(4, 0);
        write_midi(dir.path(), "take.mid", &seq);
        write_midi(dir.path(), "take.midi", &seq);
        let files = vec!["take.mid".to_string(), "take.midi".to_string()];

        // Same shard and separate shards both report the collision
        for workers in [1, 2] {
            let err = convert(dir.path(), &files, workers, true).unwrap_err();
            assert!(matches!(err, MidiVelError::DuplicateKey(ref k) if k == "take"));
        }
    }

    #[test]
    fn test_discovery_is_case_insensitive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let seq = generate_performance(3, 0);
        write_midi(dir.path(), "b.MID", &seq);
        write_midi(dir.path(), "a.mid", &seq);
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub.mid")).unwrap();

        let files = discover_midi_files(dir.path(), &["mid".to_string()]).unwrap();
        assert_eq!(files, vec!["a.mid".to_string(), "b.MID".to_string()]);
    }

    #[test]
    fn test_missing_directory_is_io_failure() {
        let err = convert_dir("/definitely/not/here", &ConversionConfig::default()).unwrap_err();
        assert!(matches!(err, MidiVelError::Io { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_filemap_persists() {
        let (dir, _) = midi_corpus(3);
        let report = convert_dir(dir.path(), &ConversionConfig::default()).unwrap();
        let out = dir.path().join("out").join("sequences.bin");
        save_filemap(&out, &report.filemap).unwrap();
        assert_eq!(load_filemap(&out).unwrap(), report.filemap);

        std::fs::write(&out, b"junk").unwrap();
        assert!(load_filemap(&out).is_err());
    }
}
