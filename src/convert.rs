//! Batch conversion of a directory of MIDI files into a persisted [`FileMap`]
//!
//! The file list is cut into contiguous shards, one per worker. Each worker
//! parses and serializes its shard independently; the partial maps are merged
//! once every worker has finished.

use crate::config::ConversionConfig;
use crate::error::{MidiVelError, Result};
use crate::midi::parse_midi_file;
use crate::sequence::{FileMap, NoteSequence};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

const ARCHIVE_FORMAT: &str = "midivel-filemap";
const ARCHIVE_VERSION: u32 = 1;

/// A file that could not be converted, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: String,
    pub reason: String,
}

/// Output of one worker
#[derive(Debug, Default)]
pub struct ShardResult {
    pub filemap: FileMap,
    pub failures: Vec<FileFailure>,
}

/// Merged output of a conversion run
#[derive(Debug, Default)]
pub struct ConversionReport {
    pub filemap: FileMap,
    pub failures: Vec<FileFailure>,
    pub shards: usize,
}

impl ConversionReport {
    pub fn converted(&self) -> usize {
        self.filemap.len()
    }
}

/// List MIDI files in `dir` whose extension matches one of `extensions`
/// (case-insensitive), sorted by name
pub fn discover_midi_files<P: AsRef<Path>>(dir: P, extensions: &[String]) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| MidiVelError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MidiVelError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if matches {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}

/// Split `items` into `n` contiguous shards whose sizes differ by at most one
///
/// The first `len % n` shards get the extra item. Shards may be empty when
/// `n > len`.
pub fn shard<T>(items: &[T], n: usize) -> Vec<&[T]> {
    let n = n.max(1);
    let (k, m) = (items.len() / n, items.len() % n);
    (0..n)
        .map(|i| &items[i * k + i.min(m)..(i + 1) * k + (i + 1).min(m)])
        .collect()
}

/// Key a file is stored under: its name without extension
pub fn file_key(file: &str) -> String {
    Path::new(file)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}

fn convert_file(input_dir: &Path, file: &str) -> Result<Vec<u8>> {
    let sequence = parse_midi_file(input_dir.join(file))?;
    debug!(file, notes = sequence.len(), "converted");
    sequence.to_bytes()
}

/// Convert every file in one shard
///
/// With `isolate_failures` a broken file is recorded and skipped; otherwise the
/// first failure aborts the shard.
pub fn convert_shard(input_dir: &Path, files: &[String], isolate_failures: bool) -> Result<ShardResult> {
    let mut result = ShardResult::default();

    for file in files {
        let key = file_key(file);
        match convert_file(input_dir, file) {
            Ok(bytes) => {
                if result.filemap.insert(key.clone(), bytes).is_some() {
                    return Err(MidiVelError::DuplicateKey(key));
                }
            }
            Err(err) if isolate_failures => {
                warn!(file = file.as_str(), error = %err, "skipping unconvertible file");
                result.failures.push(FileFailure {
                    file: file.clone(),
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }

    Ok(result)
}

/// Union of partial maps; a key present in two maps is an error
pub fn merge_filemaps<I: IntoIterator<Item = FileMap>>(maps: I) -> Result<FileMap> {
    let mut merged = FileMap::new();
    for map in maps {
        for (key, bytes) in map {
            if merged.contains_key(&key) {
                return Err(MidiVelError::DuplicateKey(key));
            }
            merged.insert(key, bytes);
        }
    }
    Ok(merged)
}

/// Convert `files` under `input_dir` on `process_count` parallel workers
pub fn convert<P: AsRef<Path>>(
    input_dir: P,
    files: &[String],
    process_count: usize,
    isolate_failures: bool,
) -> Result<ConversionReport> {
    if process_count == 0 {
        return Err(MidiVelError::InvalidConfiguration(
            "process count must be >= 1".to_string(),
        ));
    }
    let input_dir = input_dir.as_ref();
    let shards = shard(files, process_count);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(process_count)
        .build()
        .map_err(|e| {
            MidiVelError::InvalidConfiguration(format!("cannot start {} workers: {}", process_count, e))
        })?;

    info!(files = files.len(), workers = process_count, "converting MIDI files");

    let results: Vec<Result<ShardResult>> = pool.install(|| {
        shards
            .par_iter()
            .map(|files| convert_shard(input_dir, files, isolate_failures))
            .collect()
    });

    let mut maps = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for result in results {
        let shard = result?;
        maps.push(shard.filemap);
        failures.extend(shard.failures);
    }

    let filemap = merge_filemaps(maps)?;
    if !failures.is_empty() {
        warn!(failed = failures.len(), "some files could not be converted");
    }

    Ok(ConversionReport {
        filemap,
        failures,
        shards: shards.len(),
    })
}

/// Discover and convert every MIDI file in a directory
pub fn convert_dir<P: AsRef<Path>>(input_dir: P, config: &ConversionConfig) -> Result<ConversionReport> {
    let input_dir = input_dir.as_ref();
    let files = discover_midi_files(input_dir, &config.extensions)?;
    if files.is_empty() {
        warn!(dir = %input_dir.display(), "no MIDI files found");
    }
    convert(input_dir, &files, config.processes, config.isolate_failures)
}

#[derive(Deserialize)]
struct FileMapArchive {
    format: String,
    version: u32,
    entries: FileMap,
}

/// Borrowing twin of [`FileMapArchive`]; same bincode layout
#[derive(Serialize)]
struct FileMapArchiveRef<'a> {
    format: &'a str,
    version: u32,
    entries: &'a FileMap,
}

/// Persist a file map to a single file
pub fn save_filemap<P: AsRef<Path>>(path: P, filemap: &FileMap) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| MidiVelError::io(parent, e))?;
    }
    let archive = FileMapArchiveRef {
        format: ARCHIVE_FORMAT,
        version: ARCHIVE_VERSION,
        entries: filemap,
    };
    let file = File::create(path).map_err(|e| MidiVelError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, &archive)?;
    writer.flush().map_err(|e| MidiVelError::io(path, e))
}

/// Read a file map written by [`save_filemap`]
pub fn load_filemap<P: AsRef<Path>>(path: P) -> Result<FileMap> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| MidiVelError::io(path, e))?;
    let archive: FileMapArchive = bincode::deserialize_from(BufReader::new(file))?;
    if archive.format != ARCHIVE_FORMAT || archive.version != ARCHIVE_VERSION {
        return Err(MidiVelError::Serialization(format!(
            "{} is not a version {} file map",
            path.display(),
            ARCHIVE_VERSION
        )));
    }
    Ok(archive.entries)
}

/// Decode every entry of a file map, in key order
pub fn decode_filemap(filemap: &FileMap) -> Result<Vec<(String, NoteSequence)>> {
    filemap
        .iter()
        .map(|(key, bytes)| {
            NoteSequence::from_bytes(bytes)
                .map(|seq| (key.clone(), seq))
                .map_err(|e| MidiVelError::Serialization(format!("entry '{}': {}", key, e)))
        })
        .collect()
}
