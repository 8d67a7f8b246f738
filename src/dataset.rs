//! Dataset input loading, persisted output and the training-side view of it

use crate::config::{Config, MAX_NUM_BINS};
use crate::convert::{decode_filemap, load_filemap};
use crate::error::{MidiVelError, Result};
use crate::npy::{load_array3, save_array3};
use crate::sequence::NoteSequence;
use crate::stages::encode::{FEATURE_NAMES, FEATURE_WIDTH, TIME_DELTA_COL, VELOCITY_BIN_COL};
use ndarray::{s, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const TRAIN_FILE: &str = "train.npy";
pub const TEST_FILE: &str = "test.npy";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Out-of-band schema written next to the arrays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub format_version: u32,
    pub dtype: String,
    pub seq_length: usize,
    pub hop: usize,
    pub feature_width: usize,
    pub columns: Vec<String>,
    pub num_bins: usize,
    pub delta_mode: String,
    pub test_size: f64,
    pub seed: Option<u64>,
    pub sequences: usize,
    pub train_samples: usize,
    pub test_samples: usize,
}

impl DatasetManifest {
    pub fn new(config: &Config, sequences: usize, train_samples: usize, test_samples: usize) -> Self {
        Self {
            format_version: 1,
            dtype: "float32".to_string(),
            seq_length: config.windowing.seq_length,
            hop: config.windowing.effective_hop(),
            feature_width: FEATURE_WIDTH,
            columns: FEATURE_NAMES.iter().map(|c| c.to_string()).collect(),
            num_bins: config.encoding.num_bins,
            delta_mode: config.encoding.delta_mode.name().to_string(),
            test_size: config.split.test_size,
            seed: config.split.seed,
            sequences,
            train_samples,
            test_samples,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| MidiVelError::io(path, e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Load note sequences from a converted file map, or from a JSON array of sequences
///
/// File-map entries come back in key order; JSON entries are keyed by position.
pub fn load_sequences<P: AsRef<Path>>(path: P) -> Result<Vec<(String, NoteSequence)>> {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        let file = File::open(path).map_err(|e| MidiVelError::io(path, e))?;
        let sequences: Vec<NoteSequence> = serde_json::from_reader(BufReader::new(file))?;
        Ok(sequences
            .into_iter()
            .enumerate()
            .map(|(i, seq)| (format!("sequence_{}", i), seq))
            .collect())
    } else {
        decode_filemap(&load_filemap(path)?)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_manifest(path: &Path, manifest: &DatasetManifest) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(path, json).map_err(|e| MidiVelError::io(path, e))
}

fn discard_staged(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = std::fs::remove_file(tmp);
    }
}

/// Write `train.npy`, `test.npy` (and the manifest) into `output_dir`
///
/// Everything is staged in `*.tmp` files first; the final names appear only once
/// every file has been written. Each rename is atomic on its own, but the commit as
/// a whole is not: a failed rename leaves earlier files replaced and removes the
/// remaining staged files. Without a manifest, any stale `manifest.json` from an
/// earlier run is removed so it cannot describe the new arrays.
pub fn write_dataset<P: AsRef<Path>>(
    output_dir: P,
    train: &Array3<f32>,
    test: &Array3<f32>,
    manifest: Option<&DatasetManifest>,
) -> Result<()> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir).map_err(|e| MidiVelError::io(output_dir, e))?;

    let train_path = output_dir.join(TRAIN_FILE);
    let test_path = output_dir.join(TEST_FILE);
    let manifest_path = output_dir.join(MANIFEST_FILE);

    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();
    let result = (|| -> Result<()> {
        let tmp = tmp_path(&train_path);
        staged.push((tmp.clone(), train_path.clone()));
        save_array3(&tmp, train)?;

        let tmp = tmp_path(&test_path);
        staged.push((tmp.clone(), test_path.clone()));
        save_array3(&tmp, test)?;

        if let Some(manifest) = manifest {
            let tmp = tmp_path(&manifest_path);
            staged.push((tmp.clone(), manifest_path.clone()));
            write_manifest(&tmp, manifest)?;
        }
        Ok(())
    })();

    if let Err(err) = result {
        discard_staged(&staged);
        return Err(err);
    }

    if manifest.is_none() && manifest_path.exists() {
        if let Err(e) = std::fs::remove_file(&manifest_path) {
            discard_staged(&staged);
            return Err(MidiVelError::io(&manifest_path, e));
        }
        debug!(path = %manifest_path.display(), "removed stale manifest");
    }

    for (i, (tmp, target)) in staged.iter().enumerate() {
        if let Err(e) = std::fs::rename(tmp, target) {
            discard_staged(&staged[i..]);
            return Err(MidiVelError::io(target, e));
        }
    }

    info!(
        dir = %output_dir.display(),
        train = train.len_of(Axis(0)),
        test = test.len_of(Axis(0)),
        "dataset written"
    );
    Ok(())
}

/// Read back `train.npy` and `test.npy`, checking them against the manifest when present
pub fn load_dataset<P: AsRef<Path>>(dir: P) -> Result<(Array3<f32>, Array3<f32>)> {
    let dir = dir.as_ref();
    let train = load_array3(dir.join(TRAIN_FILE))?;
    let test = load_array3(dir.join(TEST_FILE))?;

    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.exists() {
        let manifest = DatasetManifest::load(&manifest_path)?;
        for (name, array, expected) in [
            (TRAIN_FILE, &train, manifest.train_samples),
            (TEST_FILE, &test, manifest.test_samples),
        ] {
            let shape = array.shape();
            if shape[0] != expected || shape[1] != manifest.seq_length || shape[2] != manifest.feature_width {
                return Err(MidiVelError::ArrayFormat(format!(
                    "{} has shape {:?}, manifest says ({}, {}, {})",
                    name, shape, expected, manifest.seq_length, manifest.feature_width
                )));
            }
        }
    } else {
        warn!(dir = %dir.display(), "no manifest; skipping schema check");
    }

    Ok((train, test))
}

fn check_width(samples: &Array3<f32>) -> Result<()> {
    if samples.len_of(Axis(2)) != FEATURE_WIDTH {
        return Err(MidiVelError::ArrayFormat(format!(
            "expected {} features, got {}",
            FEATURE_WIDTH,
            samples.len_of(Axis(2))
        )));
    }
    Ok(())
}

/// Model inputs and targets for velocity prediction
///
/// Inputs keep the time delta and replace each note's own velocity bin with the
/// previous note's bin (0 for the first note of a sample). Targets are the
/// notes' own bins, shape `[n, seq_length]`.
pub fn training_pairs(samples: &Array3<f32>) -> Result<(Array3<f32>, Array2<f32>)> {
    check_width(samples)?;

    let targets = samples.slice(s![.., .., VELOCITY_BIN_COL]).to_owned();
    let mut inputs = Array3::<f32>::zeros(samples.raw_dim());
    inputs
        .slice_mut(s![.., .., TIME_DELTA_COL])
        .assign(&samples.slice(s![.., .., TIME_DELTA_COL]));
    if samples.len_of(Axis(1)) > 1 {
        inputs
            .slice_mut(s![.., 1.., VELOCITY_BIN_COL])
            .assign(&samples.slice(s![.., ..-1, VELOCITY_BIN_COL]));
    }
    Ok((inputs, targets))
}

/// Count of notes per velocity bin across all samples
pub fn velocity_histogram(samples: &Array3<f32>, num_bins: usize) -> Result<Vec<usize>> {
    check_width(samples)?;
    let mut counts = vec![0usize; num_bins.clamp(1, MAX_NUM_BINS)];
    for &bin in samples.slice(s![.., .., VELOCITY_BIN_COL]).iter() {
        let idx = (bin.max(0.0) as usize).min(counts.len() - 1);
        counts[idx] += 1;
    }
    Ok(counts)
}

/// Number of bins implied by the largest velocity bin present
pub fn inferred_bin_count(samples: &Array3<f32>) -> Result<usize> {
    check_width(samples)?;
    let max = samples
        .slice(s![.., .., VELOCITY_BIN_COL])
        .fold(0.0f32, |max, &bin| max.max(bin));
    Ok((max as usize).min(MAX_NUM_BINS - 1) + 1)
}
