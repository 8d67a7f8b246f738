//! MIDI velocity dataset preparation
//!
//! Converts performance-MIDI files into note sequences, encodes each sequence as
//! `(time_delta, velocity_bin)` rows, cuts the rows into fixed-length samples and
//! writes a reproducible train/test split as `.npy` arrays of shape
//! `[N, seq_length, 2]`.

pub mod config;
pub mod convert;
pub mod dataset;
pub mod error;
pub mod midi;
pub mod npy;
pub mod probe;
pub mod sequence;
pub mod stages;

pub use config::Config;
pub use error::{MidiVelError, Result as MidiVelResult};
pub use sequence::{FileMap, NoteEvent, NoteSequence};

use dataset::DatasetManifest;
use stages::{EncodedSequence, SamplePool};
use std::path::Path;
use tracing::info;

/// Train and test samples produced by one pipeline run
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: SamplePool,
    pub test: SamplePool,
}

/// What a dataset build produced
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub sequences: usize,
    pub notes: usize,
    pub samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
}

/// Encode, window and split note sequences into a persisted dataset
pub struct DatasetBuilder {
    config: Config,
}

impl DatasetBuilder {
    /// Create a builder; the configuration is validated before any work is done
    pub fn new(config: Config) -> MidiVelResult<Self> {
        config::validate_config(&config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load sequences from `input_file` and write the split to `output_dir`
    pub fn build<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_file: P,
        output_dir: Q,
    ) -> MidiVelResult<DatasetSummary> {
        let input_file = input_file.as_ref();
        info!(input = %input_file.display(), "loading sequences");
        let sequences: Vec<NoteSequence> = dataset::load_sequences(input_file)?
            .into_iter()
            .map(|(_, seq)| seq)
            .collect();
        info!(sequences = sequences.len(), "sequences loaded");

        let split = self.run_pipeline(&sequences)?;
        let summary = DatasetSummary {
            sequences: sequences.len(),
            notes: sequences.iter().map(NoteSequence::len).sum(),
            samples: split.train.len() + split.test.len(),
            train_samples: split.train.len(),
            test_samples: split.test.len(),
        };

        self.export_results(&split, &summary, output_dir.as_ref())?;
        Ok(summary)
    }

    /// Run the in-memory stages: encode, window, split
    pub fn run_pipeline(&self, sequences: &[NoteSequence]) -> MidiVelResult<DatasetSplit> {
        let encoded = self.encode_all(sequences)?;

        let windowing = &self.config.windowing;
        info!(
            seq_length = windowing.seq_length,
            hop = windowing.effective_hop(),
            "creating samples"
        );
        let pool =
            stages::window_with_hop(&encoded, windowing.seq_length, windowing.effective_hop())?;
        info!(samples = pool.len(), "samples created");

        let (train, test) = stages::split(pool, self.config.split.test_size, self.config.split.seed)?;
        info!(train = train.len(), test = test.len(), "split created");

        Ok(DatasetSplit { train, test })
    }

    fn encode_all(&self, sequences: &[NoteSequence]) -> MidiVelResult<Vec<EncodedSequence>> {
        sequences
            .iter()
            .map(|seq| stages::encode(seq, &self.config.encoding))
            .collect()
    }

    fn export_results(
        &self,
        split: &DatasetSplit,
        summary: &DatasetSummary,
        output_dir: &Path,
    ) -> MidiVelResult<()> {
        let seq_length = self.config.windowing.seq_length;
        let train = stages::window::stack_samples(&split.train, seq_length)?;
        let test = stages::window::stack_samples(&split.test, seq_length)?;

        let manifest = self.config.output.write_manifest.then(|| {
            DatasetManifest::new(
                &self.config,
                summary.sequences,
                summary.train_samples,
                summary.test_samples,
            )
        });
        dataset::write_dataset(output_dir, &train, &test, manifest.as_ref())
    }
}
