//! Configuration system for the dataset pipeline

use crate::error::{MidiVelError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One bin per MIDI velocity value is the finest useful quantization
pub const MAX_NUM_BINS: usize = 128;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub encoding: EncodingConfig,
    pub windowing: WindowingConfig,
    pub split: SplitConfig,
    pub conversion: ConversionConfig,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            encoding: EncodingConfig::default(),
            windowing: WindowingConfig::default(),
            split: SplitConfig::default(),
            conversion: ConversionConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Which note boundary the time delta is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaMode {
    /// `current.start - previous.start`
    StartToStart,
    /// `current.start - previous.end`, i.e. the silence between notes
    EndToStart,
}

impl DeltaMode {
    pub fn name(&self) -> &'static str {
        match self {
            DeltaMode::StartToStart => "start_to_start",
            DeltaMode::EndToStart => "end_to_start",
        }
    }
}

/// What to do with velocities above 127
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityPolicy {
    Clamp,
    Reject,
}

/// Sequence encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub num_bins: usize,
    pub delta_mode: DeltaMode,
    pub velocity_policy: VelocityPolicy,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            num_bins: 32,
            delta_mode: DeltaMode::StartToStart,
            velocity_policy: VelocityPolicy::Clamp,
        }
    }
}

/// Windowing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowingConfig {
    /// Notes per sample
    pub seq_length: usize,
    /// Stride between window starts; `None` means `seq_length` (no overlap)
    pub hop: Option<usize>,
}

impl WindowingConfig {
    pub fn effective_hop(&self) -> usize {
        self.hop.unwrap_or(self.seq_length)
    }
}

impl Default for WindowingConfig {
    fn default() -> Self {
        Self {
            seq_length: 100,
            hop: None,
        }
    }
}

/// Train/test split configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub test_size: f64,
    /// Fixed seed for reproducible splits; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.1,
            seed: None,
        }
    }
}

/// Batch MIDI conversion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub processes: usize,
    /// File extensions to pick up, matched case-insensitively
    pub extensions: Vec<String>,
    /// Keep converting after a file fails to parse and report it at the end
    pub isolate_failures: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            processes: 4,
            extensions: vec!["mid".to_string()],
            isolate_failures: true,
        }
    }
}

/// Dataset output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub write_manifest: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_manifest: true,
        }
    }
}

fn invalid(msg: impl Into<String>) -> MidiVelError {
    MidiVelError::InvalidConfiguration(msg.into())
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> Result<()> {
    let num_bins = config.encoding.num_bins;
    if !(1..=MAX_NUM_BINS).contains(&num_bins) {
        return Err(invalid(format!(
            "num_bins must be in 1..={}, got {}",
            MAX_NUM_BINS, num_bins
        )));
    }

    if config.windowing.seq_length == 0 {
        return Err(invalid("seq_length must be >= 1"));
    }
    if config.windowing.hop == Some(0) {
        return Err(invalid("hop must be >= 1"));
    }

    let ratio = config.split.test_size;
    if !ratio.is_finite() || ratio <= 0.0 || ratio >= 1.0 {
        return Err(invalid(format!(
            "test_size must be in (0, 1), got {}",
            ratio
        )));
    }

    if config.conversion.processes == 0 {
        return Err(invalid("processes must be >= 1"));
    }
    if config.conversion.extensions.is_empty() {
        return Err(invalid("at least one MIDI file extension is required"));
    }

    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| MidiVelError::io(path, e))?;
    let config: Config = serde_json::from_str(&content)
        .map_err(|e| invalid(format!("{}: {}", path.display(), e)))?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| MidiVelError::io(path, e))?;
    Ok(())
}
