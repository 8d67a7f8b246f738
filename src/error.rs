//! Error types for the MIDI velocity dataset pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Custom error type for conversion and dataset preparation
#[derive(Error, Debug)]
pub enum MidiVelError {
    /// E001: Bad parameter (seq_length, num_bins, test ratio, process count, ...)
    #[error("E001: Invalid configuration - {0}")]
    InvalidConfiguration(String),

    /// E002: Missing input, unreadable or unwritable path
    #[error("E002: I/O failure on {path} - {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// E003: A MIDI file could not be converted into a note sequence
    #[error("E003: Parse failure in {path} - {reason}")]
    ParseFailure { path: PathBuf, reason: String },

    /// E004: Note data outside the MIDI-standard range
    #[error("E004: Out-of-range input - {0}")]
    OutOfRangeInput(String),

    /// E005: Two input files map to the same sequence key
    #[error("E005: Duplicate key '{0}' while merging converted files")]
    DuplicateKey(String),

    /// E006: Encoding or decoding of a stored sequence or file map failed
    #[error("E006: Serialization error - {0}")]
    Serialization(String),

    /// E007: Malformed or unsupported persisted array
    #[error("E007: Array format error - {0}")]
    ArrayFormat(String),
}

impl MidiVelError {
    /// Attach a path to an I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MidiVelError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code reported by the CLI for this error class
    pub fn exit_code(&self) -> u8 {
        match self {
            MidiVelError::InvalidConfiguration(_) => 2,
            MidiVelError::Io { .. } => 3,
            MidiVelError::ParseFailure { .. } => 4,
            MidiVelError::OutOfRangeInput(_) => 5,
            MidiVelError::DuplicateKey(_) => 6,
            MidiVelError::Serialization(_) | MidiVelError::ArrayFormat(_) => 7,
        }
    }
}

impl From<bincode::Error> for MidiVelError {
    fn from(err: bincode::Error) -> Self {
        MidiVelError::Serialization(format!("bincode: {}", err))
    }
}

impl From<serde_json::Error> for MidiVelError {
    fn from(err: serde_json::Error) -> Self {
        MidiVelError::Serialization(format!("JSON: {}", err))
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, MidiVelError>;
