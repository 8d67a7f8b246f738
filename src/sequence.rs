//! Note-sequence data model shared by the converter and the dataset builder

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Highest velocity allowed by the MIDI standard
pub const MAX_MIDI_VELOCITY: u8 = 127;

/// One performed note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: u8,
    pub velocity: u8,
    /// Onset in seconds
    pub start_time: f64,
    /// Release in seconds
    pub end_time: f64,
    #[serde(default)]
    pub channel: u8,
    #[serde(default)]
    pub program: u8,
    #[serde(default)]
    pub is_drum: bool,
}

impl NoteEvent {
    pub fn new(pitch: u8, velocity: u8, start_time: f64, end_time: f64) -> Self {
        Self {
            pitch,
            velocity,
            start_time,
            end_time,
            channel: 0,
            program: 0,
            is_drum: false,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Tempo change at an absolute time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub time: f64,
    pub qpm: f64,
}

/// Ordered collection of notes parsed from one MIDI file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteSequence {
    pub notes: Vec<NoteEvent>,
    #[serde(default)]
    pub total_time: f64,
    #[serde(default)]
    pub ticks_per_quarter: Option<u16>,
    #[serde(default)]
    pub tempos: Vec<TempoChange>,
}

impl NoteSequence {
    /// Build a sequence from notes, deriving `total_time` from the latest release
    pub fn from_notes(notes: Vec<NoteEvent>) -> Self {
        let total_time = notes.iter().map(|n| n.end_time).fold(0.0, f64::max);
        Self {
            notes,
            total_time,
            ticks_per_quarter: None,
            tempos: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Serialize to the opaque byte blob stored in a [`FileMap`]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// File stem -> serialized [`NoteSequence`]
pub type FileMap = BTreeMap<String, Vec<u8>>;
