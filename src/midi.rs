//! Standard MIDI File parsing into note sequences, and rendering back to SMF bytes

use crate::error::{MidiVelError, Result};
use crate::sequence::{NoteEvent, NoteSequence, TempoChange, MAX_MIDI_VELOCITY};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use tracing::debug;

/// 120 BPM, the SMF default when no tempo event is present
pub const DEFAULT_US_PER_QUARTER: u32 = 500_000;

/// Channel index of General MIDI percussion
const DRUM_CHANNEL: u8 = 9;

/// Parse a MIDI file from disk
pub fn parse_midi_file<P: AsRef<Path>>(path: P) -> Result<NoteSequence> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| MidiVelError::io(path, e))?;
    parse_midi_bytes(&bytes).map_err(|err| match err {
        MidiVelError::ParseFailure { reason, .. } => MidiVelError::ParseFailure {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })
}

/// Parse an in-memory Standard MIDI File
pub fn parse_midi_bytes(bytes: &[u8]) -> Result<NoteSequence> {
    let smf = Smf::parse(bytes).map_err(|e| MidiVelError::ParseFailure {
        path: Default::default(),
        reason: e.to_string(),
    })?;
    Ok(smf_to_sequence(&smf))
}

/// Tick -> seconds conversion honoring every tempo change in the file
#[derive(Debug, Clone)]
struct TempoMap {
    timing: Timing,
    /// (tick, seconds at tick, microseconds per quarter from tick on)
    segments: Vec<(u64, f64, u32)>,
}

impl TempoMap {
    fn build(smf: &Smf<'_>) -> Self {
        let mut changes: Vec<(u64, u32)> = Vec::new();
        for track in &smf.tracks {
            let mut tick = 0u64;
            for ev in track {
                tick += ev.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::Tempo(tp)) = ev.kind {
                    changes.push((tick, tp.as_int()));
                }
            }
        }
        // Stable sort keeps the later event of two at the same tick last
        changes.sort_by_key(|&(tick, _)| tick);

        let mut map = TempoMap {
            timing: smf.header.timing,
            segments: vec![(0, 0.0, DEFAULT_US_PER_QUARTER)],
        };
        for (tick, us_per_qn) in changes {
            let seconds = map.seconds(tick);
            match map.segments.last_mut() {
                Some(last) if last.0 == tick => last.2 = us_per_qn,
                _ => map.segments.push((tick, seconds, us_per_qn)),
            }
        }
        map
    }

    fn seconds(&self, tick: u64) -> f64 {
        match self.timing {
            Timing::Metrical(ppq) => {
                let ppq = ppq.as_int().max(1) as f64;
                let idx = self
                    .segments
                    .partition_point(|&(start, _, _)| start <= tick)
                    .saturating_sub(1);
                let (start, base, us_per_qn) = self.segments[idx];
                base + (tick - start) as f64 / ppq * (us_per_qn as f64 / 1_000_000.0)
            }
            Timing::Timecode(fps, ticks_per_frame) => {
                let per_second = fps.as_f32() as f64 * ticks_per_frame.max(1) as f64;
                tick as f64 / per_second
            }
        }
    }

    fn tempo_changes(&self) -> Vec<TempoChange> {
        if matches!(self.timing, Timing::Timecode(..)) {
            return Vec::new();
        }
        self.segments
            .iter()
            .map(|&(_, time, us_per_qn)| TempoChange {
                time,
                qpm: 60_000_000.0 / us_per_qn as f64,
            })
            .collect()
    }
}

/// Note-on still waiting for its note-off
#[derive(Debug, Clone, Copy)]
struct PendingNote {
    start_tick: u64,
    velocity: u8,
    program: u8,
}

fn smf_to_sequence(smf: &Smf<'_>) -> NoteSequence {
    let tempo_map = TempoMap::build(smf);
    let mut notes = Vec::new();

    let last_tick = smf
        .tracks
        .iter()
        .map(|track| track.iter().map(|ev| ev.delta.as_int() as u64).sum::<u64>())
        .max()
        .unwrap_or(0);

    for track in &smf.tracks {
        let mut tick = 0u64;
        let mut programs = [0u8; 16];
        let mut pending: HashMap<(u8, u8), VecDeque<PendingNote>> = HashMap::new();

        let mut close = |channel: u8, key: u8, note: PendingNote, end_tick: u64| {
            notes.push(NoteEvent {
                pitch: key,
                velocity: note.velocity,
                start_time: tempo_map.seconds(note.start_tick),
                end_time: tempo_map.seconds(end_tick),
                channel,
                program: note.program,
                is_drum: channel == DRUM_CHANNEL,
            });
        };

        for ev in track {
            tick += ev.delta.as_int() as u64;
            let TrackEventKind::Midi { channel, message } = ev.kind else {
                continue;
            };
            let ch = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    pending
                        .entry((ch, key.as_int()))
                        .or_default()
                        .push_back(PendingNote {
                            start_tick: tick,
                            velocity: vel.as_int(),
                            program: programs[ch as usize],
                        });
                }
                // NoteOn with velocity 0 is a note-off
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    let started = pending
                        .get_mut(&(ch, key.as_int()))
                        .and_then(|queue| queue.pop_front());
                    if let Some(note) = started {
                        close(ch, key.as_int(), note, tick);
                    }
                }
                MidiMessage::ProgramChange { program } => {
                    programs[ch as usize] = program.as_int();
                }
                _ => {}
            }
        }

        for ((ch, key), queue) in pending {
            for note in queue {
                close(ch, key, note, last_tick.max(note.start_tick));
            }
        }
    }

    notes.sort_by(|a, b| {
        a.start_time
            .total_cmp(&b.start_time)
            .then(a.pitch.cmp(&b.pitch))
            .then(a.channel.cmp(&b.channel))
    });
    debug!(notes = notes.len(), tracks = smf.tracks.len(), "parsed MIDI");

    let mut sequence = NoteSequence::from_notes(notes);
    sequence.total_time = sequence.total_time.max(tempo_map.seconds(last_tick));
    sequence.ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(ppq) => Some(ppq.as_int()),
        Timing::Timecode(..) => None,
    };
    sequence.tempos = tempo_map.tempo_changes();
    sequence
}

/// Render a note sequence as a single-track SMF at 120 BPM
pub fn sequence_to_midi_bytes(sequence: &NoteSequence, ticks_per_quarter: u16) -> Result<Vec<u8>> {
    let ppq = ticks_per_quarter.max(1);
    let ticks_per_sec = ppq as f64 * 1_000_000.0 / DEFAULT_US_PER_QUARTER as f64;
    let to_tick = |sec: f64| (sec.max(0.0) * ticks_per_sec).round() as u32;

    // (tick, is_note_on, channel, key, vel); note-offs sort before note-ons on the same tick
    let mut timeline: Vec<(u32, bool, u8, u8, u8)> = Vec::with_capacity(sequence.len() * 2);
    for note in &sequence.notes {
        let channel = note.channel & 0x0f;
        let key = note.pitch.min(127);
        let vel = note.velocity.min(MAX_MIDI_VELOCITY);
        timeline.push((to_tick(note.start_time), true, channel, key, vel));
        timeline.push((to_tick(note.end_time), false, channel, key, 0));
    }
    timeline.sort_by_key(|&(tick, is_on, ..)| (tick, is_on));

    let mut track_events = vec![TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(DEFAULT_US_PER_QUARTER))),
    }];

    let mut current_tick = 0u32;
    for (tick, is_on, channel, key, vel) in timeline {
        let message = if is_on {
            MidiMessage::NoteOn {
                key: u7::from(key),
                vel: u7::from(vel),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::from(key),
                vel: u7::from(0),
            }
        };
        track_events.push(TrackEvent {
            delta: u28::from(tick - current_tick),
            kind: TrackEventKind::Midi {
                channel: u4::from(channel),
                message,
            },
        });
        current_tick = tick;
    }

    track_events.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::from(ppq)),
        },
        tracks: vec![track_events],
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| MidiVelError::Serialization(format!("Failed to write MIDI data: {:?}", e)))?;
    Ok(bytes)
}
