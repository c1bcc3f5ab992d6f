// src/midi/event.rs

use std::sync::Arc;

/// Tempo assumed until the first Set Tempo event (120 BPM)
pub const DEFAULT_TEMPO_MICROS: u32 = 500_000;

/// What a decoded event means for playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Note on. A velocity of 0 is kept as-is and treated as a note off downstream.
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    TrackName(String),
    /// Microseconds per quarter note
    SetTempo(u32),
    EndOfTrack,
    /// Any other channel, meta, sysex or escape event
    Other,
}

/// One decoded event with its position in the track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMidiEvent {
    pub track_index: usize,
    /// Absolute tick from the start of the track
    pub tick: u64,
    /// Offset from the previous event in the same track, as stored in the file
    pub delta_tick: u32,
    pub kind: EventKind,
}

impl RawMidiEvent {
    pub fn new(track_index: usize, tick: u64, delta_tick: u32, kind: EventKind) -> Self {
        RawMidiEvent {
            track_index,
            tick,
            delta_tick,
            kind,
        }
    }

    /// Note number and velocity if this starts a voice
    pub fn note_on(&self) -> Option<(u8, u8)> {
        match self.kind {
            EventKind::NoteOn { note, velocity, .. } if velocity > 0 => Some((note, velocity)),
            _ => None,
        }
    }

    /// Note number if this ends a voice (including note-on with velocity 0)
    pub fn note_off(&self) -> Option<u8> {
        match self.kind {
            EventKind::NoteOff { note, .. } => Some(note),
            EventKind::NoteOn { note, velocity: 0, .. } => Some(note),
            _ => None,
        }
    }
}

/// One track of a decoded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiTrack {
    /// First Track Name meta event, empty if the track has none
    pub name: String,
    pub events: Vec<RawMidiEvent>,
}

impl MidiTrack {
    /// Tick of the terminal event
    pub fn end_tick(&self) -> u64 {
        self.events.last().map(|e| e.tick).unwrap_or(0)
    }
}

/// A fully decoded file. Never mutated after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiDocument {
    pub ticks_per_quarter_note: u16,
    pub tracks: Vec<MidiTrack>,
    pub total_ticks: u64,
    pub initial_tempo: u32,
}

/// Shared handle; a new load replaces the whole document
pub type SharedDocument = Arc<MidiDocument>;

impl MidiDocument {
    /// Build a document from decoded tracks, deriving `total_ticks` and `initial_tempo`
    pub fn new(ticks_per_quarter_note: u16, tracks: Vec<MidiTrack>) -> Self {
        let total_ticks = tracks.iter().map(MidiTrack::end_tick).max().unwrap_or(0);
        let initial_tempo = tracks
            .iter()
            .flat_map(|t| t.events.iter())
            .filter(|e| e.tick == 0)
            .filter_map(|e| match e.kind {
                EventKind::SetTempo(micros) => Some(micros),
                _ => None,
            })
            .last()
            .unwrap_or(DEFAULT_TEMPO_MICROS);

        MidiDocument {
            ticks_per_quarter_note,
            tracks,
            total_ticks,
            initial_tempo,
        }
    }

    /// All events merged into playback order: by tick, then track order, then stream order
    pub fn merged_events(&self) -> Vec<RawMidiEvent> {
        let mut all: Vec<RawMidiEvent> = self
            .tracks
            .iter()
            .flat_map(|t| t.events.iter().cloned())
            .collect();
        // Stable sort keeps track/stream order within a tick
        all.sort_by_key(|e| e.tick);
        all
    }

    /// Every Set Tempo event as (tick, micros per quarter note), in playback order
    pub fn tempo_changes(&self) -> Vec<(u64, u32)> {
        self.merged_events()
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::SetTempo(micros) => Some((e.tick, micros)),
                _ => None,
            })
            .collect()
    }

    /// Display name: first track's name, or a generic label
    pub fn display_name(&self) -> String {
        self.tracks
            .first()
            .map(|t| t.name.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or("MIDI File")
            .to_string()
    }
}
