// src/midi/mod.rs

pub mod decoder;
pub mod event;
pub mod tempo;

pub use decoder::{decode, MidiDecoder};
pub use event::{EventKind, MidiDocument, MidiTrack, RawMidiEvent, SharedDocument};
pub use tempo::TempoMap;
