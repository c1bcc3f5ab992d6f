// src/midi/decoder.rs

//! Standard MIDI File decoding.
//!
//! The byte stream is framed first (header signature and chunk lengths), then handed to `midly`,
//! which takes care of variable-length deltas, running status and sysex/meta payloads. The result
//! is converted into our own [`MidiDocument`] with absolute ticks per track.

use crate::error::DecodeError;
use crate::midi::event::{EventKind, MidiDocument, MidiTrack, RawMidiEvent};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

const HEADER_MAGIC: &[u8; 4] = b"MThd";
const CHUNK_HEADER_LEN: usize = 8;

pub struct MidiDecoder;

impl MidiDecoder {
    pub fn new() -> Self {
        MidiDecoder
    }

    /// Decode a complete SMF byte buffer. Pure: the same input always yields the same document.
    pub fn decode(&self, bytes: &[u8]) -> Result<MidiDocument, DecodeError> {
        check_framing(bytes)?;

        let smf = Smf::parse(bytes)?;

        if matches!(smf.header.format, Format::Sequential) {
            return Err(DecodeError::UnsupportedFormat(
                "format 2 (sequential songs)".to_string(),
            ));
        }

        let ticks_per_quarter_note = match smf.header.timing {
            Timing::Metrical(tpq) => tpq.as_int(),
            Timing::Timecode(_, _) => return Err(DecodeError::UnsupportedTiming),
        };
        if ticks_per_quarter_note == 0 {
            return Err(DecodeError::Malformed(
                "ticks per quarter note is zero".to_string(),
            ));
        }

        let tracks: Vec<MidiTrack> = smf
            .tracks
            .iter()
            .enumerate()
            .map(|(index, track)| decode_track(index, track))
            .collect();

        let document = MidiDocument::new(ticks_per_quarter_note, tracks);
        log::debug!(
            "Decoded MIDI: {} tracks, {} ticks/quarter, {} total ticks",
            document.tracks.len(),
            document.ticks_per_quarter_note,
            document.total_ticks
        );
        Ok(document)
    }
}

impl Default for MidiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode with a default decoder
pub fn decode(bytes: &[u8]) -> Result<MidiDocument, DecodeError> {
    MidiDecoder::new().decode(bytes)
}

/// Walk the chunk headers and make sure every declared length fits in the buffer
fn check_framing(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.len() < CHUNK_HEADER_LEN || &bytes[..4] != HEADER_MAGIC {
        return Err(DecodeError::MissingHeader);
    }

    let mut offset = 0;
    let mut index = 0;
    while offset + CHUNK_HEADER_LEN <= bytes.len() {
        let declared = u32::from_be_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]);
        let available = bytes.len() - offset - CHUNK_HEADER_LEN;
        if declared as usize > available {
            return Err(DecodeError::Truncated {
                index,
                declared,
                available,
            });
        }
        offset += CHUNK_HEADER_LEN + declared as usize;
        index += 1;
    }
    Ok(())
}

fn decode_track(track_index: usize, track: &[TrackEvent<'_>]) -> MidiTrack {
    let mut tick = 0u64;
    let mut name = None;
    let mut events = Vec::with_capacity(track.len());

    for event in track {
        let delta_tick = event.delta.as_int();
        tick += u64::from(delta_tick);

        let kind = convert_kind(&event.kind);
        if let (None, EventKind::TrackName(text)) = (&name, &kind) {
            name = Some(text.clone());
        }
        events.push(RawMidiEvent::new(track_index, tick, delta_tick, kind));
    }

    MidiTrack {
        name: name.unwrap_or_default(),
        events,
    }
}

fn convert_kind(kind: &TrackEventKind<'_>) -> EventKind {
    match kind {
        TrackEventKind::Midi { channel, message } => match message {
            MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                channel: channel.as_int(),
                note: key.as_int(),
                velocity: vel.as_int(),
            },
            MidiMessage::NoteOff { key, vel } => EventKind::NoteOff {
                channel: channel.as_int(),
                note: key.as_int(),
                velocity: vel.as_int(),
            },
            _ => EventKind::Other,
        },
        TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
            EventKind::TrackName(String::from_utf8_lossy(raw).into_owned())
        }
        TrackEventKind::Meta(MetaMessage::Tempo(micros)) => EventKind::SetTempo(micros.as_int()),
        TrackEventKind::Meta(MetaMessage::EndOfTrack) => EventKind::EndOfTrack,
        _ => EventKind::Other,
    }
}
