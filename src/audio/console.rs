// src/audio/console.rs

use crate::audio::{AudioBackend, Synthesizer, VoiceHandle};
use crate::error::SynthesisUnavailableError;
use std::collections::HashMap;
use std::time::Instant;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Scientific pitch name, e.g. 60 -> "C4"
pub fn note_name(note: u8) -> String {
    let octave = (note / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(note % 12) as usize], octave)
}

/// Backend for the console player: voices are logged, not rendered
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleBackend;

impl AudioBackend for ConsoleBackend {
    fn open(&mut self) -> Result<Box<dyn Synthesizer>, SynthesisUnavailableError> {
        Ok(Box::new(ConsoleSynth::default()))
    }
}

#[derive(Default)]
struct ConsoleSynth {
    next_voice: u64,
    sounding: HashMap<VoiceHandle, (u8, Instant)>,
}

impl Synthesizer for ConsoleSynth {
    fn play_note(&mut self, note: u8, gain: f64, start: Instant) -> VoiceHandle {
        self.next_voice += 1;
        let voice = VoiceHandle(self.next_voice);
        self.sounding.insert(voice, (note, start));
        log::debug!("note on  {:<4} gain {:.2}", note_name(note), gain);
        voice
    }

    fn stop_note(&mut self, voice: VoiceHandle) {
        if let Some((note, start)) = self.sounding.remove(&voice) {
            log::debug!(
                "note off {:<4} after {:.3}s",
                note_name(note),
                start.elapsed().as_secs_f64()
            );
        }
    }
}
