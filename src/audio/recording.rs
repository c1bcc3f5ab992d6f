// src/audio/recording.rs

//! A headless backend that records every call instead of making sound.

use crate::audio::{AudioBackend, Synthesizer, VoiceHandle};
use crate::error::SynthesisUnavailableError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// One call made against the synthesizer
#[derive(Debug, Clone, PartialEq)]
pub enum SynthCall {
    Play {
        note: u8,
        gain: f64,
        start: Instant,
        voice: VoiceHandle,
    },
    Stop {
        voice: VoiceHandle,
    },
}

#[derive(Default)]
struct Journal {
    calls: Vec<SynthCall>,
    next_voice: u64,
    opened: usize,
    live: usize,
}

/// Cloneable handle: keep one clone to inspect what the player did
#[derive(Clone, Default)]
pub struct RecordingBackend {
    journal: Arc<Mutex<Journal>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SynthCall> {
        self.journal.lock().calls.clone()
    }

    pub fn clear(&self) {
        self.journal.lock().calls.clear();
    }

    /// Notes started, in order
    pub fn played_notes(&self) -> Vec<u8> {
        self.journal
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                SynthCall::Play { note, .. } => Some(*note),
                SynthCall::Stop { .. } => None,
            })
            .collect()
    }

    /// Notes stopped, in order, resolved through their voice handles
    pub fn stopped_notes(&self) -> Vec<u8> {
        let journal = self.journal.lock();
        journal
            .calls
            .iter()
            .filter_map(|call| match call {
                SynthCall::Stop { voice } => journal.calls.iter().find_map(|c| match c {
                    SynthCall::Play { note, voice: v, .. } if v == voice => Some(*note),
                    _ => None,
                }),
                SynthCall::Play { .. } => None,
            })
            .collect()
    }

    /// Gains passed to every started voice, in order
    pub fn gains(&self) -> Vec<f64> {
        self.journal
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                SynthCall::Play { gain, .. } => Some(*gain),
                SynthCall::Stop { .. } => None,
            })
            .collect()
    }

    /// How many times the output was opened
    pub fn open_count(&self) -> usize {
        self.journal.lock().opened
    }

    /// Synthesizers opened and not yet dropped
    pub fn open_synths(&self) -> usize {
        self.journal.lock().live
    }
}

impl AudioBackend for RecordingBackend {
    fn open(&mut self) -> Result<Box<dyn Synthesizer>, SynthesisUnavailableError> {
        let mut journal = self.journal.lock();
        journal.opened += 1;
        journal.live += 1;
        Ok(Box::new(RecordingSynth {
            journal: Arc::clone(&self.journal),
        }))
    }
}

struct RecordingSynth {
    journal: Arc<Mutex<Journal>>,
}

impl Synthesizer for RecordingSynth {
    fn play_note(&mut self, note: u8, gain: f64, start: Instant) -> VoiceHandle {
        let mut journal = self.journal.lock();
        journal.next_voice += 1;
        let voice = VoiceHandle(journal.next_voice);
        journal.calls.push(SynthCall::Play {
            note,
            gain,
            start,
            voice,
        });
        voice
    }

    fn stop_note(&mut self, voice: VoiceHandle) {
        self.journal.lock().calls.push(SynthCall::Stop { voice });
    }
}

impl Drop for RecordingSynth {
    fn drop(&mut self) {
        let mut journal = self.journal.lock();
        journal.live = journal.live.saturating_sub(1);
    }
}
