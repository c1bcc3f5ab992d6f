// src/audio/mod.rs

//! The seam between the player and whatever actually makes sound.
//!
//! The player only decides *when* a note starts or stops and at what gain. A backend opens the
//! output device once; the resulting [`Synthesizer`] is owned by an [`AudioSession`] that is
//! acquired on first play and released when the session is dropped.

pub mod console;
pub mod recording;

pub use console::ConsoleBackend;
pub use recording::{RecordingBackend, SynthCall};

use crate::error::SynthesisUnavailableError;
use std::time::Instant;

/// Identifies one sounding voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceHandle(pub u64);

/// An initialized audio output that can start and stop voices
pub trait Synthesizer: Send {
    /// Start sounding `note` at `gain` (0.0..=1.0)
    fn play_note(&mut self, note: u8, gain: f64, start: Instant) -> VoiceHandle;

    fn stop_note(&mut self, voice: VoiceHandle);
}

/// Opens the audio output device
pub trait AudioBackend: Send {
    fn open(&mut self) -> Result<Box<dyn Synthesizer>, SynthesisUnavailableError>;
}

enum Slot {
    Closed,
    Open(Box<dyn Synthesizer>),
    Unavailable(SynthesisUnavailableError),
}

/// Lazily opened, explicitly owned audio output
pub struct AudioSession {
    backend: Box<dyn AudioBackend>,
    slot: Slot,
}

impl AudioSession {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        AudioSession {
            backend,
            slot: Slot::Closed,
        }
    }

    /// Open the output on first use. A failed open is permanent for this session.
    pub fn acquire(&mut self) -> Result<&mut dyn Synthesizer, SynthesisUnavailableError> {
        if let Slot::Closed = self.slot {
            self.slot = match self.backend.open() {
                Ok(synth) => {
                    log::info!("Audio output acquired");
                    Slot::Open(synth)
                }
                Err(e) => {
                    log::error!("Audio output unavailable: {}", e.reason);
                    Slot::Unavailable(e)
                }
            };
        }

        match &mut self.slot {
            Slot::Open(synth) => {
                let synth: &mut dyn Synthesizer = synth.as_mut();
                Ok(synth)
            }
            Slot::Unavailable(e) => Err(e.clone()),
            Slot::Closed => Err(SynthesisUnavailableError::new("audio session closed")),
        }
    }

    /// The open synthesizer, without trying to open one
    pub fn synth(&mut self) -> Option<&mut dyn Synthesizer> {
        match &mut self.slot {
            Slot::Open(synth) => {
                let synth: &mut dyn Synthesizer = synth.as_mut();
                Some(synth)
            }
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.slot, Slot::Open(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.slot, Slot::Unavailable(_))
    }

    /// Drop the synthesizer. A later `acquire` opens a fresh one.
    pub fn release(&mut self) {
        if let Slot::Open(_) = self.slot {
            log::info!("Audio output released");
            self.slot = Slot::Closed;
        }
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.release();
    }
}
