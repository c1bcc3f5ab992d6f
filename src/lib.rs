// src/lib.rs

//! MIDI playback engine: decodes Standard MIDI Files, sequences their events against a
//! tempo-aware clock and drives note voices on an injected synthesizer.

pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod playback;
pub mod visualizer;

pub use config::PlayerConfig;
pub use error::{DecodeError, PlayerError, Result};
pub use playback::{MidiSource, PlaybackController, PlaybackState, PlaybackStatus};
