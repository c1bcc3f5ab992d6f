// src/playback/mod.rs

pub mod clock;
pub mod controller;
pub mod dispatcher;
pub mod sequencer;
pub mod source;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::PlaybackController;
pub use dispatcher::VoiceDispatcher;
pub use sequencer::{Advance, Sequencer, TransportStatus};
pub use source::MidiSource;
pub use state::{format_clock, PlaybackState, PlaybackStatus, StateWatcher, TrackInfo};
