// src/error.rs

//! Error types for decoding, source acquisition, audio and transport control.

use std::path::PathBuf;
use thiserror::Error;

/// A MIDI byte stream that could not be turned into a [`crate::midi::MidiDocument`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("not a MIDI file: missing MThd header")]
    MissingHeader,

    #[error("chunk {index} declares {declared} bytes but only {available} remain")]
    Truncated {
        index: usize,
        declared: u32,
        available: usize,
    },

    #[error("unsupported MIDI format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported MIDI timing: SMPTE time code")]
    UnsupportedTiming,

    #[error("malformed MIDI data: {0}")]
    Malformed(String),
}

impl From<midly::Error> for DecodeError {
    fn from(e: midly::Error) -> Self {
        DecodeError::Malformed(e.to_string())
    }
}

/// Failure to obtain the raw bytes of a MIDI source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceFetchError {
    #[error("failed to fetch MIDI: {status} {reason}")]
    Http { status: u16, reason: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("no MIDI source provided")]
    NoSource,
}

impl From<reqwest::Error> for SourceFetchError {
    fn from(e: reqwest::Error) -> Self {
        SourceFetchError::Network(e.to_string())
    }
}

/// The audio output could not be opened.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("audio output unavailable: {reason}")]
pub struct SynthesisUnavailableError {
    pub reason: String,
}

impl SynthesisUnavailableError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Everything that can make a load fail. Crosses the loader channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] SourceFetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("load interrupted before completion")]
    Interrupted,
}

/// Errors surfaced by the playback facade.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    #[error("failed to load MIDI: {0}")]
    Load(#[from] LoadError),

    #[error(transparent)]
    SynthesisUnavailable(#[from] SynthesisUnavailableError),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<DecodeError> for PlayerError {
    fn from(e: DecodeError) -> Self {
        PlayerError::Load(LoadError::Decode(e))
    }
}

impl From<SourceFetchError> for PlayerError {
    fn from(e: SourceFetchError) -> Self {
        PlayerError::Load(LoadError::Fetch(e))
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
