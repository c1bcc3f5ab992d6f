// src/playback/state.rs

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackStatus {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Error,
}

impl PlaybackStatus {
    /// Whether a document is loaded and transport commands apply
    pub fn has_document(self) -> bool {
        matches!(
            self,
            PlaybackStatus::Ready
                | PlaybackStatus::Playing
                | PlaybackStatus::Paused
                | PlaybackStatus::Ended
        )
    }
}

/// Name and size of the loaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackInfo {
    pub name: String,
    pub track_count: usize,
}

/// Observable player state. Only the controller writes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub position_ticks: u64,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub active_notes: BTreeSet<u8>,
    /// 0..=100
    pub volume: u8,
    pub muted: bool,
    pub track_info: Option<TrackInfo>,
    pub error_message: Option<String>,
}

impl PlaybackState {
    pub fn new(volume: u8, muted: bool) -> Self {
        PlaybackState {
            status: PlaybackStatus::Idle,
            position_ticks: 0,
            position_seconds: 0.0,
            duration_seconds: 0.0,
            active_notes: BTreeSet::new(),
            volume: volume.min(100),
            muted,
            track_info: None,
            error_message: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    /// "m:ss / m:ss"
    pub fn time_display(&self) -> String {
        format!(
            "{} / {}",
            format_clock(self.position_seconds),
            format_clock(self.duration_seconds)
        )
    }

    /// Position as a fraction of the duration, for progress bars
    pub fn progress(&self) -> f64 {
        if self.duration_seconds > 0.0 {
            (self.position_seconds / self.duration_seconds).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(80, false)
    }
}

/// Format seconds as "m:ss"
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Read-only view of the state, shareable across threads
#[derive(Clone)]
pub struct StateWatcher {
    inner: Arc<RwLock<PlaybackState>>,
}

impl StateWatcher {
    pub(crate) fn new(inner: Arc<RwLock<PlaybackState>>) -> Self {
        StateWatcher { inner }
    }

    pub fn snapshot(&self) -> PlaybackState {
        self.inner.read().clone()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.inner.read().status
    }

    pub fn position_seconds(&self) -> f64 {
        self.inner.read().position_seconds
    }
}
