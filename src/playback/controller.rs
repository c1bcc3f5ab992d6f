// src/playback/controller.rs

//! The facade presentation code talks to.
//!
//! Owns the sequencer, the voice dispatcher, the audio session and the observable
//! [`PlaybackState`]. Loads run on a worker thread; everything else happens on the caller's
//! thread, driven by [`PlaybackController::poll`].

use crate::audio::{AudioBackend, AudioSession};
use crate::config::PlayerConfig;
use crate::error::{LoadError, PlayerError, Result, SynthesisUnavailableError};
use crate::midi::{MidiDocument, SharedDocument};
use crate::playback::clock::{Clock, SystemClock};
use crate::playback::dispatcher::VoiceDispatcher;
use crate::playback::sequencer::{Sequencer, TransportStatus};
use crate::playback::source::{load_document, MidiSource};
use crate::playback::state::{PlaybackState, PlaybackStatus, StateWatcher, TrackInfo};
use crate::visualizer::LevelBars;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

type LoadResult = std::result::Result<MidiDocument, LoadError>;

struct PendingLoad {
    receiver: Receiver<LoadResult>,
    description: String,
    started: Instant,
}

pub struct PlaybackController {
    config: PlayerConfig,
    clock: Arc<dyn Clock>,
    state: Arc<RwLock<PlaybackState>>,
    sequencer: Sequencer,
    dispatcher: VoiceDispatcher,
    audio: AudioSession,
    visualizer: LevelBars,
    pending: Option<PendingLoad>,
    subscribers: Vec<Sender<PlaybackState>>,
    last_published: Option<PlaybackState>,
    last_poll: Instant,
    on_ended: Option<Box<dyn FnMut() + Send>>,
}

impl PlaybackController {
    pub fn new(backend: Box<dyn AudioBackend>, config: PlayerConfig) -> Self {
        Self::with_clock(backend, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: Box<dyn AudioBackend>,
        config: PlayerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let volume = config.playback.default_volume.min(100);
        let muted = config.playback.start_muted;
        let now = clock.now();
        PlaybackController {
            visualizer: LevelBars::new(&config.visualizer),
            config,
            clock,
            state: Arc::new(RwLock::new(PlaybackState::new(volume, muted))),
            sequencer: Sequencer::new(),
            dispatcher: VoiceDispatcher::new(volume, muted),
            audio: AudioSession::new(backend),
            pending: None,
            subscribers: Vec::new(),
            last_published: None,
            last_poll: now,
            on_ended: None,
        }
    }

    // ----- observation -----

    /// Snapshot of the current state
    pub fn state(&self) -> PlaybackState {
        self.state.read().clone()
    }

    /// Read-only handle for other threads
    pub fn watch(&self) -> StateWatcher {
        StateWatcher::new(Arc::clone(&self.state))
    }

    /// Receive a snapshot after every state change, in order
    pub fn subscribe(&mut self) -> Receiver<PlaybackState> {
        let (sender, receiver) = unbounded();
        let _ = sender.send(self.state());
        self.subscribers.push(sender);
        receiver
    }

    /// Called once each time playback reaches the end of the sequence
    pub fn on_ended(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_ended = Some(Box::new(callback));
    }

    pub fn document(&self) -> Option<&SharedDocument> {
        self.sequencer.document()
    }

    pub fn visualizer(&self) -> &LevelBars {
        &self.visualizer
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// When the next event or the end of the sequence falls due
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sequencer.next_deadline()
    }

    /// When the driver should call [`poll`](Self::poll) next
    pub fn next_wake(&self) -> Instant {
        let interval = self.clock.now() + Duration::from_millis(self.config.playback.poll_interval_ms);
        match self.sequencer.next_deadline() {
            Some(deadline) => deadline.min(interval),
            None => interval,
        }
    }

    // ----- loading -----

    /// Start loading a new document. Playback of the current one stops immediately; its
    /// remaining events never fire. Completion is picked up by `poll` or `wait_for_load`.
    pub fn load(&mut self, source: impl Into<MidiSource>) {
        let source = source.into();
        let description = source.describe();
        log::info!("Loading MIDI: {}", description);

        self.silence();
        self.sequencer.unload();
        self.visualizer.reset();
        // Replacing the pending load drops its receiver; a stale result has nowhere to go
        self.pending = None;

        let (sender, receiver) = bounded(1);
        let fetch = self.config.fetch.clone();
        let spawned = std::thread::Builder::new()
            .name("midi-loader".to_string())
            .spawn(move || {
                let _ = sender.send(load_document(source, &fetch));
            });

        {
            let mut state = self.state.write();
            state.status = PlaybackStatus::Loading;
            state.track_info = None;
            state.error_message = None;
        }

        match spawned {
            Ok(_) => {
                self.pending = Some(PendingLoad {
                    receiver,
                    description,
                    started: self.clock.now(),
                });
                self.sync(None);
            }
            Err(e) => {
                log::error!("Failed to start loader thread: {}", e);
                let _ = self.finish_load(Err(LoadError::Interrupted));
            }
        }
    }

    /// Block until the pending load completes or `timeout` passes
    pub fn wait_for_load(&mut self, timeout: Duration) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return if self.state.read().status.has_document() {
                Ok(())
            } else {
                Err(PlayerError::InvalidOperation("no load in progress".to_string()))
            };
        };

        match pending.receiver.recv_timeout(timeout) {
            Ok(result) => self.complete(pending, result),
            Err(RecvTimeoutError::Timeout) => {
                self.pending = Some(pending);
                Err(PlayerError::InvalidOperation(format!(
                    "load still in progress after {:?}",
                    timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.complete(pending, Err(LoadError::Interrupted))
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    fn complete(&mut self, pending: PendingLoad, result: LoadResult) -> Result<()> {
        let elapsed = self.clock.now().saturating_duration_since(pending.started);
        log::debug!("Load of {} finished after {:?}", pending.description, elapsed);
        self.finish_load(result)
    }

    fn finish_load(&mut self, result: LoadResult) -> Result<()> {
        match result {
            Ok(document) => {
                let info = TrackInfo {
                    name: document.display_name(),
                    track_count: document.tracks.len(),
                };
                log::info!(
                    "Loaded \"{}\": {} track{}",
                    info.name,
                    info.track_count,
                    if info.track_count == 1 { "" } else { "s" }
                );
                self.sequencer.load(Arc::new(document));
                {
                    let mut state = self.state.write();
                    state.track_info = Some(info);
                    state.error_message = None;
                }
                self.sync(Some(PlaybackStatus::Ready));
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load MIDI: {}", e);
                {
                    let mut state = self.state.write();
                    state.track_info = None;
                    state.error_message = Some(e.to_string());
                }
                self.sync(Some(PlaybackStatus::Error));
                Err(PlayerError::Load(e))
            }
        }
    }

    // ----- transport -----

    pub fn play(&mut self) -> Result<()> {
        if self.audio.is_unavailable() {
            return Err(self.audio_unavailable());
        }
        self.ensure_document("play")?;
        if self.sequencer.status() == TransportStatus::Playing {
            log::debug!("play ignored: already playing");
            return Ok(());
        }

        let acquired = self.audio.acquire().map(|_| ());
        if let Err(e) = acquired {
            self.silence();
            self.sequencer.stop();
            self.state.write().error_message = Some(e.to_string());
            self.sync(Some(PlaybackStatus::Error));
            return Err(PlayerError::SynthesisUnavailable(e));
        }

        let now = self.clock.now();
        if self.sequencer.play(now) {
            log::info!("Playing from {:.2}s", self.sequencer.position_seconds());
            self.last_poll = now;
            self.step(now);
        }
        Ok(())
    }

    /// Freeze the transport. Every sounding note is released; resuming re-triggers nothing.
    pub fn pause(&mut self) -> Result<()> {
        self.ensure_document("pause")?;
        let now = self.clock.now();
        // Dispatch everything due up to the pause point first
        if self.sequencer.status() == TransportStatus::Playing {
            self.step(now);
        }
        if self.sequencer.pause(now) {
            self.silence();
            log::debug!("Paused at {:.2}s", self.sequencer.position_seconds());
            self.sync(Some(PlaybackStatus::Paused));
        }
        Ok(())
    }

    pub fn toggle_playback(&mut self) -> Result<()> {
        if self.sequencer.status() == TransportStatus::Playing {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Rewind to the start and release every sounding note
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_document("stop")?;
        self.silence();
        self.sequencer.stop();
        self.visualizer.reset();
        log::info!("Stopped");
        self.sync(Some(PlaybackStatus::Ready));
        Ok(())
    }

    /// Jump to `seconds`, clamped to the duration. Notes whose start was skipped never sound.
    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        self.ensure_document("seek")?;
        let now = self.clock.now();
        self.silence();
        if let Some(target) = self.sequencer.seek(seconds, now) {
            log::debug!("Seek to {:.2}s", target);
        }
        let status = transport_status(self.sequencer.status());
        self.sync(Some(status));
        Ok(())
    }

    /// Seek to a fraction (0.0..=1.0) of the duration
    pub fn seek_fraction(&mut self, fraction: f64) -> Result<()> {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.seek(fraction * self.sequencer.duration_seconds())
    }

    /// Skip ahead by the configured step
    pub fn skip_forward(&mut self) -> Result<()> {
        self.skip_forward_by(self.config.playback.skip_seconds)
    }

    pub fn skip_forward_by(&mut self, delta_seconds: f64) -> Result<()> {
        self.ensure_document("skip forward")?;
        let now = self.clock.now();
        self.silence();
        if let Some(target) = self.sequencer.skip_forward(delta_seconds, now) {
            log::debug!("Skip forward to {:.2}s", target);
        }
        let status = transport_status(self.sequencer.status());
        self.sync(Some(status));
        Ok(())
    }

    /// Back to the start; keeps playing if it was
    pub fn skip_to_start(&mut self) -> Result<()> {
        let was_playing = self.sequencer.status() == TransportStatus::Playing;
        self.stop()?;
        if was_playing {
            self.play()?;
        }
        Ok(())
    }

    // ----- output -----

    /// 0..=100. Applies to notes started from now on.
    pub fn set_volume(&mut self, volume: u8) {
        self.dispatcher.set_volume(volume);
        self.state.write().volume = self.dispatcher.volume();
        self.sync(None);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.dispatcher.set_muted(muted);
        self.state.write().muted = muted;
        self.sync(None);
    }

    pub fn toggle_mute(&mut self) {
        let muted = !self.dispatcher.is_muted();
        self.set_muted(muted);
    }

    // ----- driving -----

    /// Periodic update: pick up finished loads, advance the transport, refresh the state
    pub fn poll(&mut self) {
        if let Some(pending) = self.pending.take() {
            match pending.receiver.try_recv() {
                Ok(result) => {
                    let _ = self.complete(pending, result);
                }
                Err(TryRecvError::Empty) => self.pending = Some(pending),
                Err(TryRecvError::Disconnected) => {
                    let _ = self.complete(pending, Err(LoadError::Interrupted));
                }
            }
        }

        let now = self.clock.now();
        self.step(now);
    }

    /// Advance to `now`, dispatch due events, update visuals and publish
    fn step(&mut self, now: Instant) {
        // Bars only decay while the transport runs
        let elapsed = if self.sequencer.status() == TransportStatus::Playing {
            now.saturating_duration_since(self.last_poll)
        } else {
            Duration::ZERO
        };
        let advance = self.sequencer.advance(now);
        if let Some(synth) = self.audio.synth() {
            for event in &advance.events {
                self.dispatcher.on_event(event, synth, now);
            }
        }

        let active: BTreeMap<u8, u8> = self
            .dispatcher
            .active_voices()
            .map(|(note, voice)| (note, voice.velocity))
            .collect();
        self.visualizer.update(&active, elapsed);
        self.last_poll = now;

        if advance.ended {
            self.silence();
            self.visualizer.reset();
            self.sync(Some(PlaybackStatus::Ended));
            if let Some(callback) = self.on_ended.as_mut() {
                callback();
            }
        } else if self.sequencer.status() == TransportStatus::Playing {
            self.sync(Some(PlaybackStatus::Playing));
        } else {
            self.sync(None);
        }
    }

    // ----- internals -----

    /// Transport commands need a loaded document and no load in flight
    fn ensure_document(&self, operation: &str) -> Result<()> {
        let status = self.state.read().status;
        if status == PlaybackStatus::Loading {
            log::warn!("{} rejected: a load is in progress", operation);
            return Err(PlayerError::InvalidOperation(format!(
                "{} while loading",
                operation
            )));
        }
        if !status.has_document() {
            log::warn!("{} rejected: no document loaded", operation);
            return Err(PlayerError::InvalidOperation(format!(
                "{} without a loaded document",
                operation
            )));
        }
        Ok(())
    }

    fn audio_unavailable(&self) -> PlayerError {
        log::debug!("play ignored: audio output unavailable");
        PlayerError::SynthesisUnavailable(SynthesisUnavailableError::new(
            "audio output failed to open earlier",
        ))
    }

    /// Release every sounding note
    fn silence(&mut self) {
        let released = match self.audio.synth() {
            Some(synth) => self.dispatcher.release_all(synth),
            None => self.dispatcher.forget_all(),
        };
        if !released.is_empty() {
            log::debug!("Released {} sounding notes", released.len());
        }
    }

    /// Copy transport and voice state into the observable state, then publish if it changed
    fn sync(&mut self, status: Option<PlaybackStatus>) {
        let snapshot = {
            let mut state = self.state.write();
            if let Some(status) = status {
                state.status = status;
            }
            state.position_ticks = self.sequencer.position_ticks();
            state.position_seconds = self.sequencer.position_seconds();
            state.duration_seconds = self.sequencer.duration_seconds();
            state.active_notes = self.dispatcher.active_notes();
            state.volume = self.dispatcher.volume();
            state.muted = self.dispatcher.is_muted();
            state.clone()
        };

        if self.last_published.as_ref() == Some(&snapshot) {
            return;
        }
        self.subscribers
            .retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
        self.last_published = Some(snapshot);
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.silence();
        self.audio.release();
    }
}

fn transport_status(status: TransportStatus) -> PlaybackStatus {
    match status {
        TransportStatus::Idle => PlaybackStatus::Idle,
        TransportStatus::Ready => PlaybackStatus::Ready,
        TransportStatus::Playing => PlaybackStatus::Playing,
        TransportStatus::Paused => PlaybackStatus::Paused,
        TransportStatus::Ended => PlaybackStatus::Ended,
    }
}
