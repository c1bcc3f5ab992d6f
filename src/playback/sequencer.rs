// src/playback/sequencer.rs

//! Transport: owns the playback position and decides which events are due.
//!
//! Position is anchored to a wall-clock instant when playback starts and recomputed from that
//! anchor through the tempo map on every update, so it never accumulates polling error.

use crate::midi::{RawMidiEvent, SharedDocument, TempoMap};
use std::time::{Duration, Instant};

/// Tolerance when comparing event ticks against a fractional position
const TICK_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Idle,
    Ready,
    Playing,
    Paused,
    Ended,
}

/// What one call to [`Sequencer::advance`] produced
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Advance {
    /// Due events in tick order, stream order within a tick
    pub events: Vec<RawMidiEvent>,
    /// The transport reached the end of the sequence during this update
    pub ended: bool,
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    instant: Instant,
    seconds: f64,
}

pub struct Sequencer {
    document: Option<SharedDocument>,
    timeline: Vec<RawMidiEvent>,
    tempo: TempoMap,
    cursor: usize,
    /// Fractional tick position
    position: f64,
    anchor: Option<Anchor>,
    status: TransportStatus,
    session: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Sequencer {
            document: None,
            timeline: Vec::new(),
            tempo: TempoMap::new(1, &[]),
            cursor: 0,
            position: 0.0,
            anchor: None,
            status: TransportStatus::Idle,
            session: 0,
        }
    }

    /// Replace the current document and rewind. Anything scheduled for the old one is gone.
    pub fn load(&mut self, document: SharedDocument) {
        self.timeline = document.merged_events();
        self.tempo = TempoMap::from_document(&document);
        self.document = Some(document);
        self.cursor = 0;
        self.position = 0.0;
        self.anchor = None;
        self.status = TransportStatus::Ready;
        self.session += 1;
        log::debug!(
            "Sequencer loaded {} events, {} tempo segments, {:.2}s",
            self.timeline.len(),
            self.tempo.segment_count(),
            self.duration_seconds()
        );
    }

    /// Drop the document. Nothing from it fires after this returns.
    pub fn unload(&mut self) {
        self.document = None;
        self.timeline.clear();
        self.cursor = 0;
        self.position = 0.0;
        self.anchor = None;
        self.status = TransportStatus::Idle;
        self.session += 1;
    }

    /// Changes every time the loaded document is replaced or dropped
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn status(&self) -> TransportStatus {
        self.status
    }

    pub fn document(&self) -> Option<&SharedDocument> {
        self.document.as_ref()
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo
    }

    pub fn total_ticks(&self) -> u64 {
        self.document.as_ref().map(|d| d.total_ticks).unwrap_or(0)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.tempo.tick_to_seconds(self.total_ticks())
    }

    pub fn position_ticks(&self) -> u64 {
        (self.position + TICK_EPSILON).floor() as u64
    }

    pub fn position_seconds(&self) -> f64 {
        self.tempo.seconds_at(self.position)
    }

    /// Start or resume. Returns false (and logs) when there is nothing to do.
    pub fn play(&mut self, now: Instant) -> bool {
        match self.status {
            TransportStatus::Idle => {
                log::warn!("play ignored: no document loaded");
                return false;
            }
            TransportStatus::Playing => {
                log::warn!("play ignored: already playing");
                return false;
            }
            TransportStatus::Ended => self.rewind(),
            TransportStatus::Ready | TransportStatus::Paused => {}
        }

        self.anchor = Some(Anchor {
            instant: now,
            seconds: self.position_seconds(),
        });
        self.status = TransportStatus::Playing;
        true
    }

    /// Freeze the position at `now`
    pub fn pause(&mut self, now: Instant) -> bool {
        if self.status != TransportStatus::Playing {
            log::debug!("pause ignored: not playing");
            return false;
        }
        self.position = self.position_at(now);
        self.anchor = None;
        self.status = TransportStatus::Paused;
        true
    }

    /// Rewind to tick 0 and become Ready
    pub fn stop(&mut self) -> bool {
        if self.status == TransportStatus::Idle {
            log::debug!("stop ignored: no document loaded");
            return false;
        }
        self.rewind();
        self.status = TransportStatus::Ready;
        true
    }

    /// Move to `seconds` (clamped to the duration) without replaying skipped events.
    /// Returns the clamped target, or `None` without a document.
    pub fn seek(&mut self, seconds: f64, now: Instant) -> Option<f64> {
        if self.status == TransportStatus::Idle {
            log::warn!("seek ignored: no document loaded");
            return None;
        }

        let duration = self.duration_seconds();
        let target = if seconds.is_nan() {
            0.0
        } else {
            seconds.clamp(0.0, duration)
        };

        self.position = self.tempo.tick_at(target).min(self.total_ticks() as f64);
        let position = self.position;
        self.cursor = self
            .timeline
            .partition_point(|e| (e.tick as f64) < position - TICK_EPSILON);

        match self.status {
            TransportStatus::Playing => {
                self.anchor = Some(Anchor {
                    instant: now,
                    seconds: self.position_seconds(),
                });
            }
            TransportStatus::Ended => self.status = TransportStatus::Ready,
            _ => {}
        }
        Some(target)
    }

    pub fn skip_forward(&mut self, delta_seconds: f64, now: Instant) -> Option<f64> {
        if self.status == TransportStatus::Playing {
            self.position = self.position_at(now);
        }
        let target = self.position_seconds() + delta_seconds;
        self.seek(target, now)
    }

    /// Bring the position up to `now` and collect every event that became due
    pub fn advance(&mut self, now: Instant) -> Advance {
        let mut advance = Advance::default();
        if self.status != TransportStatus::Playing {
            return advance;
        }

        let total = self.total_ticks() as f64;
        self.position = self.position_at(now);
        let reached_end = self.position >= total - TICK_EPSILON;
        if reached_end {
            self.position = total;
        }

        while let Some(event) = self.timeline.get(self.cursor) {
            if event.tick as f64 > self.position + TICK_EPSILON {
                break;
            }
            advance.events.push(event.clone());
            self.cursor += 1;
        }

        if reached_end && self.cursor >= self.timeline.len() {
            self.anchor = None;
            self.status = TransportStatus::Ended;
            advance.ended = true;
            log::info!("Reached end of sequence at {:.2}s", self.position_seconds());
        }
        advance
    }

    /// When the next event or the end of the sequence falls due, if playing
    pub fn next_deadline(&self) -> Option<Instant> {
        let anchor = self.anchor?;
        if self.status != TransportStatus::Playing {
            return None;
        }
        let tick = self
            .timeline
            .get(self.cursor)
            .map(|e| e.tick)
            .unwrap_or_else(|| self.total_ticks());
        let wait = (self.tempo.tick_to_seconds(tick) - anchor.seconds).max(0.0);
        Some(anchor.instant + Duration::from_secs_f64(wait))
    }

    fn rewind(&mut self) {
        self.cursor = 0;
        self.position = 0.0;
        self.anchor = None;
    }

    /// Tick position at `now`, derived from the play anchor
    fn position_at(&self, now: Instant) -> f64 {
        match self.anchor {
            Some(anchor) => {
                let elapsed = now.saturating_duration_since(anchor.instant).as_secs_f64();
                self.tempo
                    .tick_at(anchor.seconds + elapsed)
                    .min(self.total_ticks() as f64)
            }
            None => self.position,
        }
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{EventKind, MidiDocument, MidiTrack};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn ev(track: usize, tick: u64, kind: EventKind) -> RawMidiEvent {
        RawMidiEvent::new(track, tick, 0, kind)
    }

    fn on(note: u8) -> EventKind {
        EventKind::NoteOn { channel: 0, note, velocity: 100 }
    }

    fn off(note: u8) -> EventKind {
        EventKind::NoteOff { channel: 0, note, velocity: 0 }
    }

    /// 480 tpq, 120 BPM, notes at beats 0..4
    fn scale() -> SharedDocument {
        let events = vec![
            ev(0, 0, EventKind::SetTempo(500_000)),
            ev(0, 0, on(60)),
            ev(0, 480, off(60)),
            ev(0, 480, on(62)),
            ev(0, 960, off(62)),
            ev(0, 960, on(64)),
            ev(0, 1440, off(64)),
            ev(0, 1920, EventKind::EndOfTrack),
        ];
        Arc::new(MidiDocument::new(480, vec![MidiTrack { name: "Scale".into(), events }]))
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_play_requires_document() {
        let mut seq = Sequencer::new();
        assert!(!seq.play(Instant::now()));
        assert_eq!(seq.status(), TransportStatus::Idle);
        assert_eq!(seq.seek(1.0, Instant::now()), None);
    }

    #[test]
    fn test_events_fire_on_time() {
        let mut seq = Sequencer::new();
        seq.load(scale());
        assert_relative_eq!(seq.duration_seconds(), 2.0);

        let t0 = Instant::now();
        assert!(seq.play(t0));
        let first = seq.advance(t0);
        assert_eq!(first.events.len(), 2);

        let before = seq.advance(t0 + secs(0.49));
        assert!(before.events.is_empty());

        let at = seq.advance(t0 + secs(0.5));
        assert_eq!(at.events.len(), 2);
        assert_eq!(at.events[0].note_off(), Some(60));
        assert_eq!(at.events[1].note_on(), Some((62, 100)));
        assert_eq!(seq.position_ticks(), 480);
    }

    #[test]
    fn test_double_play_is_ignored() {
        let mut seq = Sequencer::new();
        seq.load(scale());
        let t0 = Instant::now();
        assert!(seq.play(t0));
        assert!(!seq.play(t0 + secs(0.3)));
        seq.advance(t0 + secs(0.6));
        assert_relative_eq!(seq.position_seconds(), 0.6, epsilon = 1e-9);
    }

    #[test]
    fn test_pause_resume_keeps_position() {
        let mut seq = Sequencer::new();
        seq.load(scale());
        let t0 = Instant::now();
        seq.play(t0);
        seq.advance(t0 + secs(0.3));
        assert!(seq.pause(t0 + secs(0.7)));
        let paused_tick = seq.position_ticks();
        assert_eq!(paused_tick, 672);

        // Time passing while paused does not move the transport
        assert!(seq.advance(t0 + secs(5.0)).events.is_empty());
        assert_eq!(seq.position_ticks(), paused_tick);

        let t1 = t0 + secs(10.0);
        seq.play(t1);
        seq.advance(t1);
        assert_eq!(seq.position_ticks(), paused_tick);
        seq.advance(t1 + secs(0.1));
        assert_relative_eq!(seq.position_seconds(), 0.8, epsilon = 1e-9);
    }

    #[test]
    fn test_seek_skips_intervening_events() {
        let mut seq = Sequencer::new();
        seq.load(scale());
        let t0 = Instant::now();
        assert_eq!(seq.seek(0.75, t0), Some(0.75));
        assert_relative_eq!(seq.position_seconds(), 0.75, epsilon = 1e-9);
        assert_eq!(seq.status(), TransportStatus::Ready);

        seq.play(t0);
        let due = seq.advance(t0);
        assert!(due.events.is_empty());
        let next = seq.advance(t0 + secs(0.25));
        let kinds: Vec<_> = next.events.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(kinds, vec![off(62), on(64)]);
    }

    #[test]
    fn test_seek_to_event_tick_keeps_event() {
        let mut seq = Sequencer::new();
        seq.load(scale());
        let t0 = Instant::now();
        seq.seek(0.5, t0);
        seq.play(t0);
        let due = seq.advance(t0);
        assert_eq!(due.events.len(), 2);
        assert_eq!(due.events[1].note_on(), Some((62, 100)));
    }

    #[test]
    fn test_seek_clamps() {
        let mut seq = Sequencer::new();
        seq.load(scale());
        let t0 = Instant::now();
        assert_eq!(seq.seek(-4.0, t0), Some(0.0));
        assert_eq!(seq.seek(99.0, t0), Some(2.0));
        assert_eq!(seq.position_ticks(), 1920);
    }

    #[test]
    fn test_seek_while_playing_reanchors() {
        let mut seq = Sequencer::new();
        seq.load(scale());
        let t0 = Instant::now();
        seq.play(t0);
        seq.advance(t0 + secs(0.2));
        seq.seek(1.5, t0 + secs(0.2));
        assert_eq!(seq.status(), TransportStatus::Playing);
        seq.advance(t0 + secs(0.3));
        assert_relative_eq!(seq.position_seconds(), 1.6, epsilon = 1e-9);
    }

    #[test]
    fn test_skip_forward_from_live_position() {
        let mut seq = Sequencer::new();
        seq.load(scale());
        let t0 = Instant::now();
        seq.play(t0);
        assert_eq!(seq.skip_forward(0.5, t0 + secs(0.25)), Some(0.75));
        assert_eq!(seq.skip_forward(10.0, t0 + secs(0.25)), Some(2.0));
    }

    #[test]
    fn test_end_of_sequence() {
        let mut seq = Sequencer::new();
        seq.load(scale());
        let t0 = Instant::now();
        seq.play(t0);
        assert_eq!(seq.next_deadline(), Some(t0));
        seq.advance(t0);
        assert_eq!(seq.next_deadline(), Some(t0 + secs(0.5)));

        let last = seq.advance(t0 + secs(3.0));
        assert!(last.ended);
        assert_eq!(last.events.len(), 6);
        assert_eq!(seq.status(), TransportStatus::Ended);
        assert_eq!(seq.position_ticks(), 1920);
        assert_eq!(seq.next_deadline(), None);

        // Playing again from the end starts over
        let t1 = t0 + secs(4.0);
        assert!(seq.play(t1));
        assert_eq!(seq.advance(t1).events.len(), 2);
    }

    #[test]
    fn test_seek_from_ended_is_ready() {
        let mut seq = Sequencer::new();
        seq.load(scale());
        let t0 = Instant::now();
        seq.play(t0);
        seq.advance(t0 + secs(3.0));
        seq.seek(0.0, t0 + secs(3.0));
        assert_eq!(seq.status(), TransportStatus::Ready);
    }

    #[test]
    fn test_stop_rewinds() {
        let mut seq = Sequencer::new();
        seq.load(scale());
        let t0 = Instant::now();
        seq.play(t0);
        seq.advance(t0 + secs(1.2));
        assert!(seq.stop());
        assert_eq!(seq.status(), TransportStatus::Ready);
        assert_eq!(seq.position_ticks(), 0);
        assert!(seq.advance(t0 + secs(1.5)).events.is_empty());
    }

    #[test]
    fn test_load_discards_previous_schedule() {
        let mut seq = Sequencer::new();
        seq.load(scale());
        let session = seq.session();
        let t0 = Instant::now();
        seq.play(t0);
        seq.advance(t0 + secs(0.1));

        let other = Arc::new(MidiDocument::new(
            96,
            vec![MidiTrack { name: String::new(), events: vec![ev(0, 96, on(40))] }],
        ));
        seq.load(other);
        assert_ne!(seq.session(), session);
        assert_eq!(seq.status(), TransportStatus::Ready);
        assert!(seq.advance(t0 + secs(1.0)).events.is_empty());
    }

    #[test]
    fn test_tempo_change_moves_events() {
        // 120 BPM for one beat, then 60 BPM: tick 960 lands at 0.5 + 1.0 seconds
        let events = vec![
            ev(0, 0, EventKind::SetTempo(500_000)),
            ev(0, 480, EventKind::SetTempo(1_000_000)),
            ev(0, 960, on(70)),
            ev(0, 960, EventKind::EndOfTrack),
        ];
        let mut seq = Sequencer::new();
        seq.load(Arc::new(MidiDocument::new(480, vec![MidiTrack { name: String::new(), events }])));
        assert_relative_eq!(seq.duration_seconds(), 1.5);

        let t0 = Instant::now();
        seq.play(t0);
        let early = seq.advance(t0 + secs(1.2));
        assert!(early.events.iter().all(|e| e.note_on().is_none()));
        let due = seq.advance(t0 + secs(1.5));
        assert_eq!(due.events[0].note_on(), Some((70, 100)));
        assert!(due.ended);
    }
}
