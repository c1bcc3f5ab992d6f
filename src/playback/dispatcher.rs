// src/playback/dispatcher.rs

use crate::audio::{Synthesizer, VoiceHandle};
use crate::midi::RawMidiEvent;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// A voice that is currently sounding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveVoice {
    pub voice: VoiceHandle,
    pub velocity: u8,
}

/// Turns due note events into synthesizer calls and tracks what is sounding.
///
/// Volume and mute apply to the next note started; voices already sounding keep their gain.
pub struct VoiceDispatcher {
    voices: BTreeMap<u8, ActiveVoice>,
    volume: u8,
    muted: bool,
}

impl VoiceDispatcher {
    pub fn new(volume: u8, muted: bool) -> Self {
        VoiceDispatcher {
            voices: BTreeMap::new(),
            volume: volume.min(100),
            muted,
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Gain for a note started now at `velocity`
    pub fn gain_for(&self, velocity: u8) -> f64 {
        if self.muted {
            return 0.0;
        }
        (velocity.min(127) as f64 / 127.0) * (self.volume as f64 / 100.0)
    }

    /// Handle one due event. Non-note events are ignored.
    pub fn on_event(&mut self, event: &RawMidiEvent, synth: &mut dyn Synthesizer, at: Instant) {
        if let Some((note, velocity)) = event.note_on() {
            // Retrigger: a note already sounding is cut before it starts again
            if let Some(previous) = self.voices.remove(&note) {
                synth.stop_note(previous.voice);
            }
            let voice = synth.play_note(note, self.gain_for(velocity), at);
            self.voices.insert(note, ActiveVoice { voice, velocity });
        } else if let Some(note) = event.note_off() {
            if let Some(active) = self.voices.remove(&note) {
                synth.stop_note(active.voice);
            }
        }
    }

    /// Stop every sounding voice. Returns the notes that were released.
    pub fn release_all(&mut self, synth: &mut dyn Synthesizer) -> Vec<u8> {
        let voices = std::mem::take(&mut self.voices);
        for active in voices.values() {
            synth.stop_note(active.voice);
        }
        voices.into_keys().collect()
    }

    /// Clear the active set when no synthesizer is open to stop voices on
    pub fn forget_all(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.voices).into_keys().collect()
    }

    pub fn active_notes(&self) -> BTreeSet<u8> {
        self.voices.keys().copied().collect()
    }

    /// Active notes with the velocity they were started at
    pub fn active_voices(&self) -> impl Iterator<Item = (u8, ActiveVoice)> + '_ {
        self.voices.iter().map(|(note, voice)| (*note, *voice))
    }

    pub fn is_sounding(&self, note: u8) -> bool {
        self.voices.contains_key(&note)
    }
}

impl Default for VoiceDispatcher {
    fn default() -> Self {
        Self::new(80, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioBackend, RecordingBackend};
    use crate::midi::EventKind;
    use approx::assert_relative_eq;

    fn on(note: u8, velocity: u8) -> RawMidiEvent {
        RawMidiEvent::new(0, 0, 0, EventKind::NoteOn { channel: 0, note, velocity })
    }

    fn off(note: u8) -> RawMidiEvent {
        RawMidiEvent::new(0, 0, 0, EventKind::NoteOff { channel: 0, note, velocity: 64 })
    }

    #[test]
    fn test_gain_from_velocity_and_volume() {
        let mut dispatcher = VoiceDispatcher::new(50, false);
        assert_relative_eq!(dispatcher.gain_for(127), 0.5);
        dispatcher.set_volume(200);
        assert_eq!(dispatcher.volume(), 100);
        assert_relative_eq!(dispatcher.gain_for(127), 1.0);
        dispatcher.set_muted(true);
        assert_eq!(dispatcher.gain_for(127), 0.0);
    }

    #[test]
    fn test_note_on_then_off() {
        let mut backend = RecordingBackend::new();
        let mut synth = backend.open().unwrap();
        let mut dispatcher = VoiceDispatcher::new(100, false);
        let now = Instant::now();

        dispatcher.on_event(&on(60, 127), synth.as_mut(), now);
        assert!(dispatcher.is_sounding(60));
        dispatcher.on_event(&off(60), synth.as_mut(), now);
        assert!(dispatcher.active_notes().is_empty());

        assert_eq!(backend.played_notes(), vec![60]);
        assert_eq!(backend.stopped_notes(), vec![60]);
    }

    #[test]
    fn test_velocity_zero_releases() {
        let mut backend = RecordingBackend::new();
        let mut synth = backend.open().unwrap();
        let mut dispatcher = VoiceDispatcher::default();
        let now = Instant::now();

        dispatcher.on_event(&on(64, 90), synth.as_mut(), now);
        dispatcher.on_event(&on(64, 0), synth.as_mut(), now);
        assert!(!dispatcher.is_sounding(64));
        assert_eq!(backend.played_notes(), vec![64]);
        assert_eq!(backend.stopped_notes(), vec![64]);
    }

    #[test]
    fn test_off_for_silent_note_is_ignored() {
        let mut backend = RecordingBackend::new();
        let mut synth = backend.open().unwrap();
        let mut dispatcher = VoiceDispatcher::default();
        dispatcher.on_event(&off(70), synth.as_mut(), Instant::now());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_volume_is_not_retroactive() {
        let mut backend = RecordingBackend::new();
        let mut synth = backend.open().unwrap();
        let mut dispatcher = VoiceDispatcher::new(100, false);
        let now = Instant::now();

        dispatcher.on_event(&on(60, 127), synth.as_mut(), now);
        dispatcher.set_volume(25);
        dispatcher.on_event(&on(62, 127), synth.as_mut(), now);
        let gains = backend.gains();
        assert_relative_eq!(gains[0], 1.0);
        assert_relative_eq!(gains[1], 0.25);
    }

    #[test]
    fn test_retrigger_stops_previous_voice() {
        let mut backend = RecordingBackend::new();
        let mut synth = backend.open().unwrap();
        let mut dispatcher = VoiceDispatcher::default();
        let now = Instant::now();

        dispatcher.on_event(&on(60, 100), synth.as_mut(), now);
        dispatcher.on_event(&on(60, 100), synth.as_mut(), now);
        assert_eq!(backend.played_notes(), vec![60, 60]);
        assert_eq!(backend.stopped_notes(), vec![60]);
        assert_eq!(dispatcher.active_notes().len(), 1);
    }

    #[test]
    fn test_release_all_empties_active_set() {
        let mut backend = RecordingBackend::new();
        let mut synth = backend.open().unwrap();
        let mut dispatcher = VoiceDispatcher::default();
        let now = Instant::now();
        for note in [60, 64, 67] {
            dispatcher.on_event(&on(note, 100), synth.as_mut(), now);
        }

        let released = dispatcher.release_all(synth.as_mut());
        assert_eq!(released, vec![60, 64, 67]);
        assert!(dispatcher.active_notes().is_empty());
        assert_eq!(backend.stopped_notes(), vec![60, 64, 67]);
    }
}
