// src/midi/tempo.rs

use crate::midi::event::{MidiDocument, DEFAULT_TEMPO_MICROS};

/// A run of ticks played at one tempo
#[derive(Debug, Clone, Copy, PartialEq)]
struct TempoSegment {
    start_tick: u64,
    start_seconds: f64,
    micros_per_quarter: u32,
}

impl TempoSegment {
    fn ticks_to_seconds(&self, ticks: f64, ticks_per_quarter: u16) -> f64 {
        ticks * self.micros_per_quarter as f64 / (ticks_per_quarter as f64 * 1_000_000.0)
    }

    fn seconds_to_ticks(&self, seconds: f64, ticks_per_quarter: u16) -> f64 {
        seconds * (ticks_per_quarter as f64 * 1_000_000.0) / self.micros_per_quarter as f64
    }
}

/// Converts between ticks and seconds, honoring every tempo change in the file
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    ticks_per_quarter: u16,
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    /// Build from `(tick, micros per quarter)` pairs in tick order. Later entries at the same tick win.
    pub fn new(ticks_per_quarter: u16, changes: &[(u64, u32)]) -> Self {
        let ticks_per_quarter = ticks_per_quarter.max(1);
        let mut segments = vec![TempoSegment {
            start_tick: 0,
            start_seconds: 0.0,
            micros_per_quarter: DEFAULT_TEMPO_MICROS,
        }];

        for &(tick, micros) in changes {
            if micros == 0 {
                log::warn!("Ignoring zero tempo at tick {}", tick);
                continue;
            }
            let Some(last) = segments.last_mut() else {
                continue;
            };
            if tick <= last.start_tick {
                last.micros_per_quarter = micros;
                continue;
            }
            let start_seconds = last.start_seconds
                + last.ticks_to_seconds((tick - last.start_tick) as f64, ticks_per_quarter);
            segments.push(TempoSegment {
                start_tick: tick,
                start_seconds,
                micros_per_quarter: micros,
            });
        }

        TempoMap {
            ticks_per_quarter,
            segments,
        }
    }

    pub fn from_document(doc: &MidiDocument) -> Self {
        Self::new(doc.ticks_per_quarter_note, &doc.tempo_changes())
    }

    /// Number of distinct tempo segments
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Tempo in effect at `tick`
    pub fn tempo_at(&self, tick: u64) -> u32 {
        self.segment_for_tick(tick as f64).micros_per_quarter
    }

    /// Seconds elapsed from the start to a (possibly fractional) tick
    pub fn seconds_at(&self, tick: f64) -> f64 {
        let tick = tick.max(0.0);
        let segment = self.segment_for_tick(tick);
        segment.start_seconds
            + segment.ticks_to_seconds(tick - segment.start_tick as f64, self.ticks_per_quarter)
    }

    /// Seconds elapsed from the start to `tick`
    pub fn tick_to_seconds(&self, tick: u64) -> f64 {
        self.seconds_at(tick as f64)
    }

    /// Fractional tick reached after `seconds`
    pub fn tick_at(&self, seconds: f64) -> f64 {
        let seconds = seconds.max(0.0);
        let index = self
            .segments
            .partition_point(|s| s.start_seconds <= seconds)
            .saturating_sub(1);
        let segment = &self.segments[index];
        segment.start_tick as f64
            + segment.seconds_to_ticks(seconds - segment.start_seconds, self.ticks_per_quarter)
    }

    /// Nearest whole tick reached after `seconds`
    pub fn seconds_to_tick(&self, seconds: f64) -> u64 {
        self.tick_at(seconds).round() as u64
    }

    fn segment_for_tick(&self, tick: f64) -> &TempoSegment {
        let index = self
            .segments
            .partition_point(|s| s.start_tick as f64 <= tick)
            .saturating_sub(1);
        &self.segments[index]
    }
}
