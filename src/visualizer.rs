// src/visualizer.rs

//! Level-bar visualizer driven by the set of sounding notes.

use crate::config::VisualizerConfig;
use std::collections::BTreeMap;
use std::time::Duration;

/// Headroom above `peak` reached by a full-velocity note
const VELOCITY_HEADROOM: f32 = 20.0;

/// A row of bars (0..=100) that jump when notes start and decay over time
pub struct LevelBars {
    config: VisualizerConfig,
    bars: Vec<f32>,
    /// Notes seen active on the previous update, with their velocity
    previous: BTreeMap<u8, u8>,
    pending: Duration,
}

impl LevelBars {
    pub fn new(config: &VisualizerConfig) -> Self {
        let count = config.bar_count.max(1);
        LevelBars {
            config: config.clone(),
            bars: vec![config.floor; count],
            previous: BTreeMap::new(),
            pending: Duration::ZERO,
        }
    }

    /// Which bar a note drives
    pub fn bar_for(&self, note: u8) -> usize {
        note as usize % self.bars.len()
    }

    /// Fold in the currently active notes (note -> velocity) and `elapsed` time since the last update
    pub fn update(&mut self, active: &BTreeMap<u8, u8>, elapsed: Duration) {
        self.decay(elapsed);

        for (&note, &velocity) in active {
            if !self.previous.contains_key(&note) {
                let index = self.bar_for(note);
                let level = self.config.peak + VELOCITY_HEADROOM * (velocity as f32 / 127.0);
                self.bars[index] = self.bars[index].max(level.min(100.0));
            }
        }

        let released: Vec<usize> = self
            .previous
            .keys()
            .filter(|note| !active.contains_key(note))
            .map(|&note| self.bar_for(note))
            .collect();
        for index in released {
            self.bars[index] = (self.bars[index] - self.config.release_drop).max(self.config.floor);
        }

        self.previous = active.clone();
    }

    /// Drop everything back to the floor
    pub fn reset(&mut self) {
        self.bars.fill(self.config.floor);
        self.previous.clear();
        self.pending = Duration::ZERO;
    }

    pub fn bars(&self) -> &[f32] {
        &self.bars
    }

    /// RGBA color for a bar: hue by position, brightness by level
    pub fn bar_color(&self, index: usize) -> [f32; 4] {
        let hue = (index as f32 / self.bars.len() as f32) * 360.0;
        let level = self.bars.get(index).copied().unwrap_or(self.config.floor);
        let value = 0.5 + (level / 100.0) * 0.5;
        let (r, g, b) = hsv_to_rgb(hue, 0.8, value);
        [r, g, b, 0.7 + level / 400.0]
    }

    fn decay(&mut self, elapsed: Duration) {
        let frame = Duration::from_millis(self.config.frame_ms.max(1));
        self.pending += elapsed;
        let mut frames = 0i32;
        while self.pending >= frame {
            self.pending -= frame;
            frames += 1;
        }
        if frames == 0 {
            return;
        }

        let factor = self.config.decay_per_frame.powi(frames);
        let floor = self.config.floor;
        for bar in &mut self.bars {
            *bar = (*bar * factor).max(floor);
        }
    }
}

/// Convert HSV color to RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let c = v * s;
    let h_prime = h / 60.0;
    let x = c * (1.0 - ((h_prime % 2.0) - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h_prime < 1.0 {
        (c, x, 0.0)
    } else if h_prime < 2.0 {
        (x, c, 0.0)
    } else if h_prime < 3.0 {
        (0.0, c, x)
    } else if h_prime < 4.0 {
        (0.0, x, c)
    } else if h_prime < 5.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (r + m, g + m, b + m)
}
