// src/config.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// 0..=100
    pub default_volume: u8,
    pub start_muted: bool,
    pub skip_seconds: f64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub use_system_proxy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VisualizerConfig {
    pub bar_count: usize,
    pub floor: f32,
    pub peak: f32,
    pub decay_per_frame: f32,
    pub frame_ms: u64,
    pub release_drop: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub playback: PlaybackConfig,
    pub fetch: FetchConfig,
    pub visualizer: VisualizerConfig,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            default_volume: 80,
            start_muted: false,
            skip_seconds: 10.0,
            poll_interval_ms: 100,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout_secs: 30,
            use_system_proxy: true,
        }
    }
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        VisualizerConfig {
            bar_count: 32,
            floor: 5.0,
            peak: 80.0,
            decay_per_frame: 0.95,
            frame_ms: 50,
            release_drop: 30.0,
        }
    }
}

impl PlayerConfig {
    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Configuration for unattended use: muted output, no proxy lookup
    pub fn headless() -> Self {
        let mut config = PlayerConfig::default();
        config.playback.start_muted = true;
        config.fetch.use_system_proxy = false;
        config
    }
}
