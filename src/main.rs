// src/main.rs

use melody_player::audio::ConsoleBackend;
use melody_player::playback::{MidiSource, PlaybackController, PlaybackStatus};
use melody_player::PlayerConfig;

use std::io::Write;
use std::time::{Duration, Instant};

const CONFIG_FILE: &str = "player.json";
const LOAD_TIMEOUT: Duration = Duration::from_secs(60);

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let Some(source) = args.get(1) else {
        eprintln!("usage: melody-player <file.mid | http(s)://url> [start-seconds]");
        std::process::exit(2);
    };
    let start_at = args.get(2).and_then(|s| s.parse::<f64>().ok());

    // Load or create config
    let config = PlayerConfig::load_from_file(CONFIG_FILE).unwrap_or_else(|_| {
        log::info!("No config file found, using defaults");
        let default = PlayerConfig::default();
        if let Err(e) = default.save_to_file(CONFIG_FILE) {
            log::warn!("Failed to save default config: {}", e);
        }
        default
    });

    let mut player = PlaybackController::new(Box::new(ConsoleBackend), config);
    player.load(MidiSource::from_arg(source));
    if let Err(e) = player.wait_for_load(LOAD_TIMEOUT) {
        log::error!("{}", e);
        std::process::exit(1);
    }

    let state = player.state();
    if let Some(info) = &state.track_info {
        println!(
            "\n{} ({} track{}, {})",
            info.name,
            info.track_count,
            if info.track_count == 1 { "" } else { "s" },
            melody_player::playback::format_clock(state.duration_seconds)
        );
    }

    if let Some(seconds) = start_at {
        if let Err(e) = player.seek(seconds) {
            log::warn!("Ignoring start position: {}", e);
        }
    }

    if let Err(e) = player.play() {
        log::error!("{}", e);
        std::process::exit(1);
    }

    // Run until the sequence ends, waking at each due event or poll interval
    loop {
        let wake = player.next_wake();
        let now = Instant::now();
        if wake > now {
            std::thread::sleep(wake - now);
        }
        player.poll();

        let state = player.state();
        print!("\r{}  ", state.time_display());
        let _ = std::io::stdout().flush();

        match state.status {
            PlaybackStatus::Ended => break,
            PlaybackStatus::Error => {
                log::error!(
                    "Playback failed: {}",
                    state.error_message.unwrap_or_default()
                );
                std::process::exit(1);
            }
            _ => {}
        }
    }

    println!();
    log::info!("Playback finished");
}
