// tests/common/mod.rs

#![allow(dead_code)]

use melody_player::audio::RecordingBackend;
use melody_player::playback::{ManualClock, PlaybackController};
use melody_player::PlayerConfig;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Variable-length quantity encoding of a delta time
pub fn vlq(mut value: u32) -> Vec<u8> {
    let mut out = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        out.insert(0, (value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    out
}

/// Builds one MTrk chunk from events given in tick order
#[derive(Default)]
pub struct TrackBuilder {
    body: Vec<u8>,
    tick: u32,
}

impl TrackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn at(mut self, tick: u32, event: &[u8]) -> Self {
        assert!(tick >= self.tick, "events must be added in tick order");
        self.body.extend(vlq(tick - self.tick));
        self.body.extend_from_slice(event);
        self.tick = tick;
        self
    }

    pub fn name(self, tick: u32, name: &str) -> Self {
        let mut event = vec![0xFF, 0x03];
        event.extend(vlq(name.len() as u32));
        event.extend_from_slice(name.as_bytes());
        self.at(tick, &event)
    }

    pub fn tempo(self, tick: u32, micros: u32) -> Self {
        let [_, a, b, c] = micros.to_be_bytes();
        self.at(tick, &[0xFF, 0x51, 0x03, a, b, c])
    }

    pub fn note_on(self, tick: u32, note: u8, velocity: u8) -> Self {
        self.at(tick, &[0x90, note, velocity])
    }

    pub fn note_off(self, tick: u32, note: u8) -> Self {
        self.at(tick, &[0x80, note, 0x40])
    }

    /// Terminate with End of Track at `tick` and return the chunk bytes
    pub fn end(self, tick: u32) -> Vec<u8> {
        let track = self.at(tick, &[0xFF, 0x2F, 0x00]);
        let mut out = b"MTrk".to_vec();
        out.extend_from_slice(&(track.body.len() as u32).to_be_bytes());
        out.extend(track.body);
        out
    }
}

/// Assemble a complete file from track chunks
pub fn smf(format: u16, ticks_per_quarter: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = b"MThd".to_vec();
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&format.to_be_bytes());
    out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    out.extend_from_slice(&ticks_per_quarter.to_be_bytes());
    for track in tracks {
        out.extend_from_slice(track);
    }
    out
}

/// Two tracks, 480 tpq, 120 BPM: C4 on at tick 960 (1.0s), off at tick 1920 (2.0s)
pub fn two_track_song() -> Vec<u8> {
    let conductor = TrackBuilder::new()
        .name(0, "Demo Song")
        .tempo(0, 500_000)
        .end(0);
    let piano = TrackBuilder::new()
        .name(0, "Piano")
        .note_on(960, 60, 100)
        .note_off(1920, 60)
        .end(1920);
    smf(1, 480, &[conductor, piano])
}

/// 480 tpq, 120 BPM: C4 0.5s-1.5s, D4 2.0s-2.5s, E4 2.5s-3.0s
pub fn three_notes() -> Vec<u8> {
    let track = TrackBuilder::new()
        .tempo(0, 500_000)
        .note_on(480, 60, 100)
        .note_off(1440, 60)
        .note_on(1920, 62, 100)
        .note_off(2400, 62)
        .note_on(2400, 64, 127)
        .note_off(2880, 64)
        .end(2880);
    smf(0, 480, &[track])
}

/// A single short note at tick 0, 96 tpq, default tempo
pub fn single_note(note: u8) -> Vec<u8> {
    let track = TrackBuilder::new()
        .name(0, "Other")
        .note_on(0, note, 100)
        .note_off(96, note)
        .end(96);
    smf(0, 96, &[track])
}

pub fn test_config() -> PlayerConfig {
    let mut config = PlayerConfig::default();
    config.fetch.use_system_proxy = false;
    config.fetch.timeout_secs = 10;
    config
}

pub fn player(clock: &ManualClock, backend: &RecordingBackend) -> PlaybackController {
    PlaybackController::with_clock(
        Box::new(backend.clone()),
        test_config(),
        Arc::new(clock.clone()),
    )
}

/// A player with `bytes` already loaded
pub fn loaded_player(
    clock: &ManualClock,
    backend: &RecordingBackend,
    bytes: Vec<u8>,
) -> PlaybackController {
    let mut player = player(clock, backend);
    player.load(bytes);
    player
        .wait_for_load(Duration::from_secs(5))
        .expect("fixture should load");
    player
}

/// Serve exactly one HTTP response on 127.0.0.1, returning the base URL.
/// The response is written once `release` yields (or immediately if it is `None`).
pub fn serve_once(
    status_line: &'static str,
    body: Vec<u8>,
    release: Option<crossbeam_channel::Receiver<()>>,
) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));

    let handle = std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        if let Some(release) = release {
            let _ = release.recv();
        }
        let header = format!(
            "HTTP/1.1 {}\r\nContent-Type: audio/midi\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status_line,
            body.len()
        );
        let _ = stream.write_all(header.as_bytes());
        let _ = stream.write_all(&body);
        let _ = stream.flush();
    });

    (url, handle)
}
