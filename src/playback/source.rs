// src/playback/source.rs

use crate::config::FetchConfig;
use crate::error::{LoadError, SourceFetchError};
use crate::midi::{MidiDecoder, MidiDocument};
use std::path::PathBuf;
use std::time::Duration;

/// Where MIDI bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiSource {
    Bytes(Vec<u8>),
    File(PathBuf),
    Url(String),
}

impl MidiSource {
    /// Parse a command-line style argument: http(s) URLs are fetched, anything else is a path
    pub fn from_arg(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            MidiSource::Url(arg.to_string())
        } else {
            MidiSource::File(PathBuf::from(arg))
        }
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            MidiSource::Bytes(bytes) => format!("{} bytes in memory", bytes.len()),
            MidiSource::File(path) => path.display().to_string(),
            MidiSource::Url(url) => url.clone(),
        }
    }
}

impl From<Vec<u8>> for MidiSource {
    fn from(bytes: Vec<u8>) -> Self {
        MidiSource::Bytes(bytes)
    }
}

/// Read the raw bytes of a source. Blocks; run it off the interaction thread.
pub fn fetch_bytes(source: MidiSource, config: &FetchConfig) -> Result<Vec<u8>, SourceFetchError> {
    match source {
        MidiSource::Bytes(bytes) => Ok(bytes),
        MidiSource::File(path) => std::fs::read(&path).map_err(|e| SourceFetchError::Io {
            path,
            message: e.to_string(),
        }),
        MidiSource::Url(url) => fetch_url(&url, config),
    }
}

fn fetch_url(url: &str, config: &FetchConfig) -> Result<Vec<u8>, SourceFetchError> {
    if url.trim().is_empty() {
        return Err(SourceFetchError::NoSource);
    }

    let mut builder =
        reqwest::blocking::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
    if !config.use_system_proxy {
        builder = builder.no_proxy();
    }
    let client = builder.build()?;

    log::debug!("GET {}", url);
    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceFetchError::Http {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
        });
    }

    Ok(response.bytes()?.to_vec())
}

/// Fetch and decode in one step
pub fn load_document(source: MidiSource, config: &FetchConfig) -> Result<MidiDocument, LoadError> {
    let bytes = fetch_bytes(source, config)?;
    let document = MidiDecoder::new().decode(&bytes)?;
    Ok(document)
}
