//! Error types for bloco-core.

use thiserror::Error;

/// Error type for bloco-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid tempo: {0}. Must be between 20.0 and 400.0 BPM")]
    InvalidTempo(f32),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Unknown note name: {0}")]
    UnknownNote(String),

    #[error("Invalid rhythm pattern: expected 16 slots, got {0}")]
    InvalidPattern(usize),

    #[error("Sample not loaded: {0}")]
    SampleNotReady(String),

    #[error("Sample file error: {0}")]
    SampleFile(#[from] hound::Error),

    #[cfg(feature = "audio-io")]
    #[error("Audio device not available: {0}")]
    InvalidDevice(String),

    #[cfg(feature = "audio-io")]
    #[error("No default stream config")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "audio-io")]
    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "audio-io")]
    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "audio-io")]
    #[error("Failed to enumerate devices")]
    DevicesError(#[from] cpal::DevicesError),

    #[cfg(feature = "audio-io")]
    #[error("Failed to read device name")]
    DeviceNameError(#[from] cpal::DeviceNameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
