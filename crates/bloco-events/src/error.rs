//! Error types for event sources and handler registration.

use thiserror::Error;

/// Errors from event sources.
///
/// Handler dispatch itself never returns errors: a failing handler body is
/// logged and dropped so the rest of the registry keeps running. These
/// variants cover the fallible edges, opening readers and reaching MIDI
/// hardware.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while opening or reading an event source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// MIDI device error (enumeration, selection).
    #[error("MIDI device error: {0}")]
    MidiDevice(String),

    /// MIDI port error (connection, communication).
    #[error("MIDI port error: {0}")]
    MidiPort(String),
}

#[cfg(feature = "midi-io")]
impl From<midir::InitError> for Error {
    fn from(err: midir::InitError) -> Self {
        Error::MidiDevice(err.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(err: midir::ConnectError<midir::MidiInput>) -> Self {
        Error::MidiPort(err.to_string())
    }
}

/// Convenience result type for event source operations.
pub type Result<T> = std::result::Result<T, Error>;
