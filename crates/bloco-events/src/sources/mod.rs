//! External event sources feeding the registry.

pub(crate) mod serial;

#[cfg(feature = "midi-io")]
pub(crate) mod midi;

pub use serial::SerialSource;

#[cfg(feature = "midi-io")]
pub use midi::{MidiInputDevice, MidiNoteSource};
