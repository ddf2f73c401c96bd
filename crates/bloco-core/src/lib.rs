//! Audio runtime for block-built music programs.
//!
//! # Primary API
//!
//! - [`BlocoSystem`] / [`BlocoSystemBuilder`]: Main entry point
//! - [`GraphManager`]: Channels, effect chains, and the master bus
//! - [`InstrumentManager`]: Instrument lifecycle and note triggers
//! - [`SequencerManager`]: Drum hits, step patterns, melody strings
//! - [`Transport`] / [`LoopScheduler`]: Musical clock and synced loops
//!
//! # Feature-gated APIs
//!
//! - `"audio-io"`: CPAL output stream
//!
//! # Example
//!
//! ```ignore
//! use bloco_core::{BlocoSystem, InstrumentKind, Polyphony, Waveform};
//!
//! let system = BlocoSystem::builder().build()?;
//! system.instruments().create_instrument(
//!     "Lead",
//!     InstrumentKind::Oscillator { wave: Waveform::Sine },
//!     None,
//!     Polyphony::default(),
//! );
//! system.sequencer().play_note(None, "c4", 1.0, 0.8);
//! ```

pub mod error;
pub use error::{Error, Result};

mod system;
pub use system::{BlocoSystem, BlocoSystemBuilder, DEFAULT_SAMPLE_RATE};

pub(crate) mod graph;
pub use graph::{BlocoNet, EffectConfig, EffectKind, EffectTarget, FilterShape, GraphManager};

pub(crate) mod instrument;
pub use instrument::{
    EnvelopeConfig, InstrumentKind, InstrumentManager, Partial, Polyphony, Waveform,
};

pub(crate) mod sequencer;
pub use sequencer::{
    midi_to_hz, midi_to_note, note_to_midi, parse_melody, transpose, ChordTable, DrumKind,
    DrumMachine, MelodyEvent, MelodyPitch, SequencerManager, StepPattern, StepSlot, DRUM_CHANNEL,
    STEPS_PER_MEASURE,
};

pub(crate) mod transport;
pub use transport::{
    duration_to_beats, LoopCallback, LoopScheduler, LoopTick, Transport, BEATS_PER_MEASURE,
    DEFAULT_TEMPO, MAX_TEMPO, MIN_TEMPO,
};

mod run_state;
pub use run_state::{RunState, RunToken};

pub(crate) mod lockfree;
pub use lockfree::{AtomicDouble, AtomicFlag, AtomicFloat};

pub mod dsp {
    //! Re-export of fundsp::prelude for DSP building blocks.
    pub use fundsp::prelude::*;
}

pub use fundsp::net::NodeId;
pub use fundsp::prelude::{shared, AudioUnit, Shared};
pub use fundsp::realnet::NetBackend;
pub use fundsp::sequencer::{EventId, Fade, Sequencer};
pub use fundsp::wave::Wave;

#[cfg(feature = "audio-io")]
pub(crate) mod output;
