//! # Bloco - Block Music Runtime
//!
//! Audio runtime for a visual block-based music programming environment.
//!
//! ## Architecture
//!
//! Bloco is an umbrella crate that coordinates:
//! - **bloco-core** - Audio runtime (signal graph, instruments, sequencer, transport, loops)
//! - **bloco-program** - Block workspaces (typed model, compiler, async executor)
//! - **bloco-events** - Event dispatch (handler registry, debounced live updates, serial and MIDI sources)
//!
//! ## Quick Start
//!
//! ```ignore
//! use bloco::prelude::*;
//!
//! let engine = BlocoEngine::builder()
//!     .sample_rate(44_100.0)
//!     .build()?;
//!
//! // Compile a serialized block workspace and run it.
//! let program = engine.load_program(&workspace_json)?;
//! let run = engine.run(&program);
//!
//! // Live edits re-register event handlers without stopping the run.
//! engine.update_handlers(forest);
//!
//! // Panic button: silence everything, dispose instruments, keep handlers.
//! engine.reset();
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Headless engine, no hardware
//! - `audio-io` - CPAL output stream
//! - `midi-io` - Hardware MIDI note input
//! - `full` - Everything enabled

/// Re-export of bloco-core for direct access
pub use bloco_core as core;

// Core types
pub use bloco_core::{
    // Signal graph
    BlocoNet,
    // System
    BlocoSystem,
    BlocoSystemBuilder,
    ChordTable,
    DrumKind,
    DrumMachine,
    EffectConfig,
    EffectKind,
    EffectTarget,
    // Instruments
    EnvelopeConfig,
    FilterShape,
    GraphManager,
    InstrumentKind,
    InstrumentManager,
    LoopCallback,
    LoopScheduler,
    LoopTick,
    MelodyEvent,
    MelodyPitch,
    Partial,
    Polyphony,
    // Run control
    RunState,
    RunToken,
    // Sequencer
    SequencerManager,
    StepPattern,
    StepSlot,
    // Transport
    Transport,
    Waveform,
};

// FunDSP passthroughs used at the bloco API surface
pub use bloco_core::{AudioUnit, NodeId, Shared, Wave};

/// Re-export of bloco-program for direct access
pub use bloco_program as program;

pub use bloco_program::{
    BlockForest, CompiledHandler, CompiledProgram, Executor, HandlerSpec, KeyTrigger, Script,
};

/// Re-export of bloco-events for direct access
pub use bloco_events as events;

pub use bloco_events::{EventRegistry, HandlerKey, SerialSource, WorkspaceWatcher};

#[cfg(feature = "midi-io")]
pub use bloco_events::{MidiInputDevice, MidiNoteSource};

/// FunDSP prelude - oscillators, filters, effects, and graph operators.
///
/// Everything the graph closure in [`BlocoSystem::graph`] can build with:
/// `sine_hz`, `saw_hz`, `lowpass_hz`, `reverb_stereo`, the `>>` pipe
/// operator, and the rest of the FunDSP toolkit.
///
/// See FunDSP documentation for the full list: <https://docs.rs/fundsp>
pub use bloco_core::dsp;

mod builder;
mod engine;
mod error;

pub use builder::BlocoEngineBuilder;
pub use engine::BlocoEngine;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{BlocoEngine, BlocoEngineBuilder, Error, Result, Wave};

    // Core systems
    pub use crate::core::{
        BlocoSystem, BlocoSystemBuilder, DrumKind, EffectConfig, EffectKind, EffectTarget,
        EnvelopeConfig, InstrumentKind, Polyphony, RunToken, Waveform,
    };

    // Note and melody helpers
    pub use crate::core::{midi_to_hz, midi_to_note, note_to_midi, parse_melody, transpose};

    // Block programs
    pub use crate::program::{
        compile, compile_handlers, BlockForest, CompiledProgram, Executor, KeyTrigger,
    };

    // Event dispatch
    pub use crate::events::{EventRegistry, WorkspaceWatcher};

    #[cfg(feature = "midi-io")]
    pub use crate::events::MidiNoteSource;

    // FunDSP toolkit
    pub use crate::dsp::*;
}
