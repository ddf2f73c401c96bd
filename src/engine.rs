//! The assembled engine: audio system, program executor, event registry,
//! and the async runtime that ties them together.

use crate::{Error, Result};

use bloco_core::{BlocoSystem, RunToken, Wave};
use bloco_events::{EventRegistry, WorkspaceWatcher};
use bloco_program::{compile, BlockForest, CompiledProgram, Executor};

use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;

/// One complete bloco engine.
///
/// Owns the audio system, a multi-threaded tokio runtime for program and
/// handler execution, and the event registry with its debounced workspace
/// watcher. Programs run as tasks on the owned runtime, so every call here
/// returns without blocking on playback.
///
/// # Example
///
/// ```ignore
/// use bloco::BlocoEngine;
///
/// let engine = BlocoEngine::builder().tempo(100.0).build()?;
/// let program = engine.load_program(&workspace_json)?;
/// let run = engine.run(&program);
/// // ... later
/// engine.reset();
/// ```
pub struct BlocoEngine {
    system: Arc<BlocoSystem>,
    executor: Executor,
    registry: Arc<EventRegistry>,
    watcher: WorkspaceWatcher,
    /// Dropped last so tasks spawned by the fields above wind down first.
    runtime: Runtime,
}

impl BlocoEngine {
    pub fn builder() -> crate::BlocoEngineBuilder {
        crate::BlocoEngineBuilder::default()
    }

    pub(crate) fn from_parts(
        system: Arc<BlocoSystem>,
        executor: Executor,
        registry: Arc<EventRegistry>,
        watcher: WorkspaceWatcher,
        runtime: Runtime,
    ) -> Self {
        Self {
            system,
            executor,
            registry,
            watcher,
            runtime,
        }
    }

    /// The underlying audio system: graph, instruments, sequencer,
    /// transport, loops.
    pub fn system(&self) -> &Arc<BlocoSystem> {
        &self.system
    }

    /// The shared script executor. Variables set here are visible to
    /// programs and event handlers alike.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// The event handler registry.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Parse a serialized workspace and compile it to a program.
    pub fn load_program(&self, json: &str) -> Result<CompiledProgram> {
        let forest = BlockForest::from_json(json).map_err(Error::Program)?;
        Ok(compile(&forest))
    }

    /// Start a program run on the engine runtime.
    ///
    /// The previous run is superseded before this returns; the program
    /// itself executes as a task. The returned token cancels on
    /// [`BlocoEngine::stop`], [`BlocoEngine::reset`], or the next `run`.
    pub fn run(&self, program: &CompiledProgram) -> RunToken {
        if program.is_empty() {
            info!("Program is empty, nothing to run");
        }
        let token = self.system.begin_run();
        let executor = self.executor.clone();
        let program = program.clone();
        let run = token.clone();
        self.runtime.spawn(async move {
            executor.run_program_with(&program, &run).await;
        });
        token
    }

    /// Parse, compile, and run a serialized workspace in one call.
    pub fn run_json(&self, json: &str) -> Result<RunToken> {
        let program = self.load_program(json)?;
        Ok(self.run(&program))
    }

    /// Stop the running program: cancel its token, clear loops, pause the
    /// clock. Instruments, channels, and effects stay in place.
    pub fn stop(&self) {
        self.system.run_state().cancel();
        self.system.loops().stop_all();
        self.system.transport().stop();
    }

    /// The single authoritative cancel-everything.
    ///
    /// On top of [`BlocoSystem::reset_audio_engine_state`] this interrupts
    /// in-flight event handler bodies and clears script state. Registered
    /// handlers survive and keep answering events against the clean engine.
    pub fn reset(&self) {
        self.system.reset_audio_engine_state();
        self.registry.interrupt();
        self.executor.clear();
    }

    /// Register every hat in `forest` immediately, replacing the current
    /// set. Returns the number of registered handlers.
    pub fn register_handlers(&self, forest: &BlockForest) -> usize {
        self.registry.register_all(forest)
    }

    /// Report a workspace edit. Handler re-registration is debounced and
    /// applies once the edits pause.
    pub fn update_handlers(&self, forest: BlockForest) {
        self.watcher.notify(forest);
    }

    /// Render the current graph headless. See
    /// [`BlocoSystem::render_offline`].
    pub fn render_offline(&self, duration: f64) -> Wave {
        self.system.render_offline(duration)
    }

    /// Open the default (or configured) output device and start streaming.
    #[cfg(feature = "audio-io")]
    pub fn start_output(&self) -> Result<()> {
        Ok(self.system.start_output(None)?)
    }
}
