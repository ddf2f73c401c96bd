//! Builder for configuring and constructing a `BlocoEngine`.

use crate::{BlocoEngine, Result};

use bloco_core::BlocoSystemBuilder;
use bloco_events::{EventRegistry, WorkspaceWatcher};
use bloco_program::Executor;

use std::sync::Arc;

/// Configures and assembles a [`BlocoEngine`].
///
/// The audio system starts headless; opt into an output stream with
/// [`BlocoEngineBuilder::with_output`] (feature `audio-io`). The engine's
/// tokio runtime is private to it and sized with
/// [`BlocoEngineBuilder::worker_threads`].
///
/// # Example
///
/// ```ignore
/// use bloco::BlocoEngine;
///
/// let engine = BlocoEngine::builder()
///     .sample_rate(48_000.0)
///     .tempo(100.0)
///     .build()?;
/// ```
#[derive(Default)]
pub struct BlocoEngineBuilder {
    sample_rate: Option<f64>,
    tempo: Option<f32>,
    worker_threads: Option<usize>,

    #[cfg(feature = "audio-io")]
    with_output: bool,

    #[cfg(feature = "audio-io")]
    device_index: Option<usize>,
}

impl BlocoEngineBuilder {
    /// Sample rate for headless rendering. An output stream overrides this
    /// with the device's rate.
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Starting tempo in beats per minute.
    pub fn tempo(mut self, bpm: f32) -> Self {
        self.tempo = Some(bpm);
        self
    }

    /// Worker threads for the engine runtime. Default: tokio's default.
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = Some(count);
        self
    }

    /// Open the output stream during build.
    #[cfg(feature = "audio-io")]
    pub fn with_output(mut self) -> Self {
        self.with_output = true;
        self
    }

    /// Pick an output device by index (implies [`Self::with_output`]).
    #[cfg(feature = "audio-io")]
    pub fn output_device(mut self, index: usize) -> Self {
        self.device_index = Some(index);
        self.with_output = true;
        self
    }

    pub fn build(self) -> Result<BlocoEngine> {
        let mut system_builder = BlocoSystemBuilder::default();
        if let Some(rate) = self.sample_rate {
            system_builder = system_builder.sample_rate(rate);
        }
        if let Some(bpm) = self.tempo {
            system_builder = system_builder.tempo(bpm);
        }
        #[cfg(feature = "audio-io")]
        {
            if let Some(index) = self.device_index {
                system_builder = system_builder.output_device(index);
            } else if self.with_output {
                system_builder = system_builder.with_output();
            }
        }
        let system = Arc::new(system_builder.build()?);

        let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
        runtime_builder.enable_time().thread_name("bloco-worker");
        if let Some(count) = self.worker_threads {
            runtime_builder.worker_threads(count);
        }
        let runtime = runtime_builder.build()?;

        let executor = Executor::new(Arc::clone(&system));
        let registry = Arc::new(EventRegistry::new(
            executor.clone(),
            runtime.handle().clone(),
        ));
        let watcher = WorkspaceWatcher::new(Arc::clone(&registry));

        Ok(BlocoEngine::from_parts(
            system, executor, registry, watcher, runtime,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_settings_reach_the_system() {
        let engine = BlocoEngineBuilder::default()
            .sample_rate(48_000.0)
            .tempo(90.0)
            .worker_threads(2)
            .build()
            .unwrap();
        assert_eq!(engine.system().sample_rate(), 48_000.0);
        assert_eq!(engine.system().transport().tempo(), 90.0);
    }

    #[test]
    fn out_of_range_tempo_fails_the_build() {
        assert!(BlocoEngineBuilder::default().tempo(1000.0).build().is_err());
    }
}
