//! The assembled audio runtime.
//!
//! [`BlocoSystem`] wires one net, its managers, and the transport into a
//! single context object. Nothing here is process-global: two systems in
//! one process get two independent graphs and clocks, which is what makes
//! the whole runtime testable headless.

use crate::error::Result;
use crate::graph::{BlocoNet, GraphManager};
use crate::instrument::InstrumentManager;
use crate::lockfree::AtomicDouble;
#[cfg(feature = "audio-io")]
use crate::output::AudioOutput;
use crate::run_state::{RunState, RunToken};
use crate::sequencer::{DrumMachine, SequencerManager};
use crate::transport::{LoopScheduler, Transport, DEFAULT_TEMPO};
use fundsp::realnet::NetBackend;
use fundsp::wave::Wave;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// One complete audio engine instance.
pub struct BlocoSystem {
    net: Arc<Mutex<BlocoNet>>,
    /// Held until an output stream claims it; offline rendering never
    /// needs it.
    #[cfg_attr(not(feature = "audio-io"), allow(dead_code))]
    backend: Mutex<Option<NetBackend>>,
    graph: Arc<GraphManager>,
    instruments: Arc<InstrumentManager>,
    drums: Arc<DrumMachine>,
    sequencer: Arc<SequencerManager>,
    transport: Transport,
    loops: Arc<LoopScheduler>,
    run_state: Arc<RunState>,
    sample_rate: AtomicDouble,
    #[cfg(feature = "audio-io")]
    output: Mutex<Option<AudioOutput>>,
}

impl BlocoSystem {
    pub fn builder() -> BlocoSystemBuilder {
        BlocoSystemBuilder::default()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate.get()
    }

    /// Modify the DSP graph (non-realtime). Changes are committed to the
    /// audio thread when the closure returns.
    pub fn graph<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut BlocoNet) -> R,
    {
        let mut net = self.net.lock();
        let result = f(&mut net);
        net.commit();
        result
    }

    pub fn graph_manager(&self) -> &Arc<GraphManager> {
        &self.graph
    }

    pub fn instruments(&self) -> &Arc<InstrumentManager> {
        &self.instruments
    }

    pub fn sequencer(&self) -> &Arc<SequencerManager> {
        &self.sequencer
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn loops(&self) -> &Arc<LoopScheduler> {
        &self.loops
    }

    pub fn run_state(&self) -> &Arc<RunState> {
        &self.run_state
    }

    /// Start a program run: the previous run's token is cancelled, the
    /// clock starts, and the fresh token is returned.
    pub fn begin_run(&self) -> RunToken {
        self.transport.start();
        self.run_state.begin_run()
    }

    /// The single authoritative cancel-everything.
    ///
    /// Cancels the running script, clears every loop, stops and rewinds
    /// the clock, disposes every instrument, channel, and effect, and
    /// restores the sequencer's chord table and transposition. A run
    /// started afterwards sees a clean graph.
    pub fn reset_audio_engine_state(&self) {
        self.run_state.cancel();
        self.loops.stop_all();
        self.transport.zero();
        self.instruments.dispose_all();
        self.graph.reset();
        self.drums.rebuild(&self.net, &self.graph);
        self.sequencer.reset();
        info!("Audio engine state reset");
    }

    /// Render the current graph to an in-memory wave. Scheduled events
    /// and live parameter values are picked up; the live backend is not
    /// disturbed.
    pub fn render_offline(&self, duration: f64) -> Wave {
        self.net.lock().render_offline(self.sample_rate(), duration)
    }

    /// Open the default (or indexed) output device and start streaming.
    /// Idempotent once running.
    #[cfg(feature = "audio-io")]
    pub fn start_output(&self, device_index: Option<usize>) -> Result<()> {
        use crate::error::Error;

        let mut output = self.output.lock();
        if output.is_some() {
            return Ok(());
        }
        let backend = self
            .backend
            .lock()
            .take()
            .ok_or_else(|| Error::InvalidConfig("Net backend already taken".into()))?;
        let running = AudioOutput::start(device_index, backend)?;
        self.sample_rate.set(running.sample_rate());
        {
            let mut net = self.net.lock();
            net.set_sample_rate(running.sample_rate());
            net.commit();
        }
        info!(
            "Output stream open: {} channels at {} Hz",
            running.channels(),
            running.sample_rate()
        );
        *output = Some(running);
        Ok(())
    }

    #[cfg(feature = "audio-io")]
    pub fn output_running(&self) -> bool {
        self.output.lock().is_some()
    }

    #[cfg(feature = "audio-io")]
    pub fn list_output_devices() -> Result<Vec<String>> {
        AudioOutput::list_devices()
    }

    #[cfg(feature = "audio-io")]
    pub fn current_output_device_name(&self) -> Result<String> {
        AudioOutput::device_name(None)
    }
}

/// Builder for [`BlocoSystem`].
#[derive(Default)]
pub struct BlocoSystemBuilder {
    sample_rate: Option<f64>,
    tempo: Option<f32>,
    #[cfg(feature = "audio-io")]
    device_index: Option<usize>,
    #[cfg(feature = "audio-io")]
    with_output: bool,
}

impl BlocoSystemBuilder {
    /// Sample rate for headless use. An output stream overrides this with
    /// the device's rate.
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Starting tempo in beats per minute.
    pub fn tempo(mut self, bpm: f32) -> Self {
        self.tempo = Some(bpm);
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

    pub fn build(self) -> Result<BlocoSystem> {
        let rate = self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        let transport = Transport::new(DEFAULT_TEMPO);
        if let Some(bpm) = self.tempo {
            transport.set_tempo(bpm)?;
        }

        let (net, backend) = BlocoNet::stereo();
        let net = Arc::new(Mutex::new(net));
        {
            let mut net = net.lock();
            net.set_sample_rate(rate);
            net.commit();
        }

        let graph = Arc::new(GraphManager::new(net.clone()));
        let instruments = Arc::new(InstrumentManager::new(net.clone(), graph.clone()));
        let drums = Arc::new(DrumMachine::new(&net, &graph));
        let sequencer = Arc::new(SequencerManager::new(
            instruments.clone(),
            drums.clone(),
            transport.clone(),
        ));
        let loops = Arc::new(LoopScheduler::new(transport.clone()));

        let system = BlocoSystem {
            net,
            backend: Mutex::new(Some(backend)),
            graph,
            instruments,
            drums,
            sequencer,
            transport,
            loops,
            run_state: Arc::new(RunState::new()),
            sample_rate: AtomicDouble::new(rate),
            #[cfg(feature = "audio-io")]
            output: Mutex::new(None),
        };

        #[cfg(feature = "audio-io")]
        if self.with_output {
            system.start_output(self.device_index)?;
        }

        Ok(system)
    }
}
