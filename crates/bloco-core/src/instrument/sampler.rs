//! Background sample loading for sampler instruments.
//!
//! Loading happens on a dedicated thread so instrument creation never
//! blocks on disk. Each sampler owns a slot that flips from empty to the
//! decoded wave when the file arrives; triggers that land before then are
//! dropped by the caller.

use crate::error::Result;
use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use fundsp::wave::Wave;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

pub(crate) type SampleSlot = Arc<ArcSwapOption<Wave>>;

pub(crate) fn empty_slot() -> SampleSlot {
    Arc::new(ArcSwapOption::empty())
}

enum LoadCommand {
    Load {
        name: String,
        path: PathBuf,
        slot: SampleSlot,
    },
    Shutdown,
}

pub(crate) struct SampleLoader {
    command_tx: Sender<LoadCommand>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SampleLoader {
    pub fn new() -> Self {
        let (command_tx, command_rx) = bounded(16);
        let thread_handle = std::thread::spawn(move || Self::loader_thread(command_rx));
        Self {
            command_tx,
            thread_handle: Some(thread_handle),
        }
    }

    fn loader_thread(command_rx: Receiver<LoadCommand>) {
        loop {
            match command_rx.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(LoadCommand::Load { name, path, slot }) => match read_wave(&path) {
                    Ok(wave) => {
                        debug!(
                            "Loaded sample '{}' ({} frames) from {}",
                            name,
                            wave.len(),
                            path.display()
                        );
                        slot.store(Some(Arc::new(wave)));
                    }
                    Err(err) => {
                        warn!(
                            "Failed to load sample '{}' from {}: {}",
                            name,
                            path.display(),
                            err
                        );
                    }
                },
                Ok(LoadCommand::Shutdown) => break,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Queue a load into `slot`.
    pub fn request(&self, name: &str, path: &Path, slot: SampleSlot) {
        let _ = self.command_tx.send(LoadCommand::Load {
            name: name.to_string(),
            path: path.to_path_buf(),
            slot,
        });
    }

    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(LoadCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SampleLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decode a WAV file into a mono wave, keeping the first channel.
pub(crate) fn read_wave(path: &Path) -> Result<Wave> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let raw: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().map(|s| s.unwrap_or(0.0)).collect(),
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.unwrap_or(0) as f32 / max_val)
                .collect()
        }
    };

    let mono: Vec<f32> = raw
        .iter()
        .step_by(spec.channels.max(1) as usize)
        .copied()
        .collect();
    Ok(Wave::from_samples(f64::from(spec.sample_rate), &mono))
}
