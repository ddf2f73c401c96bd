//! Line-oriented input source.
//!
//! Reads newline-terminated text from any reader (a serial device node, a
//! pipe, a file) on a dedicated thread and hands each line to the registry,
//! which trims it and binds it for serial handlers.

use crate::registry::EventRegistry;
use crate::Result;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Pumps lines from a reader into [`EventRegistry::dispatch_serial`].
///
/// The reader thread runs until EOF or a read error. There is no shutdown
/// handshake; closing the underlying device ends the thread.
pub struct SerialSource {
    thread_handle: JoinHandle<()>,
}

impl SerialSource {
    /// Read lines from `reader` on a new thread.
    pub fn spawn<R>(reader: R, registry: Arc<EventRegistry>) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let thread_handle = std::thread::spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(text) => registry.dispatch_serial(&text),
                    Err(err) => {
                        warn!("Serial read failed: {}", err);
                        break;
                    }
                }
            }
            debug!("Serial source closed");
        });
        Self { thread_handle }
    }

    /// Open a device node or file and read lines from it.
    pub fn open(path: impl AsRef<Path>, registry: Arc<EventRegistry>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::spawn(BufReader::new(file), registry))
    }

    /// True once the reader thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread_handle.is_finished()
    }
}
