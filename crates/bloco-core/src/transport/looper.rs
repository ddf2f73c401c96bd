//! Transport-synced repeating callbacks.
//!
//! A dedicated thread advances the transport clock and fires due loop
//! callbacks. Loops are keyed by the identity of the block that created
//! them; re-registering a key replaces the previous loop, and stopping the
//! run clears the whole table.

use super::clock::Transport;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use dashmap::DashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const TICK: Duration = Duration::from_millis(2);

/// Beat position and iteration count handed to a firing loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopTick {
    pub beat: f64,
    pub iteration: u64,
}

pub type LoopCallback = Arc<dyn Fn(LoopTick) + Send + Sync>;

struct LoopEntry {
    interval_beats: f64,
    next_due: f64,
    iteration: u64,
    callback: LoopCallback,
}

/// Runs loop callbacks on its own tick thread while the transport plays.
pub struct LoopScheduler {
    entries: Arc<DashMap<String, LoopEntry>>,
    transport: Transport,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl LoopScheduler {
    pub fn new(transport: Transport) -> Self {
        let entries: Arc<DashMap<String, LoopEntry>> = Arc::new(DashMap::new());
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let thread_entries = entries.clone();
        let thread_transport = transport.clone();
        let thread_handle = std::thread::spawn(move || {
            let mut last = Instant::now();
            loop {
                match shutdown_rx.recv_timeout(TICK) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                let elapsed = last.elapsed();
                last = Instant::now();
                if !thread_transport.is_playing() {
                    continue;
                }
                let now = thread_transport.advance_seconds(elapsed.as_secs_f64());
                fire_due(&thread_entries, now);
            }
        });

        Self {
            entries,
            transport,
            shutdown_tx,
            thread_handle: Some(thread_handle),
        }
    }

    /// Install or replace the loop registered under `key`. The first fire
    /// lands `delay_beats` after the current position, then repeats every
    /// `interval_beats`.
    pub fn start_loop(
        &self,
        key: &str,
        interval_beats: f64,
        delay_beats: f64,
        callback: LoopCallback,
    ) {
        if !(interval_beats > 0.0) || !interval_beats.is_finite() {
            warn!("Rejected loop '{}' with interval {}", key, interval_beats);
            return;
        }
        let next_due = self.transport.position_beats() + delay_beats.max(0.0);
        self.entries.insert(
            key.to_string(),
            LoopEntry {
                interval_beats,
                next_due,
                iteration: 0,
                callback,
            },
        );
        debug!("Loop '{}' every {} beats", key, interval_beats);
    }

    pub fn stop_loop(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Clear the whole loop table.
    pub fn stop_all(&self) {
        let count = self.entries.len();
        self.entries.clear();
        if count > 0 {
            debug!("Stopped {} loops", count);
        }
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    pub fn has_loop(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LoopScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Fire every due callback. Callbacks run outside the map iteration so a
/// callback registering nested loops cannot contend with the tick pass.
fn fire_due(entries: &DashMap<String, LoopEntry>, now: f64) {
    let mut due: Vec<(LoopCallback, LoopTick)> = Vec::new();
    for mut entry in entries.iter_mut() {
        while entry.next_due <= now {
            due.push((
                entry.callback.clone(),
                LoopTick {
                    beat: entry.next_due,
                    iteration: entry.iteration,
                },
            ));
            entry.iteration += 1;
            let interval = entry.interval_beats;
            entry.next_due += interval;
        }
    }
    for (callback, tick) in due {
        callback(tick);
    }
}
