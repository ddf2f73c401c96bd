//! Hardware MIDI note input.
//!
//! Connects to a MIDI input port and routes note-on/note-off messages into
//! the registry. A dedicated thread owns the midir connection for platform
//! thread-safety; connection changes go through a command channel.

use crate::error::{Error, Result};
use crate::registry::EventRegistry;

use crossbeam_channel::{bounded, Receiver, Sender};
use midir::{MidiInput, MidiInputConnection};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// An available MIDI input device.
#[derive(Debug, Clone)]
pub struct MidiInputDevice {
    /// Device index, used to connect.
    pub index: usize,
    /// Device name as reported by the system.
    pub name: String,
}

enum MidiCommand {
    Connect(usize),
    Disconnect,
    Shutdown,
}

/// Note content of a raw MIDI message as (note, velocity, channel).
///
/// Note-offs, including note-ons with velocity zero, come back with velocity
/// zero. Non-note messages decode to `None`.
fn decode_note(message: &[u8]) -> Option<(u8, u8, u8)> {
    if message.len() < 3 {
        return None;
    }
    let channel = message[0] & 0x0F;
    match message[0] & 0xF0 {
        0x90 => Some((message[1], message[2], channel)),
        0x80 => Some((message[1], 0, channel)),
        _ => None,
    }
}

/// Streams hardware note events into an [`EventRegistry`].
///
/// Note-ons dispatch to note handlers; note-offs take the direct release
/// path. Everything else on the wire is ignored.
pub struct MidiNoteSource {
    command_tx: Sender<MidiCommand>,
    connected_device: Arc<Mutex<Option<String>>>,
    is_connected: Arc<AtomicBool>,
}

impl MidiNoteSource {
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        let (command_tx, command_rx) = bounded(16);
        let connected_device = Arc::new(Mutex::new(None));
        let is_connected = Arc::new(AtomicBool::new(false));

        let thread_device = Arc::clone(&connected_device);
        let thread_connected = Arc::clone(&is_connected);
        thread::spawn(move || {
            Self::midi_thread(command_rx, registry, thread_device, thread_connected);
        });

        Self {
            command_tx,
            connected_device,
            is_connected,
        }
    }

    fn midi_thread(
        command_rx: Receiver<MidiCommand>,
        registry: Arc<EventRegistry>,
        connected_device: Arc<Mutex<Option<String>>>,
        is_connected: Arc<AtomicBool>,
    ) {
        let mut connection: Option<MidiInputConnection<()>> = None;

        loop {
            match command_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(MidiCommand::Connect(device_index)) => {
                    if let Some(conn) = connection.take() {
                        drop(conn);
                        is_connected.store(false, Ordering::SeqCst);
                        *connected_device.lock() = None;
                    }

                    match Self::connect_to_device(device_index, Arc::clone(&registry)) {
                        Ok((conn, name)) => {
                            debug!("MIDI input connected to '{}'", name);
                            connection = Some(conn);
                            is_connected.store(true, Ordering::SeqCst);
                            *connected_device.lock() = Some(name);
                        }
                        Err(err) => {
                            warn!("MIDI connect failed: {}", err);
                        }
                    }
                }
                Ok(MidiCommand::Disconnect) => {
                    if let Some(conn) = connection.take() {
                        drop(conn);
                        is_connected.store(false, Ordering::SeqCst);
                        *connected_device.lock() = None;
                    }
                }
                Ok(MidiCommand::Shutdown) => {
                    if let Some(conn) = connection.take() {
                        drop(conn);
                    }
                    break;
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn connect_to_device(
        device_index: usize,
        registry: Arc<EventRegistry>,
    ) -> Result<(MidiInputConnection<()>, String)> {
        let midi_input = MidiInput::new("bloco-midi-input")?;

        let ports = midi_input.ports();
        let port = ports
            .get(device_index)
            .ok_or_else(|| Error::MidiDevice(format!("device {} not found", device_index)))?;

        let port_name = midi_input
            .port_name(port)
            .unwrap_or_else(|_| format!("Device {}", device_index));

        let connection = midi_input.connect(
            port,
            "bloco-input",
            move |_timestamp, message, _| {
                if let Some((note, velocity, channel)) = decode_note(message) {
                    registry.dispatch_note(note, velocity, channel);
                }
            },
            (),
        )?;

        Ok((connection, port_name))
    }

    /// Enumerate MIDI input devices currently visible to the system.
    pub fn list_devices() -> Vec<MidiInputDevice> {
        let mut devices = Vec::new();
        if let Ok(midi_input) = MidiInput::new("bloco-device-list") {
            let ports = midi_input.ports();
            for (index, port) in ports.iter().enumerate() {
                let name = midi_input
                    .port_name(port)
                    .unwrap_or_else(|_| format!("Unknown Device {}", index));
                devices.push(MidiInputDevice { index, name });
            }
        }
        devices
    }

    /// Connect to a device by its index in [`MidiNoteSource::list_devices`].
    ///
    /// The connection happens on the MIDI thread; failures are logged there
    /// and leave the source disconnected.
    pub fn connect(&self, device_index: usize) -> Result<()> {
        self.command_tx
            .send(MidiCommand::Connect(device_index))
            .map_err(|_| Error::MidiDevice("MIDI thread is not running".to_string()))
    }

    /// Connect to the first device whose name contains `name`,
    /// case-insensitively.
    pub fn connect_by_name(&self, name: &str) -> Result<()> {
        let devices = Self::list_devices();
        let device = devices
            .iter()
            .find(|d| d.name.to_lowercase().contains(&name.to_lowercase()))
            .ok_or_else(|| Error::MidiDevice(format!("no device matching '{}'", name)))?;
        self.connect(device.index)
    }

    pub fn disconnect(&self) {
        let _ = self.command_tx.send(MidiCommand::Disconnect);
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst)
    }

    pub fn connected_device_name(&self) -> Option<String> {
        self.connected_device.lock().clone()
    }
}

impl Drop for MidiNoteSource {
    fn drop(&mut self) {
        let _ = self.command_tx.send(MidiCommand::Shutdown);
    }
}
