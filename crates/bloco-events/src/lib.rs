//! Event dispatch for the bloco audio engine.
//!
//! Hat blocks in a workspace become live event handlers here: an
//! [`EventRegistry`] keeps the registered set in sync with workspace edits
//! and dispatches incoming note, serial-line, and key events onto handler
//! bodies, while source types feed it from the outside world.
//!
//! # Primary API
//!
//! - [`EventRegistry`]: handler registration and event dispatch.
//! - [`WorkspaceWatcher`]: debounced re-registration on workspace edits.
//! - [`SerialSource`]: newline-terminated text from a reader or device.
//!
//! # Feature-gated APIs
//!
//! - `"midi-io"`: [`MidiNoteSource`], hardware note input via midir.
//!
//! ```ignore
//! let registry = Arc::new(EventRegistry::new(executor, runtime.handle().clone()));
//! registry.register_all(&forest);
//! registry.dispatch_key("KeyA", KeyTrigger::Press);
//! ```

pub mod error;
pub use error::{Error, Result};

mod registry;
pub use registry::{EventRegistry, HandlerKey};

mod debounce;
pub use debounce::WorkspaceWatcher;

mod sources;
pub use sources::SerialSource;

#[cfg(feature = "midi-io")]
pub use sources::{MidiInputDevice, MidiNoteSource};
