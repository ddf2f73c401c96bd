//! Handler registry: hat blocks wired to live event dispatch.
//!
//! Each hat block in the workspace compiles to a handler body that runs when
//! its event arrives. The registry owns the full set of registered handlers,
//! keeps them in sync with workspace edits, and dispatches incoming note,
//! serial, and key events onto the async runtime.
//!
//! Handler bodies run under the registry's own run state, separate from the
//! main program run. Stopping a program does not tear handlers down;
//! [`EventRegistry::interrupt`] cancels whatever bodies are mid-flight and
//! immediately re-arms so the next event runs fresh.

use bloco_core::{midi_to_note, RunState};
use bloco_program::{
    compile_handlers, BlockForest, CompiledHandler, Executor, HandlerSpec, KeyTrigger, Script,
};

use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Opaque identity of a registered handler.
///
/// Derived from the hat block that produced the handler, so the same hat maps
/// to the same key across recompilations. Callers treat it as a token: compare
/// it, hash it, print it for logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerKey(String);

impl HandlerKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct Registered {
    /// Canonical text of the handler at registration time. Workspace updates
    /// diff against this to decide whether re-registration is needed.
    signature: String,
    handler: CompiledHandler,
}

/// Registry of event handlers compiled from hat blocks.
///
/// Dispatch methods are cheap and callable from any thread; handler bodies are
/// spawned onto the runtime handle given at construction. Incoming events for
/// which no handler is registered are dropped quietly.
pub struct EventRegistry {
    executor: Executor,
    runtime: Handle,
    /// Cancellation scope for handler bodies, independent of program runs.
    era: RunState,
    handlers: DashMap<HandlerKey, Registered>,
    /// Key-action routing: one handler per (key, trigger) slot.
    keymap: DashMap<(String, KeyTrigger), HandlerKey>,
}

impl EventRegistry {
    /// Create a registry dispatching through `executor`, spawning handler
    /// bodies on `runtime`.
    pub fn new(executor: Executor, runtime: Handle) -> Self {
        let era = RunState::new();
        era.begin_run();
        Self {
            executor,
            runtime,
            era,
            handlers: DashMap::new(),
            keymap: DashMap::new(),
        }
    }

    /// Register every hat in `forest` from a clean slate.
    ///
    /// Returns the number of registered handlers. Hats whose bodies fail to
    /// compile are skipped by the compiler and simply absent here.
    pub fn register_all(&self, forest: &BlockForest) -> usize {
        self.unregister_all();
        for spec in compile_handlers(forest) {
            self.register(spec);
        }
        let count = self.handlers.len();
        info!("Registered {} event handler(s)", count);
        count
    }

    /// Reconcile registered handlers with the current workspace.
    ///
    /// Handlers whose canonical text is unchanged keep their registration
    /// untouched. Changed handlers are unregistered and re-registered with the
    /// new body; handlers whose hat left the workspace are dropped. Returns
    /// the number of handlers registered afterwards.
    pub fn update_all(&self, forest: &BlockForest) -> usize {
        let mut seen = HashSet::new();
        for spec in compile_handlers(forest) {
            let key = HandlerKey::new(spec.key.clone());
            seen.insert(key.clone());

            let unchanged = self
                .handlers
                .get(&key)
                .map(|entry| entry.signature == spec.handler.signature())
                .unwrap_or(false);
            if unchanged {
                continue;
            }

            self.unregister(&key);
            self.register(spec);
        }

        let stale: Vec<HandlerKey> = self
            .handlers
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| !seen.contains(key))
            .collect();
        for key in &stale {
            self.unregister(key);
            debug!("Handler {} left the workspace", key);
        }

        self.handlers.len()
    }

    /// Drop every registered handler. In-flight bodies are not cancelled.
    pub fn unregister_all(&self) {
        self.handlers.clear();
        self.keymap.clear();
    }

    /// Cancel in-flight handler bodies and re-arm for the next event.
    ///
    /// Registration is untouched: handlers keep responding to future events.
    pub fn interrupt(&self) {
        self.era.begin_run();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn has_handler(&self, key: &HandlerKey) -> bool {
        self.handlers.contains_key(key)
    }

    /// Keys of all registered handlers, in no particular order.
    pub fn handler_keys(&self) -> Vec<HandlerKey> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }

    /// Dispatch an external note event to every note handler.
    ///
    /// `raw_velocity` is the wire value in 0..=127 and is normalized to 0..=1
    /// before binding. A zero velocity is a note release: no handler body
    /// runs, the matching voice on the current instrument is released
    /// instead. The source `channel` is bound under the fixed name `channel`.
    pub fn dispatch_note(&self, midi: u8, raw_velocity: u8, channel: u8) {
        if raw_velocity == 0 {
            let instruments = self.executor.system().instruments();
            let Some(current) = instruments.current_instrument() else {
                return;
            };
            if let Err(err) = instruments.release_note(&current, midi) {
                debug!("Note-off {} ignored: {}", midi, err);
            }
            return;
        }

        let note = midi_to_note(midi);
        let velocity = f32::from(raw_velocity.min(127)) / 127.0;
        for entry in self.handlers.iter() {
            if let CompiledHandler::Note {
                note_var,
                velocity_var,
                body,
            } = &entry.value().handler
            {
                self.spawn_body(
                    body,
                    vec![
                        (note_var.clone(), note.clone()),
                        (velocity_var.clone(), velocity.to_string()),
                        ("channel".to_string(), channel.to_string()),
                    ],
                );
            }
        }
    }

    /// Dispatch one line of serial input to every serial handler.
    ///
    /// The line is trimmed before binding; lines that trim to nothing are
    /// dropped without dispatch.
    pub fn dispatch_serial(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        for entry in self.handlers.iter() {
            if let CompiledHandler::Serial { line_var, body } = &entry.value().handler {
                self.spawn_body(body, vec![(line_var.clone(), line.to_string())]);
            }
        }
    }

    /// Dispatch a key transition to the handler owning that (key, trigger)
    /// slot, if any.
    pub fn dispatch_key(&self, key: &str, trigger: KeyTrigger) {
        let slot = (key.to_string(), trigger);
        let Some(owner) = self.keymap.get(&slot).map(|e| e.value().clone()) else {
            return;
        };
        let Some(entry) = self.handlers.get(&owner) else {
            return;
        };
        if let CompiledHandler::Key { body, .. } = &entry.value().handler {
            let body = Arc::clone(body);
            drop(entry);
            self.spawn_body(&body, Vec::new());
        }
    }

    fn register(&self, spec: HandlerSpec) {
        let key = HandlerKey::new(spec.key);

        // A key hat claims its (key, trigger) slot; any previous owner is
        // dropped without ceremony.
        if let CompiledHandler::Key {
            key: code, trigger, ..
        } = &spec.handler
        {
            let slot = (code.clone(), *trigger);
            if let Some(previous) = self.keymap.insert(slot, key.clone()) {
                if previous != key {
                    self.handlers.remove(&previous);
                    debug!("Key handler for {:?} replaced by {}", code, key);
                }
            }
        }

        let graph = self.executor.system().graph_manager();
        for config in spec.effects {
            graph.add_effect_to_chain(config);
        }

        let signature = spec.handler.signature();
        self.handlers.insert(
            key,
            Registered {
                signature,
                handler: spec.handler,
            },
        );
    }

    fn unregister(&self, key: &HandlerKey) -> bool {
        let Some((_, registered)) = self.handlers.remove(key) else {
            return false;
        };
        if let CompiledHandler::Key {
            key: code, trigger, ..
        } = &registered.handler
        {
            // Free the slot only if this handler still owns it.
            let slot = (code.clone(), *trigger);
            self.keymap.remove_if(&slot, |_, owner| owner == key);
        }
        true
    }

    fn spawn_body(&self, body: &Arc<Script>, bindings: Vec<(String, String)>) {
        let executor = self.executor.clone();
        let body = Arc::clone(body);
        let run = self.era.token();
        self.runtime.spawn(async move {
            for (name, value) in bindings {
                executor.set_variable(&name, value);
            }
            executor.run_script(&body, &run).await;
        });
    }
}
