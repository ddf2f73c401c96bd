//! Debounced workspace watching.
//!
//! Block editors fire a change notification on every keystroke of an edit.
//! Re-registering handlers on each one would recompile constantly, so
//! notifications are coalesced: the watcher waits for the workspace to go
//! quiet, then pushes the final state to the registry in one update.

use crate::registry::EventRegistry;
use bloco_program::BlockForest;

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// How long the workspace must stay quiet before an update applies.
const QUIET: Duration = Duration::from_millis(150);

/// Coalesces workspace-change notifications into registry updates.
///
/// Every notification carries a full snapshot of the workspace. A burst of
/// notifications applies once, last snapshot wins. Dropping the watcher
/// flushes a pending snapshot before its thread exits.
pub struct WorkspaceWatcher {
    tx: Option<Sender<BlockForest>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl WorkspaceWatcher {
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        let (tx, rx) = unbounded::<BlockForest>();
        let thread_handle = std::thread::spawn(move || loop {
            let Ok(mut forest) = rx.recv() else {
                return;
            };
            // Absorb the rest of the burst until the workspace goes quiet.
            loop {
                match rx.recv_timeout(QUIET) {
                    Ok(newer) => forest = newer,
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        registry.update_all(&forest);
                        return;
                    }
                }
            }
            let count = registry.update_all(&forest);
            debug!("Workspace settled, {} handler(s) registered", count);
        });
        Self {
            tx: Some(tx),
            thread_handle: Some(thread_handle),
        }
    }

    /// Report a workspace edit. The snapshot applies once edits pause.
    pub fn notify(&self, forest: BlockForest) {
        let Some(tx) = &self.tx else { return };
        if tx.send(forest).is_err() {
            warn!("Workspace watcher is gone, edit dropped");
        }
    }

    /// Stop watching. A snapshot still in flight is applied first.
    pub fn shutdown(&mut self) {
        self.tx = None;
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkspaceWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerKey;
    use bloco_core::{BlocoSystemBuilder, DrumKind};
    use bloco_program::{Block, BlockKind, Executor, KeyTrigger, NumExpr};
    use tokio::runtime::Handle;

    fn registry() -> Arc<EventRegistry> {
        let system = Arc::new(BlocoSystemBuilder::default().build().unwrap());
        let executor = Executor::new(system);
        Arc::new(EventRegistry::new(executor, Handle::current()))
    }

    fn hat(id: &str) -> BlockForest {
        BlockForest {
            blocks: vec![Block::new(
                id,
                BlockKind::OnKey {
                    key: "KeyA".to_string(),
                    trigger: KeyTrigger::Press,
                    body: vec![Block::new(
                        "b1",
                        BlockKind::PlayDrum {
                            drum: DrumKind::Kick,
                            velocity: NumExpr::value(0.8),
                        },
                    )],
                },
            )],
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bursts_coalesce_into_one_update() {
        let registry = registry();
        let watcher = WorkspaceWatcher::new(Arc::clone(&registry));

        watcher.notify(hat("h1"));
        watcher.notify(hat("h2"));
        watcher.notify(hat("h3"));
        tokio::time::sleep(Duration::from_millis(400)).await;

        // Only the final snapshot registered anything.
        assert_eq!(registry.handler_count(), 1);
        assert!(registry.has_handler(&HandlerKey::new("h3")));
        assert!(!registry.has_handler(&HandlerKey::new("h1")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spaced_edits_each_apply() {
        let registry = registry();
        let watcher = WorkspaceWatcher::new(Arc::clone(&registry));

        watcher.notify(hat("h1"));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(registry.has_handler(&HandlerKey::new("h1")));

        watcher.notify(hat("h2"));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(registry.has_handler(&HandlerKey::new("h2")));
        assert!(!registry.has_handler(&HandlerKey::new("h1")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_flushes_the_pending_snapshot() {
        let registry = registry();
        let mut watcher = WorkspaceWatcher::new(Arc::clone(&registry));

        watcher.notify(hat("h1"));
        watcher.shutdown();

        assert!(registry.has_handler(&HandlerKey::new("h1")));
    }
}
