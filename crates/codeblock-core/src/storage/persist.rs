//! Background persistence queue
//!
//! Sessions hand updated blocks to a [`Persister`]; a single task drains the
//! queue and writes to the store. When several saves for the same block are
//! pending only the latest one is written. Failures are logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{BlockStore, StorageError};
use crate::models::{Block, BlockId};

/// Handle used to request that a block be saved
#[derive(Clone)]
pub struct Persister {
    tx: mpsc::UnboundedSender<Block>,
}

impl Persister {
    /// Spawn the persistence task
    ///
    /// The task exits once every `Persister` clone has been dropped and the
    /// queue is drained.
    pub fn spawn(store: Arc<dyn BlockStore>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(persist_loop(store, rx));
        (Self { tx }, handle)
    }

    /// Queue a save of `block`
    pub fn request(&self, block: Block) {
        if self.tx.send(block).is_err() {
            warn!("Persistence task has stopped; save dropped");
        }
    }
}

async fn persist_loop(store: Arc<dyn BlockStore>, mut rx: mpsc::UnboundedReceiver<Block>) {
    while let Some(first) = rx.recv().await {
        let mut pending: HashMap<BlockId, Block> = HashMap::new();
        pending.insert(first.id.clone(), first);
        while let Ok(block) = rx.try_recv() {
            pending.insert(block.id.clone(), block);
        }

        for (id, block) in pending {
            let store = store.clone();
            let result = tokio::task::spawn_blocking(move || store.save_block(&block)).await;
            match result {
                Ok(Ok(())) => debug!("Persisted block '{}'", id),
                Ok(Err(e)) => report_failure(&id, &e),
                Err(e) => warn!("Persistence of block '{}' panicked: {}", id, e),
            }
        }
    }
    debug!("Persistence task finished");
}

/// Log a failed save; recoverable failures carry a hint
fn report_failure(id: &BlockId, e: &StorageError) {
    if e.is_recoverable() {
        let hint = e.recovery_suggestion().unwrap_or("Retry once the store is back.");
        warn!("Failed to persist block '{}': {}. {}", id, e, hint);
    } else {
        error!("Failed to persist block '{}': {}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlockStore;

    #[tokio::test]
    async fn test_latest_save_wins() {
        let store = Arc::new(MemoryBlockStore::new());
        let (persister, handle) = Persister::spawn(store.clone());

        let mut block = Block::new("dom", "DOM manipulation", "a", None);
        for content in ["b", "c", "d"] {
            block.set_content(content);
            persister.request(block.clone());
        }
        drop(persister);
        handle.await.unwrap();

        let saved = store.load_block(&BlockId::new("dom")).unwrap();
        assert_eq!(saved.current_content(), "d");
    }

    #[tokio::test]
    async fn test_failed_save_does_not_stop_task() {
        let store = Arc::new(MemoryBlockStore::new());
        store.set_read_only(true);
        let (persister, handle) = Persister::spawn(store.clone());

        persister.request(Block::new("a", "A", "", None));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        store.set_read_only(false);
        persister.request(Block::new("b", "B", "", None));
        drop(persister);
        handle.await.unwrap();

        assert!(store.load_block(&BlockId::new("a")).is_err());
        assert!(store.load_block(&BlockId::new("b")).is_ok());
    }
}
