//! In-memory block store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::error::{StorageError, StorageResult};
use super::BlockStore;
use crate::models::{Block, BlockId};

/// Block store that lives only as long as the process
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: Mutex<BTreeMap<BlockId, Block>>,
    read_only: AtomicBool,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `blocks`
    pub fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.blocks.lock() {
            for block in blocks {
                map.insert(block.id.clone(), block);
            }
        }
        store
    }

    /// Make every save fail with [`StorageError::Unavailable`]
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, BTreeMap<BlockId, Block>>> {
        self.blocks
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl BlockStore for MemoryBlockStore {
    fn load_block(&self, id: &BlockId) -> StorageResult<Block> {
        self.lock()?
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::BlockNotFound(id.clone()))
    }

    fn save_block(&self, block: &Block) -> StorageResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("store is read-only".to_string()));
        }

        let mut blocks = self.lock()?;
        match blocks.get_mut(&block.id) {
            Some(existing) => {
                existing.title = block.title.clone();
                existing.content = block.content.clone();
                existing.updated_at = block.updated_at;
            }
            None => {
                blocks.insert(block.id.clone(), block.clone());
            }
        }
        Ok(())
    }

    fn list_blocks(&self) -> StorageResult<Vec<Block>> {
        Ok(self.lock()?.values().cloned().collect())
    }
}
