//! Storage layer
//!
//! Blocks are persisted through the [`BlockStore`] contract.
//!
//! ## Backends
//!
//! - **SQLite**: durable store used by the relay server
//! - **Memory**: used by tests and by in-process sessions
//!
//! Sessions never write to a store directly; they hand saves to a
//! [`Persister`] task so edits are never blocked on I/O.

pub mod error;
pub mod memory;
pub mod persist;
pub mod schema;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryBlockStore;
pub use persist::Persister;
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use sqlite::SqliteBlockStore;

use crate::models::{Block, BlockId};

/// Persistent collection of blocks
pub trait BlockStore: Send + Sync {
    /// Load a block by id
    fn load_block(&self, id: &BlockId) -> StorageResult<Block>;

    /// Insert or update a block
    ///
    /// Implementations keep the stored starter and solution of an existing
    /// block; only title, content and timestamp are updated.
    fn save_block(&self, block: &Block) -> StorageResult<()>;

    /// All blocks, ordered by id
    fn list_blocks(&self) -> StorageResult<Vec<Block>>;

    /// Save `block` only if no block with its id exists; returns true if saved
    fn insert_if_missing(&self, block: &Block) -> StorageResult<bool> {
        match self.load_block(&block.id) {
            Ok(_) => Ok(false),
            Err(StorageError::BlockNotFound(_)) => {
                self.save_block(block)?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}
