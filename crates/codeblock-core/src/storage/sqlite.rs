//! SQLite block store

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::error::{StorageError, StorageResult};
use super::schema::{init_schema, needs_init};
use super::BlockStore;
use crate::models::{Block, BlockId};

/// Block store backed by a single SQLite database file
pub struct SqliteBlockStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteBlockStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn, Some(path.to_path_buf()))?;
        info!("Opened block store at {:?}", path);
        Ok(store)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        if needs_init(&conn) {
            debug!("Initializing block store schema");
            init_schema(&conn)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Path of the database file, if on disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("database lock poisoned".to_string()))
    }
}

fn timestamp_from_millis(id: &str, millis: i64) -> StorageResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StorageError::InvalidRecord {
            id: id.to_string(),
            details: format!("invalid timestamp {}", millis),
        })
}

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<(Block, i64)> {
    let id: String = row.get(0)?;
    let millis: i64 = row.get(5)?;
    let block = Block {
        id: BlockId::new(id),
        title: row.get(1)?,
        starter: row.get(2)?,
        solution: row.get(3)?,
        content: row.get(4)?,
        updated_at: Utc::now(),
    };
    Ok((block, millis))
}

fn finish(entry: (Block, i64)) -> StorageResult<Block> {
    let (mut block, millis) = entry;
    block.updated_at = timestamp_from_millis(block.id.as_str(), millis)?;
    Ok(block)
}

impl BlockStore for SqliteBlockStore {
    fn load_block(&self, id: &BlockId) -> StorageResult<Block> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                "SELECT id, title, starter, solution, content, updated_at
                 FROM blocks WHERE id = ?1",
                params![id.as_str()],
                block_from_row,
            )
            .optional()?;

        match entry {
            Some(entry) => finish(entry),
            None => Err(StorageError::BlockNotFound(id.clone())),
        }
    }

    fn save_block(&self, block: &Block) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO blocks (id, title, starter, solution, content, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                updated_at = excluded.updated_at",
            params![
                block.id.as_str(),
                block.title,
                block.starter,
                block.solution,
                block.content,
                block.updated_at.timestamp_millis(),
            ],
        )?;
        debug!("Saved block '{}'", block.id);
        Ok(())
    }

    fn list_blocks(&self) -> StorageResult<Vec<Block>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, starter, solution, content, updated_at
             FROM blocks ORDER BY id",
        )?;
        let entries = stmt
            .query_map([], block_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        entries.into_iter().map(finish).collect()
    }
}
