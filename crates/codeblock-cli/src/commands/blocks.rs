//! Lobby command handlers

use anyhow::{Context, Result};

use codeblock_core::{catalog, BlockId, BlockStore, Config, SqliteBlockStore, StorageError};

use crate::output::Output;

/// Open the local store, seeding the lobby exercises if missing
pub fn open_store(config: &Config) -> Result<SqliteBlockStore> {
    let path = config.database_path();
    let store = SqliteBlockStore::open(&path)
        .with_context(|| format!("Failed to open block store at {:?}", path))?;
    catalog::seed(&store).context("Failed to seed exercises")?;
    Ok(store)
}

/// List blocks
pub fn list(config: &Config, output: &Output) -> Result<()> {
    let store = open_store(config)?;
    let blocks = store.list_blocks()?;
    output.print_blocks(&blocks);
    Ok(())
}

/// Show a single block
pub fn show(config: &Config, id: &str, output: &Output) -> Result<()> {
    let store = open_store(config)?;
    match store.load_block(&BlockId::new(id)) {
        Ok(block) => {
            output.print_block(&block);
            Ok(())
        }
        Err(e @ StorageError::BlockNotFound(_)) => {
            let hint = e.recovery_suggestion().unwrap_or_default();
            anyhow::bail!("{}. {}", e, hint)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_store_seeds_lobby() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp.path().to_path_buf(),
            ..Config::default()
        };

        let store = open_store(&config).unwrap();
        assert_eq!(store.list_blocks().unwrap().len(), 6);
        assert!(config.database_path().exists());

        // Reopening does not duplicate
        drop(store);
        let store = open_store(&config).unwrap();
        assert_eq!(store.list_blocks().unwrap().len(), 6);
    }
}
