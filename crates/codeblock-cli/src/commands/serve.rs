//! Serve command handler

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use codeblock_core::{Config, RelayServer};

use super::blocks::open_store;
use crate::output::Output;

/// Run the relay until interrupted
pub async fn run(config: &Config, bind: Option<String>, output: &Output) -> Result<()> {
    let store = open_store(config)?;
    let bind = bind.unwrap_or_else(|| config.bind_addr.clone());

    let server = RelayServer::new(Arc::new(store));
    output.message(&format!(
        "Relay {} listening on ws://{} (Ctrl-C to stop)",
        server.server_id(),
        bind
    ));

    tokio::select! {
        result = server.run(&bind) => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Relay shutting down");
            output.success("Relay stopped");
            Ok(())
        }
    }
}
