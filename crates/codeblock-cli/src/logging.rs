//! Logging setup
//!
//! Logging is off unless `CODEBLOCK_LOG` is set (e.g. `CODEBLOCK_LOG=debug`).
//! Output goes to the configured log file, or to stderr.

use std::fs::OpenOptions;

use tracing::info;
use tracing_subscriber::EnvFilter;

use codeblock_core::Config;

pub fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("CODEBLOCK_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "codeblock_core={},codeblock={}",
        log_level, log_level
    ));

    match &config.log_file {
        Some(log_path) => {
            let log_file = match OpenOptions::new().create(true).append(true).open(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
                    return;
                }
            };

            // Ignore error if already initialized
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();

            info!("Logging to {:?}", log_path);
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
