//! Codeblock Core Library
//!
//! This crate provides the core functionality for codeblock, a live code
//! exercise shared between a mentor and one or more students.
//!
//! # Architecture
//!
//! - **Sessions**: each participant holds its own copy of the block and
//!   recomputes the solved flag locally after every change
//! - **Channels**: edits travel to the other members of a block room;
//!   the last edit applied wins
//! - **Relay**: a WebSocket server fans edits out and stores block content
//!
//! # Quick Start
//!
//! ```text
//! let hub = LocalHub::new();
//! let ada = Participant::student("Ada");
//! let channel = Arc::new(hub.connect(ada.clone()));
//!
//! let mut controller = SessionController::open(ada, block, channel)?;
//! controller.edit("function f(a, b) {}")?;
//! assert!(controller.is_solved());
//! ```
//!
//! # Modules
//!
//! - `equivalence`: Formatting-insensitive solution checking
//! - `session`: Per-block content and solved state
//! - `controller`: Write policy and edit propagation
//! - `sync`: Channel contracts, wire protocol, hub, client and relay
//! - `storage`: Block stores and the persistence queue
//! - `catalog`: Built-in exercises
//! - `config`: Application configuration

pub mod catalog;
pub mod config;
pub mod controller;
pub mod equivalence;
pub mod error;
pub mod models;
pub mod session;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use controller::{RemoteUpdate, SessionController};
pub use equivalence::{is_equivalent, try_equivalent, NormalizeError};
pub use error::SessionError;
pub use models::{Answer, Block, BlockId, Participant, ParticipantId, Question, Role};
pub use session::{BlockSession, Mutation, SolvedTransition};
pub use storage::{
    BlockStore, MemoryBlockStore, Persister, SqliteBlockStore, StorageError, StorageResult,
};
pub use sync::{
    ChannelError, ConnectionStatus, LocalHub, QaChannel, RelayServer, RemoteChannel, RemoteEdit,
    SyncChannel,
};
