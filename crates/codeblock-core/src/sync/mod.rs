//! Edit propagation and Q&A transport
//!
//! Sessions talk to their peers only through the [`SyncChannel`] and
//! [`QaChannel`] traits. Two implementations are provided:
//!
//! - [`LocalHub`]: in-process rooms, used by tests and embedded sessions
//! - [`RemoteChannel`]: WebSocket client of a [`RelayServer`]
//!
//! ## Protocol
//!
//! 1. Connect via WebSocket and send `hello` with the participant
//! 2. Wait for `welcome` (10 second timeout)
//! 3. `join` a block room, then exchange `edit` frames
//! 4. `ask`/`answer` travel outside of rooms
//!
//! Frames are CBOR-encoded [`ClientMessage`] / [`ServerMessage`] values.

mod channel;
mod client;
mod hub;
mod message;
mod server;

pub use channel::{
    AnswerStream, ChannelError, EditStream, QaChannel, QuestionStream, RemoteEdit, SyncChannel,
};
pub use client::{ConnectionStatus, RemoteChannel};
pub use hub::{HubConnection, LocalHub};
pub use message::{ClientMessage, ServerMessage};
pub use server::RelayServer;
