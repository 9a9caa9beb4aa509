//! Transport contracts used by sessions
//!
//! Both traits are object safe and non-blocking: sends are queued, receives
//! come through unbounded streams.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{Answer, AnswerId, BlockId, ParticipantId, Question, QuestionId};

/// Errors raised by channel implementations
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Broadcast to a block the caller has not joined
    #[error("Not joined to block '{0}'")]
    NotJoined(BlockId),

    /// The underlying connection is gone
    #[error("Channel closed")]
    Closed,

    /// A stream was already handed out
    #[error("The {0} stream was already taken")]
    AlreadyTaken(&'static str),

    /// A frame could not be encoded
    #[error("Failed to encode message: {0}")]
    Encode(String),

    /// Could not reach the relay server
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The relay did not answer in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The relay has no such block
    #[error("Block '{0}' is not available on the server")]
    Unavailable(BlockId),
}

/// An edit received from another participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEdit {
    pub block_id: BlockId,
    pub sender: ParticipantId,
    pub content: String,
}

/// Inbound edits for one joined block
pub type EditStream = mpsc::UnboundedReceiver<RemoteEdit>;

/// Inbound questions from other participants
pub type QuestionStream = mpsc::UnboundedReceiver<Question>;

/// Inbound answers addressed to this participant
pub type AnswerStream = mpsc::UnboundedReceiver<Answer>;

/// Room-scoped edit propagation
///
/// Edits are delivered to every other participant joined to the same block,
/// never back to the sender, in send order per sender.
pub trait SyncChannel: Send + Sync {
    /// Join the room for `block_id` and receive its edits
    ///
    /// Joining again replaces the previous stream.
    fn join(&self, block_id: &BlockId) -> Result<EditStream, ChannelError>;

    /// Stop receiving edits for `block_id`
    fn leave(&self, block_id: &BlockId);

    /// Send `content` to the other members of the room
    fn broadcast(&self, block_id: &BlockId, content: &str) -> Result<(), ChannelError>;
}

/// Question and answer side channel
///
/// Fire-and-forget: nothing is acknowledged, retried or stored.
pub trait QaChannel: Send + Sync {
    /// Send a question to every other connected participant
    fn ask_question(&self, content: &str) -> Result<QuestionId, ChannelError>;

    /// Take the question stream (can only be called once)
    fn take_questions(&self) -> Result<QuestionStream, ChannelError>;

    /// Reply to `question`; only its asker receives the answer
    fn answer(&self, question: &Question, content: &str) -> Result<AnswerId, ChannelError>;

    /// Take the answer stream (can only be called once)
    fn take_answers(&self) -> Result<AnswerStream, ChannelError>;
}
