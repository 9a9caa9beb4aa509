//! Data models for codeblock
//!
//! Defines the core data structures: Block, Participant (with its Role),
//! and the ephemeral Question/Answer pair exchanged over the Q&A channel.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a question
pub type QuestionId = Uuid;

/// Identifier of an answer
pub type AnswerId = Uuid;

/// Identifier of a block (a short slug such as `async`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank ids are never valid on the wire
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BlockId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single code exercise
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    /// Unique identifier
    pub id: BlockId,
    /// Display title shown in the lobby
    pub title: String,
    /// Original text handed to the student; never changes after creation
    pub starter: String,
    /// Canonical solution; never changes after creation
    pub solution: Option<String>,
    /// Live content, `None` until the first edit is recorded
    pub content: Option<String>,
    /// When the content was last saved
    pub updated_at: DateTime<Utc>,
}

impl Block {
    /// Create a new block with no recorded content
    pub fn new(
        id: impl Into<BlockId>,
        title: impl Into<String>,
        starter: impl Into<String>,
        solution: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            starter: starter.into(),
            solution,
            content: None,
            updated_at: Utc::now(),
        }
    }

    /// The text a participant should see: recorded content, or the starter
    pub fn current_content(&self) -> &str {
        self.content.as_deref().unwrap_or(&self.starter)
    }

    /// Replace the live content
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = Some(content.into());
        self.updated_at = Utc::now();
    }

    /// Whether the live content differs from the starter
    pub fn is_modified(&self) -> bool {
        self.current_content() != self.starter
    }
}

/// Role of a participant; fixed for the lifetime of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only observer who may reset a solved block
    Mentor,
    /// The only role allowed to write block content
    Student,
}

impl Role {
    /// Whether this role may edit block content
    pub fn can_edit(self) -> bool {
        matches!(self, Role::Student)
    }

    /// Whether this role may reset a solved block to its starter
    pub fn can_reset(self) -> bool {
        matches!(self, Role::Mentor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Mentor => f.write_str("mentor"),
            Role::Student => f.write_str("student"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mentor" => Ok(Role::Mentor),
            "student" => Ok(Role::Student),
            other => Err(format!(
                "Unknown role '{}'. Use 'mentor' or 'student'.",
                other
            )),
        }
    }
}

/// Identifier of a participant connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Generate a random participant id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A connected participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub role: Role,
}

impl Participant {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            id: ParticipantId::new(),
            name: name.into(),
            role,
        }
    }

    pub fn mentor(name: impl Into<String>) -> Self {
        Self::new(name, Role::Mentor)
    }

    pub fn student(name: impl Into<String>) -> Self {
        Self::new(name, Role::Student)
    }
}

/// A free-text question broadcast by a participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    pub asker_id: ParticipantId,
    pub asker_name: String,
    pub content: String,
    pub asked_at: DateTime<Utc>,
}

impl Question {
    pub fn new(asker: &Participant, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            asker_id: asker.id,
            asker_name: asker.name.clone(),
            content: content.into(),
            asked_at: Utc::now(),
        }
    }
}

/// A targeted reply to a question; delivered only to the asker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub id: AnswerId,
    pub question_id: QuestionId,
    pub asker_id: ParticipantId,
    /// Text of the question being answered
    pub question: String,
    pub content: String,
}

impl Answer {
    /// Build an answer addressed to the asker of `question`
    pub fn to(question: &Question, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question_id: question.id,
            asker_id: question.asker_id,
            question: question.content.clone(),
            content: content.into(),
        }
    }
}
