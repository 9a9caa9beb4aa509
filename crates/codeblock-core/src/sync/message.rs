//! Wire protocol message types
//!
//! Messages exchanged between participants and the relay server using CBOR
//! encoding over binary WebSocket frames.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::models::{Answer, Block, BlockId, Participant, ParticipantId, Question};

/// Messages sent to the relay server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Handshake; must be the first message on a connection
    Hello { participant: Participant },

    /// Join a block room
    Join {
        #[serde(rename = "blockId")]
        block_id: BlockId,
    },

    /// Leave a block room
    Leave {
        #[serde(rename = "blockId")]
        block_id: BlockId,
    },

    /// New content for a block
    Edit {
        #[serde(rename = "blockId")]
        block_id: BlockId,
        content: String,
    },

    /// Request the stored state of a block
    Load {
        #[serde(rename = "blockId")]
        block_id: BlockId,
    },

    /// Persist a block on the server
    Save { block: Block },

    /// Question for every other participant
    Ask { question: Question },

    /// Answer routed to the asker
    Answer { answer: Answer },
}

/// Messages received from the relay server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Handshake response
    Welcome {
        #[serde(rename = "serverId")]
        server_id: String,
    },

    /// Edit from another member of a joined room
    Edited {
        #[serde(rename = "blockId")]
        block_id: BlockId,
        #[serde(rename = "senderId")]
        sender_id: ParticipantId,
        content: String,
    },

    /// Stored state of a requested block
    Snapshot { block: Block },

    /// Requested block does not exist
    Unavailable {
        #[serde(rename = "blockId")]
        block_id: BlockId,
    },

    /// Question from another participant
    Question { question: Question },

    /// Answer to one of our questions
    Answered { answer: Answer },

    /// Protocol error
    Error { message: String },
}

fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    ciborium::into_writer(msg, &mut bytes).map_err(|e| e.to_string())?;
    Ok(bytes)
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, SessionError> {
    ciborium::from_reader(bytes).map_err(|e| SessionError::MalformedPayload(e.to_string()))
}

fn require_block_id(block_id: &BlockId) -> Result<(), SessionError> {
    if block_id.is_blank() {
        return Err(SessionError::MalformedPayload(
            "empty block id".to_string(),
        ));
    }
    Ok(())
}

impl ClientMessage {
    /// Encode message to CBOR bytes
    pub fn encode(&self) -> Result<Vec<u8>, String> {
        encode(self)
    }

    /// Decode and validate a message from CBOR bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, SessionError> {
        let msg: Self = decode(bytes)?;
        msg.validate()?;
        Ok(msg)
    }

    /// Reject messages that decode but cannot be acted on
    pub fn validate(&self) -> Result<(), SessionError> {
        match self {
            ClientMessage::Join { block_id }
            | ClientMessage::Leave { block_id }
            | ClientMessage::Edit { block_id, .. }
            | ClientMessage::Load { block_id } => require_block_id(block_id),
            ClientMessage::Save { block } => require_block_id(&block.id),
            ClientMessage::Hello { participant } if participant.name.trim().is_empty() => Err(
                SessionError::MalformedPayload("participant without a name".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Hello { .. } => "hello",
            ClientMessage::Join { .. } => "join",
            ClientMessage::Leave { .. } => "leave",
            ClientMessage::Edit { .. } => "edit",
            ClientMessage::Load { .. } => "load",
            ClientMessage::Save { .. } => "save",
            ClientMessage::Ask { .. } => "ask",
            ClientMessage::Answer { .. } => "answer",
        }
    }
}

impl ServerMessage {
    /// Encode message to CBOR bytes
    pub fn encode(&self) -> Result<Vec<u8>, String> {
        encode(self)
    }

    /// Decode and validate a message from CBOR bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, SessionError> {
        let msg: Self = decode(bytes)?;
        match &msg {
            ServerMessage::Edited { block_id, .. } | ServerMessage::Unavailable { block_id } => {
                require_block_id(block_id)?
            }
            ServerMessage::Snapshot { block } => require_block_id(&block.id)?,
            _ => {}
        }
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_message_encoding() {
        let msg = ClientMessage::Edit {
            block_id: BlockId::new("async"),
            content: "let a".to_string(),
        };
        let bytes = msg.encode().unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(ClientMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_wire_field_names() {
        let msg = ClientMessage::Join {
            block_id: BlockId::new("dom"),
        };
        let bytes = msg.encode().unwrap();
        let value: ciborium::Value = ciborium::from_reader(bytes.as_slice()).unwrap();
        let map = value.as_map().unwrap();

        let keys: Vec<&str> = map.iter().filter_map(|(k, _)| k.as_text()).collect();
        assert!(keys.contains(&"type"));
        assert!(keys.contains(&"blockId"));
    }

    #[test]
    fn test_blank_block_id_rejected() {
        let msg = ClientMessage::Edit {
            block_id: BlockId::new(" "),
            content: "x".to_string(),
        };
        let bytes = msg.encode().unwrap();
        assert!(matches!(
            ClientMessage::decode(&bytes),
            Err(SessionError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            ServerMessage::decode(&[0xff, 0x00, 0x13]),
            Err(SessionError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_missing_field_is_malformed() {
        // An edit without content
        let mut bytes = Vec::new();
        let value = ciborium::Value::Map(vec![
            (
                ciborium::Value::Text("type".into()),
                ciborium::Value::Text("edit".into()),
            ),
            (
                ciborium::Value::Text("blockId".into()),
                ciborium::Value::Text("dom".into()),
            ),
        ]);
        ciborium::into_writer(&value, &mut bytes).unwrap();
        assert!(ClientMessage::decode(&bytes).is_err());
    }

    #[test]
    fn test_edited_keeps_sender() {
        let sender = ParticipantId::new();
        let msg = ServerMessage::Edited {
            block_id: BlockId::new("event"),
            sender_id: sender,
            content: "log('sync')".to_string(),
        };
        let bytes = msg.encode().unwrap();

        match ServerMessage::decode(&bytes).unwrap() {
            ServerMessage::Edited { sender_id, .. } => assert_eq!(sender_id, sender),
            other => panic!("Expected Edited, got {:?}", other),
        }
    }

    #[test]
    fn test_hello_requires_name() {
        let msg = ClientMessage::Hello {
            participant: Participant::student(" "),
        };
        assert!(msg.validate().is_err());
        assert!(ClientMessage::Hello {
            participant: Participant::mentor("Grace"),
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_server_message_decoding() {
        let msg = ServerMessage::Welcome {
            server_id: "relay-1".to_string(),
        };
        let bytes = msg.encode().unwrap();

        match ServerMessage::decode(&bytes).unwrap() {
            ServerMessage::Welcome { server_id } => assert_eq!(server_id, "relay-1"),
            _ => panic!("Expected Welcome message"),
        }
    }
}
