//! Sync request and response types as they cross the wire.
//!
//! Timestamps travel in their fixed-width string form and are parsed when a
//! request or response is decoded, so a bad value is reported by name
//! instead of as a generic decoding failure. Bodies are CBOR.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use tally_core::{GroupId, MerkleTrie, Message, Timestamp};

use crate::error::{Result, SyncError};

/// Message size limits.
pub mod limits {
    /// Default max messages in one request.
    pub const DEFAULT_MAX_MESSAGES_PER_REQUEST: usize = 10_000;
}

/// One message in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub timestamp: String,
    pub is_encrypted: bool,
    pub content: Bytes,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            timestamp: message.timestamp.to_string(),
            is_encrypted: message.is_encrypted,
            content: message.content.clone(),
        }
    }
}

impl TryFrom<&WireMessage> for Message {
    type Error = SyncError;

    fn try_from(wire: &WireMessage) -> Result<Self> {
        let timestamp: Timestamp = wire.timestamp.parse()?;
        Ok(Message::new(timestamp, wire.is_encrypted, wire.content.clone()))
    }
}

/// A peer's sync call: its unsynced messages and the cursor it last saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub group_id: GroupId,
    pub since: String,
    pub messages: Vec<WireMessage>,
}

impl SyncRequest {
    pub fn new(group_id: GroupId, since: Timestamp, messages: &[Message]) -> Self {
        Self {
            group_id,
            since: since.to_string(),
            messages: messages.iter().map(WireMessage::from).collect(),
        }
    }

    /// The parsed `since` cursor.
    pub fn since(&self) -> Result<Timestamp> {
        Ok(self.since.parse()?)
    }

    /// The parsed messages.
    pub fn to_messages(&self) -> Result<Vec<Message>> {
        self.messages.iter().map(Message::try_from).collect()
    }
}

/// The relay's answer: its trie after the call and the messages the caller
/// has not seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponseWire {
    pub merkle: MerkleTrie,
    pub messages: Vec<WireMessage>,
}

impl SyncResponseWire {
    pub fn new(merkle: MerkleTrie, messages: &[Message]) -> Self {
        Self {
            merkle,
            messages: messages.iter().map(WireMessage::from).collect(),
        }
    }

    /// The parsed messages.
    pub fn to_messages(&self) -> Result<Vec<Message>> {
        self.messages.iter().map(Message::try_from).collect()
    }
}

/// Encode a request as CBOR.
pub fn encode_request(request: &SyncRequest) -> Result<Vec<u8>> {
    to_cbor(request)
}

/// Decode a CBOR request, checking every timestamp it carries.
pub fn decode_request(bytes: &[u8]) -> Result<SyncRequest> {
    let request: SyncRequest = from_cbor(bytes)?;
    request.since()?;
    request.to_messages()?;
    Ok(request)
}

/// Encode a response as CBOR.
pub fn encode_response(response: &SyncResponseWire) -> Result<Vec<u8>> {
    to_cbor(response)
}

/// Decode a CBOR response, checking every timestamp it carries.
pub fn decode_response(bytes: &[u8]) -> Result<SyncResponseWire> {
    let response: SyncResponseWire = from_cbor(bytes)?;
    response.to_messages()?;
    Ok(response)
}

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| SyncError::Encoding(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| SyncError::Decoding(e.to_string()))
}
