//! Gateway frame format
//!
//! Every frame in both directions is a JSON object
//! `{ "operation": int, "event"?: int, "data"?: any }`. `data` stays an
//! opaque JSON value until a handler that recognizes `event` asks for it.

use super::{EventType, HelloData, OpCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error decoding a frame or its data
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Missing data for {0}")]
    MissingData(EventType),

    #[error("Invalid data for {event}: {source}")]
    InvalidData {
        event: EventType,
        #[source]
        source: serde_json::Error,
    },

    #[error("Frame has no event")]
    MissingEvent,
}

/// One gateway frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub operation: OpCode,

    /// Only set for Dispatch frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl GatewayPayload {
    // === Server Frames ===

    /// Create a Hello frame (op=10)
    #[must_use]
    pub fn hello(data: &HelloData) -> Self {
        Self {
            operation: OpCode::Hello,
            event: None,
            data: serde_json::to_value(data).ok(),
        }
    }

    /// Create a Heartbeat ACK frame (op=11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self {
            operation: OpCode::HeartbeatAck,
            event: None,
            data: None,
        }
    }

    /// Create a Dispatch frame (op=0) from an already encoded body
    #[must_use]
    pub fn dispatch(event: EventType, data: Value) -> Self {
        Self {
            operation: OpCode::Dispatch,
            event: Some(event),
            data: Some(data),
        }
    }

    /// Create a Dispatch frame (op=0) from a typed body
    pub fn dispatch_with<T: Serialize>(event: EventType, data: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::dispatch(event, serde_json::to_value(data)?))
    }

    // === Codec ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(json).map_err(DecodeError::Malformed)
    }

    /// Deserialize from raw bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(bytes).map_err(DecodeError::Malformed)
    }

    /// Decode `data` as the body of this frame's event
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let event = self.event.ok_or(DecodeError::MissingEvent)?;
        let data = self.data.clone().ok_or(DecodeError::MissingData(event))?;
        serde_json::from_value(data).map_err(|source| DecodeError::InvalidData { event, source })
    }
}
