//! Message envelope and payload types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Opcodes
pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

/// First message from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

/// Unsolicited notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_intent: u32,
    #[serde(default)]
    pub event_data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    pub result: bool,
    pub code: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Value,
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(Hello),
    Identify(Identify),
    Identified(Identified),
    Event(Event),
    Request(Request),
    Response(RequestResponse),
    /// Any op this crate does not interpret (reidentify, batches, ...)
    Other { op: u8 },
}

impl Message {
    /// Decode a text frame
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(frame)?;
        let d = envelope.d;

        Ok(match envelope.op {
            op::HELLO => Message::Hello(serde_json::from_value(d)?),
            op::IDENTIFY => Message::Identify(serde_json::from_value(d)?),
            op::IDENTIFIED => Message::Identified(serde_json::from_value(d)?),
            op::EVENT => Message::Event(serde_json::from_value(d)?),
            op::REQUEST => Message::Request(serde_json::from_value(d)?),
            op::REQUEST_RESPONSE => Message::Response(serde_json::from_value(d)?),
            other => Message::Other { op: other },
        })
    }

    pub fn op(&self) -> u8 {
        match self {
            Message::Hello(_) => op::HELLO,
            Message::Identify(_) => op::IDENTIFY,
            Message::Identified(_) => op::IDENTIFIED,
            Message::Event(_) => op::EVENT,
            Message::Request(_) => op::REQUEST,
            Message::Response(_) => op::REQUEST_RESPONSE,
            Message::Other { op } => *op,
        }
    }

    /// Encode into a text frame
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        let d = match self {
            Message::Hello(m) => serde_json::to_value(m)?,
            Message::Identify(m) => serde_json::to_value(m)?,
            Message::Identified(m) => serde_json::to_value(m)?,
            Message::Event(m) => serde_json::to_value(m)?,
            Message::Request(m) => serde_json::to_value(m)?,
            Message::Response(m) => serde_json::to_value(m)?,
            Message::Other { .. } => Value::Object(Default::default()),
        };
        Ok(serde_json::to_string(&Envelope { op: self.op(), d })?)
    }
}
