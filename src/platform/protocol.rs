//! Wire types for the messenger bridge.
//!
//! All communication uses newline-delimited JSON (one JSON object per line).
//! Requests carry a client-chosen `id`; the bridge answers each with exactly
//! one `Response` or `Failure` carrying the same id. `Event` lines are pushed
//! at any time once `Listen` has succeeded.

use super::{InboundEvent, OutgoingMessage, PlatformError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operations sent from the client to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BridgeOp {
    Login {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        email: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        password: Option<String>,
        #[serde(
            rename = "appState",
            skip_serializing_if = "Option::is_none",
            default
        )]
        app_state: Option<Value>,
        #[serde(rename = "forceLogin")]
        force_login: bool,
    },
    GetThreadInfo {
        #[serde(rename = "threadId")]
        thread_id: String,
    },
    GetUserInfo {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Listen,
    StopListening,
    SendMessage {
        message: OutgoingMessage,
        #[serde(rename = "threadId")]
        thread_id: String,
    },
    Logout,
}

impl BridgeOp {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeOp::Login { .. } => "Login",
            BridgeOp::GetThreadInfo { .. } => "GetThreadInfo",
            BridgeOp::GetUserInfo { .. } => "GetUserInfo",
            BridgeOp::Listen => "Listen",
            BridgeOp::StopListening => "StopListening",
            BridgeOp::SendMessage { .. } => "SendMessage",
            BridgeOp::Logout => "Logout",
        }
    }
}

/// Encodes a request line (without the trailing newline).
pub fn encode_request(id: u64, op: &BridgeOp) -> Result<String, PlatformError> {
    let mut value =
        serde_json::to_value(op).map_err(|e| PlatformError::Transport(e.to_string()))?;
    if let Value::Object(map) = &mut value {
        map.insert("id".to_string(), Value::from(id));
    }
    serde_json::to_string(&value).map_err(|e| PlatformError::Transport(e.to_string()))
}

/// Messages sent from the bridge to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    Response {
        id: u64,
        #[serde(default)]
        data: Value,
    },
    Failure {
        id: u64,
        error: BridgeFailure,
    },
    Event {
        event: InboundEvent,
    },
}

/// Failure payload. The platform client reports bad credentials as a
/// structured `{ error }` object and everything else as an error `message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<BridgeFailure> for PlatformError {
    fn from(failure: BridgeFailure) -> Self {
        match (failure.error, failure.message) {
            (Some(error), _) => PlatformError::Rejected(error),
            (None, Some(message)) => PlatformError::Failure(message),
            (None, None) => PlatformError::Failure("unknown bridge failure".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "appState")]
    pub app_state: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenResponse {
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
