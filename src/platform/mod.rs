//! Boundary to the remote messaging service.
//!
//! The core only sees the [`MessengerPlatform`] / [`PlatformSession`] traits.
//! The binary talks to a local messenger bridge through [`bridge`]; tests use
//! the scripted platform in `fake`.

pub mod bridge;
pub mod protocol;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Opaque, serializable login session blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppState(pub serde_json::Value);

/// Email/password pair. Debug output never shows the password.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum LoginRequest {
    Credentials(Credentials),
    AppState(AppState),
}

impl LoginRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            LoginRequest::Credentials(_) => "credentials",
            LoginRequest::AppState(_) => "app_state",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoginOptions {
    /// Auto-approve recent logins instead of failing on step-up verification.
    pub force_login: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadInfo {
    #[serde(default)]
    pub thread_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub name: Option<String>,
}

/// Events delivered on the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InboundEvent {
    Message {
        #[serde(rename = "threadId", default)]
        thread_id: Option<String>,
        #[serde(rename = "senderId", default)]
        sender_id: Option<String>,
        #[serde(default)]
        body: Option<String>,
    },
    Error {
        message: String,
    },
}

impl InboundEvent {
    /// The conversation a message event belongs to. Falls back to the sender
    /// for one-to-one chats where the platform omits the thread.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            InboundEvent::Message {
                thread_id,
                sender_id,
                ..
            } => thread_id
                .as_deref()
                .or(sender_id.as_deref())
                .filter(|id| !id.is_empty()),
            InboundEvent::Error { .. } => None,
        }
    }
}

/// Payload handed to `send_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    Sticker { sticker: u64 },
    Text { body: String },
}

/// Errors surfaced by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// Structured rejection, e.g. wrong username/password.
    #[error("{0}")]
    Rejected(String),
    /// Free-form failure message from the platform client.
    #[error("{0}")]
    Failure(String),
    /// The bridge connection broke or returned something unreadable.
    #[error("bridge transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait MessengerPlatform: Send + Sync {
    async fn login(
        &self,
        request: LoginRequest,
        options: LoginOptions,
    ) -> Result<Arc<dyn PlatformSession>, PlatformError>;
}

/// An authenticated handle. Consumers only issue requests through it.
#[async_trait]
pub trait PlatformSession: Send + Sync {
    /// Serializable state that lets a later run log in without credentials.
    fn app_state(&self) -> AppState;

    async fn thread_info(&self, thread_id: &str) -> Result<ThreadInfo, PlatformError>;

    async fn user_info(&self, user_id: &str) -> Result<UserInfo, PlatformError>;

    /// Starts the inbound event stream.
    async fn listen(&self) -> Result<mpsc::UnboundedReceiver<InboundEvent>, PlatformError>;

    /// True while the inbound stream is connected.
    fn is_active(&self) -> bool;

    async fn send_message(
        &self,
        message: &OutgoingMessage,
        thread_id: &str,
    ) -> Result<(), PlatformError>;

    async fn stop_listening(&self) -> Result<(), PlatformError>;

    async fn logout(&self) -> Result<(), PlatformError>;
}
