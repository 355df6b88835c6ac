//! Remote completion capability
//!
//! The turn engine only sees `CompletionClient`; `DeepSeekClient` is the
//! HTTP implementation used by the binary.

mod deepseek;

pub use deepseek::{DeepSeekClient, DEFAULT_BASE_URL};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Model, Role};

/// One entry of the outbound message sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// What the remote model answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    /// Reasoning trace; `None` when the service sent none
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection, TLS or body read failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status (auth, quota, bad request, server error)
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A black-box chat completion service.
///
/// Implementations perform exactly one request per call and must not retry.
pub trait CompletionClient: Send + Sync {
    fn complete(
        &self,
        api_key: &str,
        model: Model,
        messages: &[ChatMessage],
    ) -> Result<Completion, RemoteError>;
}
