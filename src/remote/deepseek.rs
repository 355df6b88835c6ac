//! DeepSeek chat completions client
//!
//! OpenAI-compatible wire format: POST {base_url}/chat/completions with a
//! bearer token. Reasoner replies carry `reasoning_content` next to `content`.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ChatMessage, Completion, CompletionClient, RemoteError};
use crate::types::Model;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

pub struct DeepSeekClient {
    client: Client,
    base_url: String,
}

impl DeepSeekClient {
    /// Build a client with the request timeout disabled: a slow or hung
    /// completion blocks the caller until the server answers.
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(None::<Duration>).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: Model,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

fn parse_response(body: &str) -> Result<Completion, RemoteError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| RemoteError::Malformed(format!("failed to parse response: {e}")))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RemoteError::Malformed("response has no choices".into()))?;

    let content = choice
        .message
        .content
        .ok_or_else(|| RemoteError::Malformed("response message has no content".into()))?;

    Ok(Completion {
        content,
        reasoning_content: choice.message.reasoning_content,
    })
}

impl CompletionClient for DeepSeekClient {
    fn complete(
        &self,
        api_key: &str,
        model: Model,
        messages: &[ChatMessage],
    ) -> Result<Completion, RemoteError> {
        let request = CompletionRequest {
            model,
            messages,
            stream: false,
        };

        debug!(%model, messages = messages.len(), "sending completion request");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "completion request rejected");
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_response(&body)
    }
}
