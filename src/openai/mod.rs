//! Minimal chat-completions client used by question generation and scoring.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::OpenAiClient;
pub use error::OpenAiError;
pub use types::{ChatRequest, ChatResponse, Message};

/// Seam between the collaborators and the HTTP client, so tests can swap in a mock.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_chat(&self, req: &ChatRequest) -> Result<ChatResponse, OpenAiError>;
}

/// Model settings shared by every prompt the crate sends.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
}

/// Sends a system + user prompt and returns the first choice's text.
pub async fn ask(
    sender: &dyn ChatSender,
    settings: &ChatSettings,
    system: &str,
    user: String,
) -> Result<String, OpenAiError> {
    let req = ChatRequest {
        model: settings.model.clone(),
        temperature: settings.temperature,
        messages: vec![Message::system(system), Message::user(user)],
    };
    let response = sender.send_chat(&req).await?;
    response
        .first_text()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(OpenAiError::EmptyResponse)
}
