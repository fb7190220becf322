//! Errors raised while talking to the chat-completions endpoint.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpenAiError {
    /// HTTP 429. `retry_after_ms` comes from the `retry-after` header when present.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other non-success status, with the response body as message.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("response contained no message text")]
    EmptyResponse,
}
