use std::time::Duration;
use thiserror::Error;

/// Failures talking to the completion service.
///
/// None of these say anything about the *content* of a reply; the engine
/// retries them with backoff and leaves the prompt untouched.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("completion service unreachable: {0}")]
    Transport(String),

    #[error("completion service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion service rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("completion service returned an empty reply")]
    EmptyReply,
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        CompletionError::Transport(err.to_string())
    }
}

/// Failures turning a reply into a schema-valid value.
///
/// The `Display` text is fed back to the model verbatim, so keep it specific.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("no JSON object found in the response")]
    NoJson,

    #[error("response does not match the {schema} schema: {message}")]
    Schema { schema: &'static str, message: String },

    #[error("response failed {schema} validation: {message}")]
    Invalid { schema: &'static str, message: String },
}

/// Cache persistence failure. Logged and swallowed by the engine.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
