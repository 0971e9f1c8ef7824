pub mod chat;

use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid completion input: {0}")]
    InvalidInput(String),

    #[error("invalid completion client configuration: {0}")]
    Config(String),

    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion service returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },

    #[error("completion service error: {0}")]
    Api(String),
}

/// Lazy, finite sequence of reply fragments in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GatewayError>> + Send>>;

#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub api_key: String,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
}
