pub mod openai;

use async_trait::async_trait;
use futures::{ stream, Future };
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use self::openai::OpenAIChatClient;
use super::{ FragmentStream, GatewayError, LlmConfig };
use crate::models::chat::{ ChatMessage, Role };

/// Fragment that replaces the reply when the completion service throttles us.
pub const RATE_LIMIT_NOTICE: &str = "Rate limit reached. Please try again later.";

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Submits `messages` in streaming mode. Rate limiting is reported as a
    /// single `RATE_LIMIT_NOTICE` fragment, never as an error.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, GatewayError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> String;
}

pub fn validate_messages(messages: &[ChatMessage]) -> Result<(), GatewayError> {
    match messages.last() {
        None => Err(GatewayError::InvalidInput("message list is empty".into())),
        Some(last) if last.role != Role::User => {
            Err(
                GatewayError::InvalidInput(
                    format!("last message must come from the user, got '{}'", last.role)
                )
            )
        }
        Some(_) => Ok(()),
    }
}

pub fn rate_limit_stream() -> FragmentStream {
    Box::pin(stream::iter(vec![Ok(RATE_LIMIT_NOTICE.to_string())]))
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> FragmentStream
    where
        F: FnOnce(mpsc::Sender<Result<String, GatewayError>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, GatewayError> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
