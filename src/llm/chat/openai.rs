use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, warn };
use reqwest::{
    Client as HttpClient,
    StatusCode,
    header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION },
};
use serde::{ Deserialize, Serialize };
use tokio::sync::mpsc;

use super::{ create_streaming_response, rate_limit_stream, validate_messages, ChatClient, RATE_LIMIT_NOTICE };
use crate::llm::{ FragmentStream, GatewayError, LlmConfig, DEFAULT_CHAT_MODEL, DEFAULT_CHAT_URL };
use crate::models::chat::ChatMessage;

pub struct OpenAIChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    error: Option<OpenAIErrorBody>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIErrorBody {
    #[serde(default)]
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
}

impl OpenAIErrorBody {
    fn is_rate_limit(&self) -> bool {
        self.code.as_deref() == Some("rate_limit_exceeded") ||
            matches!(self.error_type.as_deref(), Some("requests") | Some("tokens"))
    }
}

/// What a single server-sent-event line contributes to the reply.
#[derive(Debug, PartialEq, Eq)]
pub enum SseEvent {
    Skip,
    Done,
    Fragments(Vec<String>),
    RateLimited,
    Error(String),
}

pub fn parse_sse_line(line: &str) -> SseEvent {
    let line = line.trim_end_matches('\r');
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim_start(),
        None => {
            return SseEvent::Skip;
        }
    };

    if data.is_empty() {
        return SseEvent::Skip;
    }
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(resp) => {
            if let Some(error) = resp.error {
                if error.is_rate_limit() {
                    return SseEvent::RateLimited;
                }
                return SseEvent::Error(error.message);
            }
            let fragments: Vec<String> = resp.choices
                .into_iter()
                .filter_map(|choice| choice.delta.content)
                .filter(|content| !content.is_empty())
                .collect();
            if fragments.is_empty() {
                SseEvent::Skip
            } else {
                SseEvent::Fragments(fragments)
            }
        }
        Err(e) => {
            warn!("Unparseable completion payload: {} for data: {}", e, data);
            SseEvent::Skip
        }
    }
}

/// Pushes one parsed line to the fragment channel. Returns `false` once the
/// stream is finished or the receiver is gone.
async fn forward_event(event: SseEvent, tx: &mpsc::Sender<Result<String, GatewayError>>) -> bool {
    match event {
        SseEvent::Skip => true,
        SseEvent::Done => false,
        SseEvent::Fragments(fragments) => {
            for fragment in fragments {
                if tx.send(Ok(fragment)).await.is_err() {
                    return false;
                }
            }
            true
        }
        SseEvent::RateLimited => {
            warn!("OpenAI rate limit reached mid-stream");
            let _ = tx.send(Ok(RATE_LIMIT_NOTICE.to_string())).await;
            false
        }
        SseEvent::Error(message) => {
            let _ = tx.send(Err(GatewayError::Api(message))).await;
            false
        }
    }
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, GatewayError> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        let api_url = base_url.unwrap_or_else(|| DEFAULT_CHAT_URL.to_string());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            api_key,
            model: chat_model,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, GatewayError> {
        if config.api_key.is_empty() {
            warn!("OpenAI API key is empty; completion requests will be rejected upstream");
        }
        Self::new(config.api_key.clone(), config.completion_model.clone(), config.base_url.clone())
    }

    fn auth_header(&self) -> Result<HeaderValue, GatewayError> {
        HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|e|
            GatewayError::Config(format!("Invalid API key format: {}", e))
        )
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, GatewayError> {
        validate_messages(messages)?;

        let req = OpenAIChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| OpenAIMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            stream: true,
        };

        debug!("Requesting {} completion with {} messages", self.model, messages.len());
        let resp = self.http
            .post(self.base_url.trim_end_matches('/'))
            .header(AUTHORIZATION, self.auth_header()?)
            .json(&req)
            .send().await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("OpenAI rate limit reached");
            return Ok(rate_limit_stream());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status: status.as_u16(), body });
        }

        Ok(
            create_streaming_response(move |tx| async move {
                let mut stream = resp.bytes_stream();
                let mut buffer: Vec<u8> = Vec::new();

                loop {
                    let chunk = match stream.next().await {
                        Some(Ok(chunk)) => chunk,
                        Some(Err(e)) => {
                            let _ = tx.send(Err(GatewayError::Http(e))).await;
                            return;
                        }
                        None => {
                            break;
                        }
                    };
                    buffer.extend_from_slice(&chunk);

                    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&line[..line.len() - 1]);
                        if !forward_event(parse_sse_line(&line), &tx).await {
                            return;
                        }
                    }
                }

                // Trailing line without a newline terminator.
                let rest = String::from_utf8_lossy(&buffer).to_string();
                forward_event(parse_sse_line(&rest), &tx).await;
            })
        )
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(line), SseEvent::Fragments(vec!["Hel".into()]));
    }

    #[test]
    fn skips_role_only_and_empty_deltas() {
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role_only), SseEvent::Skip);

        let empty = r#"data: {"choices":[{"delta":{"content":""},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_line(empty), SseEvent::Skip);

        assert_eq!(parse_sse_line(""), SseEvent::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
    }

    #[test]
    fn recognises_done_marker_with_crlf() {
        assert_eq!(parse_sse_line("data: [DONE]\r"), SseEvent::Done);
        assert_eq!(parse_sse_line("data:[DONE]"), SseEvent::Done);
    }

    #[test]
    fn classifies_error_payloads() {
        let throttled =
            r#"data: {"error":{"message":"slow down","type":"requests","code":"rate_limit_exceeded"}}"#;
        assert_eq!(parse_sse_line(throttled), SseEvent::RateLimited);

        let other = r#"data: {"error":{"message":"boom","type":"server_error","code":null}}"#;
        assert_eq!(parse_sse_line(other), SseEvent::Error("boom".into()));
    }

    #[test]
    fn skips_unparseable_payload() {
        assert_eq!(parse_sse_line("data: {not json"), SseEvent::Skip);
    }

    #[test]
    fn defaults_model_and_endpoint() {
        let client = OpenAIChatClient::from_config(&LlmConfig::default()).unwrap();
        assert_eq!(client.get_model(), DEFAULT_CHAT_MODEL);
        assert_eq!(client.get_base_url(), DEFAULT_CHAT_URL);
    }
}
