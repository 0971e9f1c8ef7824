#![allow(dead_code)]

use async_trait::async_trait;
use axum::{ body::Body, http::{ header::CONTENT_TYPE, Request }, Router };
use chat_relay::history::{ HistoryStore, MemoryHistoryStore };
use chat_relay::llm::chat::{ rate_limit_stream, ChatClient };
use chat_relay::llm::{ FragmentStream, GatewayError };
use chat_relay::models::chat::ChatMessage;
use chat_relay::server::api::{ build_router, AppState };
use futures::stream;
use std::sync::{ Arc, Mutex };

/// How the scripted completion service answers every call.
#[derive(Clone)]
pub enum Script {
    Reply(Vec<&'static str>),
    RateLimited,
    FailBeforeStream,
    FailMidStream(Vec<&'static str>),
}

pub struct ScriptedChatClient {
    script: Script,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChatClient {
    pub fn new(script: Script) -> Self {
        Self { script, calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, GatewayError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        match &self.script {
            Script::Reply(fragments) => {
                let items: Vec<Result<String, GatewayError>> = fragments
                    .iter()
                    .map(|f| Ok(f.to_string()))
                    .collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Script::RateLimited => Ok(rate_limit_stream()),
            Script::FailBeforeStream => {
                Err(GatewayError::Status { status: 500, body: "upstream exploded".into() })
            }
            Script::FailMidStream(fragments) => {
                let mut items: Vec<Result<String, GatewayError>> = fragments
                    .iter()
                    .map(|f| Ok(f.to_string()))
                    .collect();
                items.push(Err(GatewayError::Api("connection reset".into())));
                Ok(Box::pin(stream::iter(items)))
            }
        }
    }

    fn get_model(&self) -> String {
        "scripted".into()
    }

    fn get_base_url(&self) -> String {
        "memory://scripted".into()
    }
}

pub struct TestApp {
    pub router: Router,
    pub history: Arc<dyn HistoryStore>,
    pub client: Arc<ScriptedChatClient>,
}

impl TestApp {
    pub fn new(script: Script) -> Self {
        let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new());
        let client = Arc::new(ScriptedChatClient::new(script));
        let state = AppState::new(history.clone(), client.clone(), "You are a helpful assistant.");
        Self {
            router: build_router(state),
            history,
            client,
        }
    }
}

pub fn chat_request(prompt: &str, chat_id: &str) -> Request<Body> {
    let payload = serde_json::json!({ "prompt": prompt, "chat_id": chat_id });
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_text(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(body: Body) -> serde_json::Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
