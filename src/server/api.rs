use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    body::Body,
    extract::{ rejection::JsonRejection, Path, State },
    http::{ header, Method, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ delete, get, post },
    Json,
    Router,
};
use futures::StreamExt;
use log::{ debug, error, info, warn };
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{ AllowHeaders, AllowOrigin, CorsLayer };

use super::error::ApiError;
use crate::history::{ HistoryError, HistoryStore };
use crate::llm::chat::ChatClient;
use crate::llm::FragmentStream;
use crate::models::chat::{ ChatMessage, ChatRequest, MessageResponse, Role, StatusResponse };

#[derive(Clone)]
pub struct AppState {
    pub history: Arc<dyn HistoryStore>,
    pub chat_client: Arc<dyn ChatClient>,
    pub system_prompt: Arc<str>,
}

impl AppState {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        chat_client: Arc<dyn ChatClient>,
        system_prompt: &str
    ) -> Self {
        Self {
            history,
            chat_client,
            system_prompt: Arc::from(system_prompt),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Credentialed CORS cannot use a wildcard origin, so the caller's origin is echoed back.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/history", get(list_history_handler))
        .route("/api/history/{chat_id}", delete(delete_history_handler))
        .route("/api/chat", post(chat_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    addr: &str,
    state: AppState,
    tls: Option<(&str, &str)>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    let app = build_router(state);

    if let Some((cert_path, key_path)) = tls {
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        info!("Starting HTTPS API server on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            e
        })?;

        info!("Starting HTTP API server on: http://{}", addr);
        axum::serve(listener, app.into_make_service()).await?;
    }

    Ok(())
}

async fn health_handler() -> Json<StatusResponse> {
    Json(StatusResponse { status: "OK".into() })
}

async fn list_history_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.history.list_all().await)
}

async fn delete_history_handler(
    State(state): State<AppState>,
    Path(chat_id): Path<String>
) -> Result<Json<MessageResponse>, ApiError> {
    if state.history.delete(&chat_id).await {
        info!("Deleted conversation {}", chat_id);
        Ok(Json(MessageResponse::new("Chat deleted successfully")))
    } else {
        Err(ApiError::NotFound("Chat not found".into()))
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Response, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if req.chat_id.is_empty() {
        return Err(ApiError::BadRequest("chat_id must not be empty".into()));
    }

    state.history.create_if_absent(&req.chat_id, &req.prompt).await;
    state.history.append_message(&req.chat_id, Role::User, &req.prompt).await?;

    let conversation = state.history
        .get(&req.chat_id).await
        .ok_or_else(|| HistoryError::NotFound(req.chat_id.clone()))?;

    let mut messages = Vec::with_capacity(conversation.messages.len() + 1);
    messages.push(ChatMessage::system(&*state.system_prompt));
    messages.extend(conversation.messages);

    debug!("Chat turn for {} with {} stored messages", req.chat_id, messages.len() - 1);
    let fragments = state.chat_client.stream_chat(&messages).await?;

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(relay_completion(state.history.clone(), req.chat_id, fragments, tx));

    Ok(
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Body::from_stream(ReceiverStream::new(rx)),
        ).into_response()
    )
}

/// Drives the completion to its end independently of the caller. Relaying
/// stops when the caller goes away; the assistant turn is committed anyway,
/// and before the response body is closed.
async fn relay_completion(
    history: Arc<dyn HistoryStore>,
    chat_id: String,
    mut fragments: FragmentStream,
    tx: mpsc::Sender<Result<String, io::Error>>
) {
    let mut reply = String::new();
    let mut relaying = true;

    while let Some(item) = fragments.next().await {
        match item {
            Ok(fragment) => {
                reply.push_str(&fragment);
                if relaying && tx.send(Ok(fragment)).await.is_err() {
                    debug!("Caller for {} disconnected, finishing completion without relay", chat_id);
                    relaying = false;
                }
            }
            Err(e) => {
                error!("Completion for {} failed mid-stream: {}", chat_id, e);
                if relaying {
                    let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
                }
                return;
            }
        }
    }

    if let Err(e) = history.append_message(&chat_id, Role::Assistant, &reply).await {
        warn!("Dropping assistant reply for {}: {}", chat_id, e);
    }
    drop(tx);
}
