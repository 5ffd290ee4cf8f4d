//! Chat HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer a question, streamed as plain UTF-8 text |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Request
//!
//! ```json
//! { "message": "What is X?", "history": [{ "role": "user", "content": "..." }] }
//! ```
//!
//! `history` is optional, oldest first. Only the last `server.max_history`
//! turns are forwarded to the model.
//!
//! # Error Contract
//!
//! Errors that happen before streaming starts are returned as JSON:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream_error` (500), `internal` (500).
//! Once the 200 response has started, the body is the answer text and ends
//! when the model finishes.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for browser clients.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::completion::CompletionClient;
use crate::config::Config;
use crate::error::ChatError;
use crate::models::ConversationTurn;
use crate::relay::relay;
use crate::retrieval::{build_prompt, Retriever};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub retriever: Arc<Retriever>,
    pub completion: Arc<CompletionClient>,
    pub max_history: usize,
}

impl AppState {
    /// Build production state: Supabase retrieval plus the configured
    /// completion provider. Missing retrieval credentials only disable
    /// grounding; a missing completion key surfaces per request.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            retriever: Arc::new(Retriever::from_config(config)),
            completion: Arc::new(CompletionClient::new(config.completion.clone())?),
            max_history: config.server.max_history,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<ConversationTurn>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind `server.bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(model = %config.completion.model, "chat server listening on http://{}", config.server.bind);
    println!("chat server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Keep the newest `max` turns.
fn trailing(history: &[ConversationTurn], max: usize) -> &[ConversationTurn] {
    &history[history.len().saturating_sub(max)..]
}

async fn handle_chat(State(state): State<AppState>, body: Bytes) -> Result<Response, ChatError> {
    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| ChatError::Validation(format!("invalid request body: {}", e)))?;
    if request.message.is_empty() {
        return Err(ChatError::Validation("message must not be empty".into()));
    }

    let history = trailing(&request.history, state.max_history);
    let retrieval = state.retriever.retrieve(&request.message).await;
    info!(
        grounded = retrieval.is_grounded(),
        sources = retrieval.sources().len(),
        history = history.len(),
        "chat request"
    );

    let messages = build_prompt(
        &request.message,
        retrieval.sources(),
        history,
        state.retriever.answer_language(),
    );
    let upstream = state.completion.stream_chat(&messages).await?;
    debug!(model = state.completion.model(), "relaying completion stream");

    let stream = relay(upstream.bytes_stream(), state.completion.idle_timeout());
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
