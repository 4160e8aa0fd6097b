//! Router for the streaming completion relay

use std::sync::Arc;

use anyhow::{Context, anyhow};
use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
};
use futures_util::StreamExt;
use http::header;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::Instrument;
use uuid::Uuid;

use super::public::{self, CompletionRequest};
use crate::api::public::ApiError;
use crate::api::state::AppState;
use crate::openai::{CompletionParams, Message, Role, SharedProvider};

type SharedState = Arc<AppState>;

const INVALID_PROMPT: &str = "Invalid prompt. Prompt must be a non-empty string.";
const INVALID_HISTORY: &str = "Invalid chat history. Must be an array.";

/// Validates the raw body. Malformed JSON is treated as a server
/// error, anything structurally wrong with the fields is the caller's
/// fault.
fn parse_request(body: &[u8]) -> Result<CompletionRequest, ApiError> {
    let value: Value = serde_json::from_slice(body).context("Failed to parse request body")?;

    let prompt = match value.get("prompt") {
        Some(Value::String(prompt)) if !prompt.trim().is_empty() => prompt.clone(),
        _ => return Err(ApiError::InvalidInput(INVALID_PROMPT.to_string())),
    };

    let Some(Value::Array(entries)) = value.get("chatHistory") else {
        return Err(ApiError::InvalidInput(INVALID_HISTORY.to_string()));
    };

    let mut chat_history = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let msg = serde_json::from_value::<Message>(entry.clone())
            .ok()
            // The system message is ours to set
            .filter(|msg| msg.role != Role::System)
            .ok_or_else(|| {
                ApiError::InvalidInput(format!("Invalid chat history entry at index {}.", idx))
            })?;
        chat_history.push(msg);
    }

    let max_tokens = match value.get("maxTokens") {
        None | Some(Value::Null) => public::DEFAULT_MAX_TOKENS,
        Some(v) => v
            .as_u64()
            // JavaScript clients can't tell 4000 and 4000.0 apart
            .or_else(|| {
                v.as_f64()
                    .filter(|f| f.fract() == 0.0 && (1.0..=u32::MAX as f64).contains(f))
                    .map(|f| f as u64)
            })
            .filter(|n| *n > 0)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                ApiError::InvalidInput("Invalid maxTokens. Must be a positive integer.".to_string())
            })?,
    };

    let temperature = match value.get("temperature") {
        None | Some(Value::Null) => public::DEFAULT_TEMPERATURE,
        Some(v) => v
            .as_f64()
            .filter(|t| (0.0..=2.0).contains(t))
            .map(|t| t as f32)
            .ok_or_else(|| {
                ApiError::InvalidInput(
                    "Invalid temperature. Must be a number between 0 and 2.".to_string(),
                )
            })?,
    };

    Ok(CompletionRequest {
        prompt,
        chat_history,
        max_tokens,
        temperature,
    })
}

/// Pipes the provider's deltas into the response channel in the order
/// they arrive. An error is forwarded once and ends the relay, which
/// aborts the response body.
async fn relay(
    provider: SharedProvider,
    params: CompletionParams,
    tx: mpsc::UnboundedSender<anyhow::Result<String>>,
) {
    let mut upstream = match provider.stream_completion(params).await {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::error!("Upstream request failed: {:#}", e);
            let _ = tx.send(Err(e));
            return;
        }
    };

    let mut chunk_count = 0;
    while let Some(delta) = upstream.next().await {
        match delta {
            Ok(text) => {
                // The receiver is dropped when the client goes away
                if tx.send(Ok(text)).is_err() {
                    tracing::info!(
                        "Client disconnected after {} chunks, dropping upstream",
                        chunk_count
                    );
                    return;
                }
                chunk_count += 1;
            }
            Err(e) => {
                tracing::error!("Streaming error after {} chunks: {:#}", chunk_count, e);
                let _ = tx.send(Err(e));
                return;
            }
        }
    }

    tracing::debug!("Upstream finished after {} chunks", chunk_count);
}

/// Validate the prompt and chat history and stream the completion
/// back as plain text
async fn ai_stream_handler(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("ai_stream", %request_id);

    let request = span.in_scope(|| parse_request(&body))?;

    if state.config.openai_api_key.is_none() {
        return Err(anyhow!("Missing env var OPENAI_API_KEY").into());
    }

    let mut messages = Vec::with_capacity(request.chat_history.len() + 2);
    if !state.config.system_message.is_empty() {
        messages.push(Message::new(Role::System, &state.config.system_message));
    }
    messages.extend(request.chat_history);
    messages.push(Message::new(Role::User, &request.prompt));

    span.in_scope(|| {
        tracing::debug!(
            "Relaying {} messages, max_tokens={}, temperature={}",
            messages.len(),
            request.max_tokens,
            request.temperature
        )
    });

    let params = CompletionParams {
        messages,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
    };
    let (tx, rx) = mpsc::unbounded_channel::<anyhow::Result<String>>();
    tokio::spawn(relay(Arc::clone(&state.provider), params, tx).instrument(span));

    let body = Body::from_stream(UnboundedReceiverStream::new(rx));
    let resp = (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response();

    Ok(resp)
}

/// Create the relay router
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(ai_stream_handler))
}
