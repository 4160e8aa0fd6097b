//! API routes module

pub mod ai_stream;

use std::sync::Arc;

use crate::api::state::AppState;
use axum::Router;

type SharedState = Arc<AppState>;

/// Create the combined API router
pub fn router() -> Router<SharedState> {
    Router::new()
        // Streaming completion relay
        .nest("/ai-stream", ai_stream::router())
}
