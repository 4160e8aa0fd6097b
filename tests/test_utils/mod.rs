//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Error, anyhow};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use futures_util::StreamExt;
use tower::util::ServiceExt;

use promptrelay::api::{AppState, app};
use promptrelay::core::AppConfig;
use promptrelay::openai::{CompletionParams, CompletionProvider, DeltaStream};

pub const SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

/// Stands in for the model provider. Yields `chunks` in order and
/// then fails if `fail_at_end` is set. Counts how often it's called.
#[derive(Clone, Default)]
pub struct FakeProvider {
    pub chunks: Vec<String>,
    pub fail_at_end: bool,
    pub fail_on_open: bool,
    pub calls: Arc<AtomicUsize>,
    pub last_params: Arc<Mutex<Option<CompletionParams>>>,
}

impl FakeProvider {
    pub fn with_chunks(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing_after(chunks: &[&str]) -> Self {
        Self {
            fail_at_end: true,
            ..Self::with_chunks(chunks)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<CompletionParams> {
        self.last_params.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for FakeProvider {
    async fn stream_completion(&self, params: CompletionParams) -> Result<DeltaStream, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params);

        if self.fail_on_open {
            return Err(anyhow!("Completion request failed with status 401"));
        }

        let mut items: Vec<Result<String, Error>> = self.chunks.iter().cloned().map(Ok).collect();
        if self.fail_at_end {
            items.push(Err(anyhow!("upstream connection reset")));
        }
        let stream = futures::stream::iter(items).then(|item| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            item
        });
        Ok(stream.boxed())
    }
}

pub fn test_config(api_key: Option<&str>) -> AppConfig {
    AppConfig {
        openai_model: String::from("gpt-4o-mini"),
        openai_api_hostname: String::from("https://api.openai.com"),
        openai_api_key: api_key.map(String::from),
        system_message: String::from(SYSTEM_MESSAGE),
        upstream_timeout: Duration::from_secs(5),
    }
}

/// Creates a test application router backed by `provider`.
pub fn test_app(provider: FakeProvider) -> Router {
    test_app_with_config(provider, test_config(Some("test-api-key")))
}

pub fn test_app_with_config(
    provider: impl CompletionProvider + 'static,
    config: AppConfig,
) -> Router {
    let app_state = AppState::new(config, Arc::new(provider));
    app(Arc::new(app_state))
}

pub async fn post_ai_stream(app: Router, body: impl Into<Body>) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .uri("/api/ai-stream")
            .method("POST")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}

/// Serves the app on an ephemeral port and returns its base URL.
pub async fn spawn_server(provider: impl CompletionProvider + 'static) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = test_app_with_config(provider, test_config(Some("test-api-key")));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
