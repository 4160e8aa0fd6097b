use std::sync::Arc;
use std::time::Duration;

use anyhow::{Error, Result, anyhow, bail};
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::AppConfig;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

/// A single entry in a chat transcript.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

/// Everything the provider needs to generate the next reply.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionParams {
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Ordered text deltas of a single completion. The stream ends when
/// the provider is done and yields an `Err` when it fails, after
/// which nothing else is produced.
pub type DeltaStream = BoxStream<'static, Result<String, Error>>;

/// The seam between the relay and whatever generates text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn stream_completion(&self, params: CompletionParams) -> Result<DeltaStream, Error>;
}

pub type SharedProvider = Arc<dyn CompletionProvider>;

/// Streams chat completions from an OpenAI compatible API.
#[derive(Clone, Debug)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_hostname: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(api_hostname: &str, api_key: Option<&str>, model: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_hostname: api_hostname.to_string(),
            api_key: api_key.map(String::from),
            model: model.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.openai_api_hostname,
            config.openai_api_key.as_deref(),
            &config.openai_model,
            config.upstream_timeout,
        )
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn stream_completion(&self, params: CompletionParams) -> Result<DeltaStream, Error> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(anyhow!("Missing env var OPENAI_API_KEY"))?;
        let payload = json!({
            "model": self.model,
            "messages": params.messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "stream": true,
        });
        let url = format!(
            "{}/v1/chat/completions",
            self.api_hostname.trim_end_matches("/")
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Completion request failed with status {}: {}", status, body);
        }

        Ok(sse_deltas(response).boxed())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Delta {
    Content { content: String },

    Reasoning { reasoning: String },

    Stop {},
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChunkChoice>,
    error: Option<Value>,
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Skip,
    Done,
}

/// Finds the end of the next complete SSE event, returning the
/// position of the separator and its length.
fn next_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer
        .windows(2)
        .position(|w| w == b"\n\n")
        .map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_event(event: &str) -> Result<SseEvent, Error> {
    let data = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    // Comments, keep-alives and other fields carry no data
    if data.is_empty() {
        return Ok(SseEvent::Skip);
    }

    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk = serde_json::from_str::<CompletionChunk>(&data).inspect_err(|e| {
        tracing::error!("Parsing completion chunk failed for {}\nError:{}", data, e)
    })?;

    if let Some(err) = chunk.error {
        bail!("Provider returned an error mid-stream: {}", err);
    }

    // The final usage chunk has no choices
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(SseEvent::Skip);
    };

    match choice.delta {
        Delta::Content { content } if !content.is_empty() => Ok(SseEvent::Delta(content)),
        Delta::Reasoning { reasoning } => {
            tracing::trace!("Skipping reasoning delta: {}", reasoning);
            Ok(SseEvent::Skip)
        }
        _ => Ok(SseEvent::Skip),
    }
}

/// Turns the provider's server-sent events into text deltas. Events
/// are buffered as bytes since network chunks can split an event (and
/// a multi-byte character) anywhere.
fn sse_deltas(response: reqwest::Response) -> impl Stream<Item = Result<String, Error>> {
    async_stream::try_stream! {
        let mut bytes = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;

        'outer: while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);

            while let Some((end, separator_len)) = next_event_boundary(&buffer) {
                let event: Vec<u8> = buffer.drain(..end + separator_len).collect();
                let event = std::str::from_utf8(&event[..end])?;
                match parse_event(event)? {
                    SseEvent::Delta(text) => {
                        yield text;
                    }
                    SseEvent::Skip => {}
                    SseEvent::Done => {
                        done = true;
                        break 'outer;
                    }
                }
            }
        }

        // Some servers close the connection without a trailing blank line
        if !done && !buffer.is_empty() {
            let event = std::str::from_utf8(&buffer)?;
            if let SseEvent::Delta(text) = parse_event(event)? {
                yield text;
            }
        }
    }
}
