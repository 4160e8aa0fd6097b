//! Client side of `POST /api/ai-stream`.
use anyhow::{Error, Result, bail};
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream};
use futures_util::StreamExt;

use crate::api::public::ErrorResponse;
use crate::api::public::ai_stream::CompletionRequest;

/// Decoded text of the reply in the order the relay sent it.
pub type TextStream = BoxStream<'static, Result<String, Error>>;

#[async_trait]
pub trait Relay: Send + Sync {
    async fn open(&self, request: &CompletionRequest) -> Result<TextStream, Error>;
}

pub struct RelayClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RelayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/ai-stream", base_url.trim_end_matches("/")),
        }
    }
}

#[async_trait]
impl Relay for RelayClient {
    async fn open(&self, request: &CompletionRequest) -> Result<TextStream, Error> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| String::from("no details"));
            bail!("Relay responded with {}: {}", status, message);
        }

        Ok(decode_stream(response).boxed())
    }
}

/// Incremental UTF-8 decoding. Network chunks can end in the middle
/// of a multi-byte character so incomplete trailing bytes are held
/// until the next chunk arrives.
#[derive(Default, Debug)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> Result<String> {
        self.pending.extend_from_slice(bytes);
        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // Incomplete sequence at the end, wait for more bytes
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => bail!("Relay sent invalid UTF-8: {}", e),
        };
        let text = std::str::from_utf8(&self.pending[..valid_up_to])?.to_string();
        self.pending.drain(..valid_up_to);
        Ok(text)
    }

    /// Errors if the stream ended in the middle of a character.
    pub fn finish(self) -> Result<()> {
        if !self.pending.is_empty() {
            bail!(
                "Relay stream ended with {} undecoded bytes",
                self.pending.len()
            );
        }
        Ok(())
    }
}

fn decode_stream(response: reqwest::Response) -> impl Stream<Item = Result<String, Error>> {
    async_stream::try_stream! {
        let mut bytes = response.bytes_stream();
        let mut decoder = Utf8Decoder::default();

        while let Some(chunk) = bytes.next().await {
            let text = decoder.decode(&chunk?)?;
            if !text.is_empty() {
                yield text;
            }
        }

        decoder.finish()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::{Message, Role};

    #[test]
    fn it_reassembles_split_characters() {
        let bytes = "añ🎉".as_bytes();
        let mut decoder = Utf8Decoder::default();

        assert_eq!(decoder.decode(&bytes[..2]).unwrap(), "a");
        assert_eq!(decoder.decode(&bytes[2..4]).unwrap(), "ñ");
        assert_eq!(decoder.decode(&bytes[4..5]).unwrap(), "");
        assert_eq!(decoder.decode(&bytes[5..]).unwrap(), "🎉");
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn it_rejects_truncated_and_invalid_input() {
        let mut decoder = Utf8Decoder::default();
        decoder.decode(&"🎉".as_bytes()[..2]).unwrap();
        assert!(decoder.finish().is_err());

        let mut decoder = Utf8Decoder::default();
        assert!(decoder.decode(&[b'a', 0xff, b'b']).is_err());
    }

    #[tokio::test]
    async fn it_streams_the_reply() {
        let mut server = mockito::Server::new_async().await;
        let request = CompletionRequest::new("2+2?", vec![Message::new(Role::User, "hi")]);

        let mock = server
            .mock("POST", "/api/ai-stream")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "prompt": "2+2?",
                "chatHistory": [{"role": "user", "content": "hi"}],
                "maxTokens": 4000
            })))
            .with_status(200)
            .with_header("content-type", "text/plain")
            .with_body("4")
            .create_async()
            .await;

        let relay = RelayClient::new(&format!("{}/", server.url()));
        let chunks: Vec<String> = relay
            .open(&request)
            .await
            .unwrap()
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();

        mock.assert_async().await;
        assert_eq!(chunks.concat(), "4");
    }

    #[tokio::test]
    async fn it_surfaces_validation_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/ai-stream")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"Invalid prompt. Prompt must be a non-empty string."}"#)
            .create_async()
            .await;

        let relay = RelayClient::new(&server.url());
        let err = relay
            .open(&CompletionRequest::new(" ", vec![]))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("Invalid prompt"));
        assert!(err.to_string().contains("400"));
    }
}
