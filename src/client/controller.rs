//! Drives a `ChatSession` against a `Relay`: one request at a time,
//! live rendering of the reply and commit on completion.
use std::io::Write;

use anyhow::Result;
use futures::stream::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::relay::Relay;
use super::session::ChatSession;
use crate::api::public::ai_stream::{CompletionRequest, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::openai::Message;

const FAILURE_MESSAGE: &str = "Something went wrong while fetching the AI response.";

/// Where the conversation gets rendered.
pub trait ChatView {
    /// A new chunk of the reply arrived. `partial` is the whole reply
    /// so far.
    fn partial(&mut self, chunk: &str, partial: &str);

    fn committed(&mut self, transcript: &[Message]);

    fn failed(&mut self, message: &str);

    /// A submission arrived while a request was in flight.
    fn ignored(&mut self, _prompt: &str) {}
}

/// Prints the reply as it streams in.
#[derive(Default)]
pub struct TerminalView {
    settled: Option<mpsc::UnboundedSender<()>>,
}

impl TerminalView {
    /// Signals `settled` each time a turn is committed or fails so the
    /// line reader knows the terminal is free again.
    pub fn with_settle_signal(settled: mpsc::UnboundedSender<()>) -> Self {
        Self {
            settled: Some(settled),
        }
    }

    fn settle(&self) {
        if let Some(settled) = &self.settled {
            let _ = settled.send(());
        }
    }
}

impl ChatView for TerminalView {
    fn partial(&mut self, chunk: &str, _partial: &str) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{}", chunk);
        let _ = stdout.flush();
    }

    fn committed(&mut self, _transcript: &[Message]) {
        println!();
        self.settle();
    }

    fn failed(&mut self, message: &str) {
        eprintln!("\nError: {}", message);
        self.settle();
    }

    fn ignored(&mut self, _prompt: &str) {
        eprintln!("Still waiting on the previous response, try again when it's done.");
    }
}

pub struct ChatController<R: Relay, V: ChatView> {
    session: ChatSession,
    relay: R,
    view: V,
    max_tokens: u32,
    temperature: f32,
}

impl<R: Relay, V: ChatView> ChatController<R, V> {
    pub fn new(session: ChatSession, relay: R, view: V) -> Self {
        Self {
            session,
            relay,
            view,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_params(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// Runs until `submissions` ends. The initial prompt, if any, is
    /// sent before anything else.
    pub async fn run<S>(&mut self, mut submissions: S)
    where
        S: Stream<Item = String> + Unpin,
    {
        if let Some(prompt) = self.session.take_initial_prompt()
            && let Some(request) = self.session.begin(&prompt)
        {
            self.exchange(request, &mut submissions).await;
        }

        while let Some(text) = submissions.next().await {
            self.session.set_draft(&text);
            let Some(request) = self.session.submit_draft() else {
                tracing::debug!("Ignoring blank submission");
                continue;
            };
            self.exchange(request, &mut submissions).await;
        }
    }

    async fn exchange<S>(&mut self, mut request: CompletionRequest, submissions: &mut S)
    where
        S: Stream<Item = String> + Unpin,
    {
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;

        match self.stream_reply(&request, submissions).await {
            Ok(()) => {
                self.session.finish();
                self.view.committed(self.session.transcript());
            }
            Err(e) => {
                tracing::error!("Error fetching AI response: {:#}", e);
                self.session.fail();
                self.view.failed(FAILURE_MESSAGE);
            }
        }
    }

    /// Reads the reply into the session. Submissions that arrive in
    /// the meantime are dropped.
    async fn stream_reply<S>(
        &mut self,
        request: &CompletionRequest,
        submissions: &mut S,
    ) -> Result<()>
    where
        S: Stream<Item = String> + Unpin,
    {
        let Self {
            session,
            relay,
            view,
            ..
        } = self;

        let open = relay.open(request);
        tokio::pin!(open);
        let mut chunks = loop {
            tokio::select! {
                chunks = &mut open => break chunks?,
                Some(prompt) = submissions.next() => {
                    tracing::debug!("Request in flight, ignoring submission {:?}", prompt);
                    view.ignored(&prompt);
                }
            }
        };

        loop {
            tokio::select! {
                chunk = chunks.next() => match chunk {
                    Some(chunk) => {
                        let chunk = chunk?;
                        session.receive_chunk(&chunk);
                        view.partial(&chunk, session.partial());
                    }
                    None => return Ok(()),
                },
                Some(prompt) = submissions.next() => {
                    tracing::debug!("Request in flight, ignoring submission {:?}", prompt);
                    view.ignored(&prompt);
                }
            }
        }
    }
}
