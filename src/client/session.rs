//! The state of a single chat. All transitions go through
//! `ChatSession` so the in-flight flag, the live reply and the
//! transcript can never disagree with each other.
use crate::api::public::ai_stream::CompletionRequest;
use crate::openai::{Message, Role};

#[derive(Clone, Debug, PartialEq)]
pub enum Phase {
    Idle,
    /// Request sent, nothing received yet
    Submitting { prompt: String },
    /// Receiving the reply, `partial` is everything received so far
    Streaming { prompt: String, partial: String },
    /// The stream ended and the reply is being added to the transcript
    Committing,
}

#[derive(Debug)]
pub struct ChatSession {
    transcript: Vec<Message>,
    draft: String,
    phase: Phase,
    // Deep link prompt that gets submitted once when the session starts
    initial_prompt: Option<String>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            transcript: Vec::new(),
            draft: String::new(),
            phase: Phase::Idle,
            initial_prompt: None,
        }
    }

    pub fn with_initial_prompt(prompt: Option<String>) -> Self {
        Self {
            initial_prompt: prompt.filter(|p| !p.trim().is_empty()),
            ..Self::new()
        }
    }

    pub fn initial_prompt(&self) -> Option<&str> {
        self.initial_prompt.as_deref()
    }

    /// Whether a turn will start without waiting for input.
    pub fn has_initial_prompt(&self) -> bool {
        self.initial_prompt.is_some()
    }

    /// Returns the initial prompt the first time it's called and
    /// `None` after that.
    pub fn take_initial_prompt(&mut self) -> Option<String> {
        self.initial_prompt.take()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: &str) {
        self.draft = text.to_string();
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_in_flight(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// The reply received so far for the active request.
    pub fn partial(&self) -> &str {
        match &self.phase {
            Phase::Streaming { partial, .. } => partial,
            _ => "",
        }
    }

    /// Moves from `Idle` to `Submitting` and builds the request to
    /// send. Returns `None` when a request is already in flight or the
    /// prompt is blank.
    pub fn begin(&mut self, prompt: &str) -> Option<CompletionRequest> {
        if self.is_in_flight() || prompt.trim().is_empty() {
            return None;
        }
        self.phase = Phase::Submitting {
            prompt: prompt.to_string(),
        };
        Some(CompletionRequest::new(prompt, self.transcript.clone()))
    }

    pub fn submit_draft(&mut self) -> Option<CompletionRequest> {
        let draft = self.draft.clone();
        self.begin(&draft)
    }

    /// Appends a chunk of the reply. Ignored unless a request is in
    /// flight.
    pub fn receive_chunk(&mut self, text: &str) -> bool {
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        self.phase = match phase {
            Phase::Submitting { prompt } => Phase::Streaming {
                prompt,
                partial: text.to_string(),
            },
            Phase::Streaming { prompt, mut partial } => {
                partial.push_str(text);
                Phase::Streaming { prompt, partial }
            }
            other => {
                self.phase = other;
                return false;
            }
        };
        true
    }

    /// Commits the prompt and the full reply to the transcript and
    /// returns to `Idle`.
    pub fn finish(&mut self) -> bool {
        let (prompt, reply) = match std::mem::replace(&mut self.phase, Phase::Committing) {
            Phase::Submitting { prompt } => (prompt, String::new()),
            Phase::Streaming { prompt, partial } => (prompt, partial),
            other => {
                self.phase = other;
                return false;
            }
        };

        self.transcript.push(Message::new(Role::User, &prompt));
        self.transcript.push(Message::new(Role::Assistant, &reply));
        self.draft.clear();
        self.phase = Phase::Idle;
        true
    }

    /// Drops the active request without touching the transcript.
    pub fn fail(&mut self) {
        self.phase = Phase::Idle;
    }
}
