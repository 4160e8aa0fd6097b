use std::pin::pin;
use std::time::Duration;

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use crate::client::{ChatController, ChatSession, RelayClient, TerminalView, debounce};

pub struct ChatArgs {
    pub url: String,
    pub prompt: Option<String>,
    pub debounce: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

pub async fn run(args: ChatArgs) -> Result<()> {
    // Keep the terminal readable, errors still get through
    super::init_tracing(format!("{}=warn", env!("CARGO_CRATE_NAME")));

    let (tx, rx) = mpsc::channel::<String>(32);
    let (settled_tx, mut settled_rx) = mpsc::unbounded_channel::<()>();
    let session = ChatSession::with_initial_prompt(args.prompt);
    let mut pending_turn = session.has_initial_prompt();

    // rustyline blocks so it gets its own thread and feeds lines to
    // the controller. It only prompts again once the last turn has
    // settled so the reply isn't printed over the input line.
    let reader = tokio::task::spawn_blocking(move || -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        loop {
            if pending_turn && settled_rx.blocking_recv().is_none() {
                break;
            }
            match rl.readline(">>> ") {
                Ok(line) => {
                    // Blank lines never start a turn
                    pending_turn = !line.trim().is_empty();
                    if !pending_turn {
                        continue;
                    }
                    let _ = rl.add_history_entry(line.as_str());
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => break,
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    println!("Error: {:?}", err);
                    break;
                }
            }
        }
        Ok(())
    });

    if let Some(prompt) = session.initial_prompt() {
        println!(">>> {}", prompt);
    }

    let relay = RelayClient::new(&args.url);
    let mut controller =
        ChatController::new(session, relay, TerminalView::with_settle_signal(settled_tx))
            .with_params(args.max_tokens, args.temperature);

    let submissions = pin!(debounce(rx, args.debounce));
    controller.run(submissions).await;

    reader.await??;

    Ok(())
}
