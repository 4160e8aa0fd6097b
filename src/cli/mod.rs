use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::public::ai_stream::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};

pub mod chat;
pub mod serve;

#[derive(Subcommand)]
enum Command {
    /// Run the relay server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
    /// Start a chat session against a running relay
    Chat {
        /// Base URL of the relay
        #[arg(long, default_value = "http://127.0.0.1:2222")]
        url: String,

        /// Prompt to submit as soon as the session starts
        #[arg(long)]
        prompt: Option<String>,

        /// Quiet period before a submission is sent
        #[arg(long, default_value = "1000")]
        debounce_ms: u64,

        #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
        max_tokens: u32,

        #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
        temperature: f32,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

/// Logs to stdout. `RUST_LOG` takes precedence over `default_directives`.
pub fn init_tracing(default_directives: String) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directives.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    // Handle each sub command
    match args.command {
        Some(Command::Serve { host, port }) => {
            serve::run(host, port).await?;
        }
        Some(Command::Chat {
            url,
            prompt,
            debounce_ms,
            max_tokens,
            temperature,
        }) => {
            chat::run(chat::ChatArgs {
                url,
                prompt,
                debounce: Duration::from_millis(debounce_ms),
                max_tokens,
                temperature,
            })
            .await?;
        }
        None => {}
    }

    Ok(())
}
