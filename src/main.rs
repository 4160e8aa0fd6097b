use anyhow::Result;
use promptrelay::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
