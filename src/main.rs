mod anthropic;
mod cli;
mod config;
mod gemini;
mod markdown;
mod model;
mod openai;
mod output;
mod report;
mod search;
mod transport;

pub const USER_AGENT: &str = concat!("polysearch/", env!("CARGO_PKG_VERSION"));

use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("polysearch=info".parse()?),
        )
        .init();

    let cli = cli::Cli::parse();
    cli::run(cli)
        .await
        .inspect_err(|e| tracing::error!("search failed: {e}"))?;

    info!("done");
    Ok(())
}
