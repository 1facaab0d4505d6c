mod ballot;
mod cli;
mod commands;
mod error;
mod llm;
mod pipeline;
mod search;
mod state;

use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with the menu.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load env
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let state = match AppState::from_cli(&cli) {
        Ok(state) => state,
        Err(e) => {
            error!("Configuration error: {}", e);
            return Err(e.into());
        }
    };
    info!(races = state.ballot.races.len(), "Ready");

    // Ctrl-C is forwarded to the session instead of killing the process.
    let (tx, mut interrupts) = mpsc::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });

    let mut stdout = std::io::stdout();
    if cli.races.is_empty() {
        let stdin = BufReader::new(tokio::io::stdin());
        commands::run_interactive(&state, stdin, &mut stdout, &mut interrupts).await
    } else {
        commands::run_named(&state, &cli.races, &mut stdout, &mut interrupts).await
    }
}
