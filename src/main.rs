use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use medlit_digest::models::ApiEnvelope;
use medlit_digest::{create_router, pipeline, scheduler, AppState, Config};

#[derive(Parser)]
#[command(
    name = "medlit-digest",
    about = "Weekly medical literature digest for bloodless medicine",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (and the scheduler when SCHEDULE_ENABLED=true).
    Serve,
    /// Run one search, print the result as JSON.
    Search {
        /// Also email the digest.
        #[arg(long)]
        email: bool,
    },
    /// Print the last-search status as JSON.
    Status,
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "medlit_digest=debug,tower_http=info".into());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "medlit-digest.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(config.server.log_dir.as_deref());
    info!("Configuration loaded: {:?}", config.server);

    // Create shared state
    let state = AppState::from_config(config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::Search { email: false } => {
            let summary = pipeline::run_search(&state).await?;
            print_json(&ApiEnvelope::ok(summary))
        }
        Command::Search { email: true } => {
            let summary = pipeline::run_digest(&state).await?;
            print_json(&ApiEnvelope::ok(summary))
        }
        Command::Status => print_json(&pipeline::status(&state).await),
    }
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    let server = &state.config.server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", server.host, server.port))?;

    if state.config.schedule.enabled {
        scheduler::spawn(state.clone());
    }

    // Create router
    let app = create_router(state.clone());

    // Start server
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
