//! Quill API server binary.
//!
//! Usage:
//!   quill-api --config config.toml
//!   quill-api --port 8080 --bind 0.0.0.0
//!
//! # Environment Variables
//!
//! - `QUILL_BIND_ADDR` - Server bind address (default: 127.0.0.1)
//! - `OPENAI_API_KEY` - Key for the model and embeddings APIs
//! - `BING_SEARCH_API_KEY` - Key for web search

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use quill_api::{AppState, serve};
use quill_coordinator::QuillConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "quill-api", version, about = "Multi-agent creative writer API server")]
struct Args {
    /// Path to config.toml file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Bind address
    #[arg(short, long, env = "QUILL_BIND_ADDR", default_value = "127.0.0.1")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,quill_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.bind == "0.0.0.0" {
        tracing::warn!(
            "Server binding to 0.0.0.0, which exposes the API to all network interfaces. \
             Ensure a firewall or reverse proxy is in place."
        );
    }

    let config = match args.config {
        Some(ref path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            QuillConfig::from_file(path)?
        }
        None => {
            tracing::info!("Using default configuration");
            QuillConfig::default()
        }
    };

    let state = AppState::from_config(&config).await?;

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    serve(Arc::new(state), addr).await?;

    Ok(())
}
