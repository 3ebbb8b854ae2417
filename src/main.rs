//! Main entry point for the caption relay server

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use caption_relay::core::config::RelayConfig;
use caption_relay::server::run_server;

/// Caption Relay - real-time translation relay server
#[derive(Parser, Debug)]
#[command(name = "caption-relay", version, about, long_about = None)]
struct Args {
    /// Host to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind
    #[arg(long, default_value_t = 8765)]
    port: u16,

    /// Bypass real providers with deterministic stub output
    #[arg(long)]
    mock: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("caption_relay={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = RelayConfig::from_env()?;
    if args.mock {
        config.mock_mode = true;
    }

    run_server(args.host, args.port, config).await
}
