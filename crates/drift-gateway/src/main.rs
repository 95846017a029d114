//! Drift Gateway - HTTP entry point for the Drift storage node

use clap::Parser;
use drift_gateway::{run_server_with_shutdown, GatewayConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "drift-gateway")]
#[command(about = "HTTP gateway for Drift decentralized storage")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "DRIFT_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "DRIFT_PORT")]
    port: u16,

    /// Maximum request body size in bytes
    #[arg(long, default_value = "1073741824", env = "DRIFT_MAX_BODY_SIZE")]
    max_body_size: usize,

    /// Accounting: debt magnitude at which settlement is requested
    #[arg(long, default_value = "1000", env = "DRIFT_PAYMENT_THRESHOLD")]
    payment_threshold: u64,

    /// Accounting: debt magnitude beyond which peers are refused
    #[arg(long, default_value = "10000", env = "DRIFT_DISCONNECT_THRESHOLD")]
    disconnect_threshold: u64,

    /// Enable debug logging
    #[arg(short, long, env = "DRIFT_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig {
        host: args.host,
        port: args.port,
        max_body_size: args.max_body_size,
        payment_threshold: args.payment_threshold,
        disconnect_threshold: args.disconnect_threshold,
    };

    run_server_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}
