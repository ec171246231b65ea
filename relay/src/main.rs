//! Funnel relay binary.
//!
//! Entry point for the broadcast WebSocket relay.

use funnel_relay::{Server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,funnel_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env()?;

    tracing::info!(
        "Starting funnel relay on {}:{}",
        config.host,
        config.port
    );

    let server = Server::new(config);
    server.run().await?;

    Ok(())
}
