//! Reconnecting WebSocket client for the funnel relay.
//!
//! The client keeps one connection to the relay alive forever: it retries
//! with multiplicative backoff, sends a presence heartbeat while
//! connected, and hands every envelope the relay broadcasts to the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use funnel_sdk::ws::{ClientConfig, ClientState, ReconnectingClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ReconnectingClient::new(ClientConfig::new("wss://relay.example/ws"))?;
//!     client.connect().await?;
//!     client.wait_for(ClientState::Open).await?;
//!
//!     client.send(&client.event("step_view").with_page(1)).await?;
//!
//!     loop {
//!         let envelope = client.next_envelope().await?;
//!         println!("{:?}", envelope);
//!     }
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;

pub use backoff::Backoff;
pub use client::{ClientState, ClientStatus, ReconnectingClient};
pub use config::ClientConfig;
pub use error::WsError;
