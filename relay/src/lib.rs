//! Funnel relay - broadcast WebSocket server for live funnel events.
//!
//! Every text frame a connected party sends is rebroadcast, unmodified,
//! to every open connection. The relay never parses or stores payloads.
//!
//! # Routes
//!
//! - `GET /` — plain-text landing page
//! - `GET /health` — liveness probe
//! - `GET /stats` — connection count and relay counters
//! - `GET /ws` — WebSocket upgrade (configurable)

pub mod config;
pub mod error;
pub mod server;
pub mod ws;

pub use config::ServerConfig;
pub use error::RelayError;
pub use server::{router, AppState, Server, StatsResponse};
