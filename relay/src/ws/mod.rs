//! WebSocket module for the broadcast relay.
//!
//! Accepts WebSocket upgrades on the relay path and rebroadcasts every
//! inbound frame, unmodified, to every open connection including the
//! sender.
//!
//! # Components
//!
//! - [`gate`] — path and `Upgrade` header check ahead of the handshake
//! - [`connection`] — one accepted socket and its lifecycle state
//! - [`registry`] — the set of open connections and the fan-out
//! - [`handler`] — handshake completion and the per-connection loop
//! - [`metrics`] — relay counters

pub mod connection;
pub mod gate;
pub mod handler;
pub mod metrics;
pub mod registry;

pub use connection::{Connection, ConnectionState, SendError};
pub use gate::{upgrade_gate, GateDecision, GateRejection, UpgradeGate};
pub use handler::ws_handler;
pub use metrics::{RelayMetrics, RelayMetricsSnapshot};
pub use registry::{BroadcastReport, ConnectionRegistry};
