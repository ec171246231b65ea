//! Funnel SDK - wire types and client for the funnel event relay.
//!
//! The relay rebroadcasts every frame it receives to every connected
//! party. This crate defines the envelope those frames carry and a client
//! that stays connected to the relay.
//!
//! # Modules
//!
//! - [`envelope`] — [`EventEnvelope`] codec and the canonical funnel events
//! - [`ws`] — [`ReconnectingClient`] with backoff and presence heartbeat
//!
//! # Example
//!
//! ```rust
//! use funnel_sdk::{EventEnvelope, Identity, SelectionField};
//!
//! let identity = Identity::new("device-1", "session-1");
//! let envelope = EventEnvelope::selection(&identity, SelectionField::Bedrooms, 3).with_page(4);
//! let json = envelope.encode().unwrap();
//! assert!(json.contains("\"eventType\":\"selection\""));
//! ```

pub mod envelope;
pub mod error;
pub mod ws;

pub use envelope::{event_types, EventEnvelope, Identity, SelectionField};
pub use error::SdkError;
pub use ws::{ClientConfig, ClientState, ReconnectingClient, WsError};
