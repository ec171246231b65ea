//! Wire envelope exchanged through the relay.
//!
//! Every frame on the wire is a single-line JSON object with at least a
//! string `type`. The relay forwards frames verbatim; only clients decode
//! them. [`EventEnvelope`] fixes the fields the funnel relies on and keeps
//! everything else in an open map so unknown payload fields survive a
//! decode/encode pass.
//!
//! # Canonical schema
//!
//! | field       | meaning                                         |
//! |-------------|-------------------------------------------------|
//! | `type`      | `hello` (server greeting) or `event`            |
//! | `eventType` | application event name (`presence`, `selection`, ...) |
//! | `ts`        | ISO-8601 UTC timestamp                          |
//! | `page`      | current wizard step number                      |
//! | `siteUrl`   | audience site the wizard runs on                |
//! | `deviceId`  | long-lived installation identifier              |
//! | `sessionId` | per-session identifier                          |
//! | `pageUrl`   | full URL of the page that emitted the event     |
//! | `msg`       | greeting text, only on `hello`                  |
//!
//! Application events always carry both `deviceId` and `sessionId`.
//! Selection events use `{"eventType":"selection","field":..,"value":..}`
//! with the field names from [`SelectionField`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::SdkError;

/// Envelope type of the server greeting.
pub const TYPE_HELLO: &str = "hello";

/// Envelope type of application events.
pub const TYPE_EVENT: &str = "event";

/// Greeting text sent by the relay on every accepted upgrade.
pub const GREETING_MSG: &str = "Connected to relay";

/// Event names used by the funnel.
pub mod event_types {
    /// Periodic liveness signal.
    pub const PRESENCE: &str = "presence";
    /// Sent once when a client connection opens.
    pub const CLIENT_HELLO: &str = "client_hello";
    /// Best-effort notice that the client is going away.
    pub const DISCONNECT: &str = "disconnect";
    /// A wizard step became visible.
    pub const STEP_VIEW: &str = "step_view";
    /// A value was chosen on a step.
    pub const SELECTION: &str = "selection";
    /// Consent checkbox toggled.
    pub const CONSENT: &str = "consent";
    /// Registration submitted.
    pub const REGISTER: &str = "register";
    /// Photo upload failed; the flow continued without it.
    pub const PHOTO_UPLOAD_ERROR: &str = "photo_upload_error";
    /// The wizard was restarted.
    pub const RESTART: &str = "restart";
}

/// Presence status carried by heartbeat envelopes.
pub const PRESENCE_ONLINE: &str = "online";

/// Field names used by `selection` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionField {
    /// Preferred location.
    Location,
    /// Budget band.
    Budget,
    /// Number of bedrooms.
    Bedrooms,
    /// Property type. Serialized as `"type"`.
    PropertyType,
}

impl SelectionField {
    /// Returns the wire name of the field.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Budget => "budget",
            Self::Bedrooms => "bedrooms",
            Self::PropertyType => "type",
        }
    }
}

impl std::fmt::Display for SelectionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-assigned identity stamped on every application event.
///
/// Opaque to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Long-lived per-installation identifier.
    pub device_id: String,
    /// Per-session identifier.
    pub session_id: String,
}

impl Identity {
    /// Creates an identity from existing identifiers.
    #[must_use]
    pub fn new(device_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Creates a fresh identity with random identifiers.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            device_id: Uuid::new_v4().to_string(),
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Keeps the device identifier and starts a new session.
    #[must_use]
    pub fn new_session(&self) -> Self {
        Self {
            device_id: self.device_id.clone(),
            session_id: Uuid::new_v4().to_string(),
        }
    }
}

/// A single message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Protocol-level tag (`hello`, `event`, ...).
    #[serde(rename = "type")]
    pub kind: String,

    /// Application event name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// Time the envelope was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,

    /// Current wizard step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Audience site URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,

    /// Installation identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// URL of the emitting page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,

    /// Greeting text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,

    /// Event-specific payload fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EventEnvelope {
    /// Creates an empty envelope of the given type.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            event_type: None,
            ts: None,
            page: None,
            site_url: None,
            device_id: None,
            session_id: None,
            page_url: None,
            msg: None,
            fields: Map::new(),
        }
    }

    /// Creates the server greeting.
    #[must_use]
    pub fn hello(msg: impl Into<String>) -> Self {
        let mut envelope = Self::new(TYPE_HELLO);
        envelope.ts = Some(Utc::now());
        envelope.msg = Some(msg.into());
        envelope
    }

    /// Creates an application event stamped with the identity and the
    /// current time.
    #[must_use]
    pub fn event(event_type: impl Into<String>, identity: &Identity) -> Self {
        let mut envelope = Self::new(TYPE_EVENT);
        envelope.event_type = Some(event_type.into());
        envelope.ts = Some(Utc::now());
        envelope.device_id = Some(identity.device_id.clone());
        envelope.session_id = Some(identity.session_id.clone());
        envelope
    }

    /// Creates a presence heartbeat.
    #[must_use]
    pub fn presence(identity: &Identity) -> Self {
        Self::event(event_types::PRESENCE, identity).with_field("status", PRESENCE_ONLINE)
    }

    /// Creates the envelope sent once a connection opens.
    #[must_use]
    pub fn client_hello(identity: &Identity) -> Self {
        Self::event(event_types::CLIENT_HELLO, identity)
    }

    /// Creates the best-effort goodbye envelope.
    #[must_use]
    pub fn disconnect(identity: &Identity) -> Self {
        Self::event(event_types::DISCONNECT, identity)
    }

    /// Creates a step view event.
    #[must_use]
    pub fn step_view(identity: &Identity, step: u32) -> Self {
        Self::event(event_types::STEP_VIEW, identity)
            .with_page(step)
            .with_field("step", step)
    }

    /// Creates a selection event.
    #[must_use]
    pub fn selection(identity: &Identity, field: SelectionField, value: impl Into<Value>) -> Self {
        Self::event(event_types::SELECTION, identity)
            .with_field("field", field.as_str())
            .with_field("value", value)
    }

    /// Sets the wizard step.
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Sets the audience site URL.
    #[must_use]
    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = Some(site_url.into());
        self
    }

    /// Sets the emitting page URL.
    #[must_use]
    pub fn with_page_url(mut self, page_url: impl Into<String>) -> Self {
        self.page_url = Some(page_url.into());
        self
    }

    /// Adds an event-specific payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns a payload field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns true for the server greeting.
    #[must_use]
    pub fn is_greeting(&self) -> bool {
        self.kind == TYPE_HELLO
    }

    /// Returns true for application events.
    #[must_use]
    pub fn is_event(&self) -> bool {
        self.kind == TYPE_EVENT
    }

    /// Returns true if this is an application event with the given name.
    #[must_use]
    pub fn is_event_type(&self, event_type: &str) -> bool {
        self.is_event() && self.event_type.as_deref() == Some(event_type)
    }

    /// Returns true if the envelope was emitted by the given identity's
    /// device. Used by observers to tell their own echo apart.
    #[must_use]
    pub fn is_from(&self, identity: &Identity) -> bool {
        self.device_id.as_deref() == Some(identity.device_id.as_str())
    }

    /// Encodes the envelope as a single-line JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload field cannot be serialized.
    pub fn encode(&self) -> Result<String, SdkError> {
        serde_json::to_string(self).map_err(|e| SdkError::Serialization(e.to_string()))
    }

    /// Decodes a frame.
    ///
    /// Any JSON object with a string `type` is accepted; unknown fields
    /// land in [`EventEnvelope::fields`].
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON, not an object, lacks a
    /// string `type`, or a fixed field has the wrong shape.
    pub fn decode(raw: &str) -> Result<Self, SdkError> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(SdkError::InvalidEnvelope("expected a JSON object".to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }
}
