//! Upgrade gating.
//!
//! Decides whether an HTTP request may become a relay connection before
//! any handshake work happens:
//!
//! - upgrade requested on any path other than the relay path: `404`
//! - relay path without `Upgrade: websocket` (case-insensitive): `400`
//! - anything else without an `Upgrade` header passes through untouched
//!
//! Rejections carry `Connection: close` so the transport is torn down
//! after the response.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{CONNECTION, ORIGIN, UPGRADE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use crate::server::AppState;

/// Upgrade token accepted on the relay path.
pub const UPGRADE_TOKEN: &str = "websocket";

/// Header consulted first for the remote address.
const FORWARDED_FOR: &str = "x-forwarded-for";

/// What to do with a request that passed the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Proceed with the WebSocket handshake.
    Upgrade,
    /// Plain HTTP request; route normally.
    PassThrough,
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    /// Upgrade requested on a path other than the relay path.
    NotFound,
    /// Relay path without a valid `Upgrade` header.
    BadRequest,
}

impl GateRejection {
    /// Returns the response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = status.canonical_reason().unwrap_or("Rejected");
        (status, [(CONNECTION, "close")], body).into_response()
    }
}

/// Remote address of the peer, resolved by the gate for the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr(pub String);

/// Path and header check for upgrade requests.
#[derive(Debug, Clone)]
pub struct UpgradeGate {
    relay_path: Arc<str>,
}

impl UpgradeGate {
    /// Creates a gate for the given relay path.
    #[must_use]
    pub fn new(relay_path: &str) -> Self {
        Self {
            relay_path: Arc::from(relay_path),
        }
    }

    /// Returns the relay path.
    #[must_use]
    pub fn relay_path(&self) -> &str {
        &self.relay_path
    }

    /// Checks a request.
    ///
    /// # Errors
    ///
    /// Returns the rejection to send if the request may not proceed.
    pub fn check(&self, path: &str, headers: &HeaderMap) -> Result<GateDecision, GateRejection> {
        let upgrade = header_str(headers, UPGRADE.as_str());

        if path != self.relay_path() {
            return match upgrade {
                Some(_) => Err(GateRejection::NotFound),
                None => Ok(GateDecision::PassThrough),
            };
        }

        match upgrade {
            Some(token) if token.eq_ignore_ascii_case(UPGRADE_TOKEN) => Ok(GateDecision::Upgrade),
            _ => Err(GateRejection::BadRequest),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .map(|value| value.to_str().unwrap_or_default())
}

/// Resolves the peer address, preferring `X-Forwarded-For`.
fn remote_addr(request: &Request) -> String {
    if let Some(forwarded) = header_str(request.headers(), FORWARDED_FOR) {
        if !forwarded.is_empty() {
            return forwarded.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware applying [`UpgradeGate`] to every request.
pub async fn upgrade_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    let headers = request.headers();

    if headers.contains_key(UPGRADE) || path == state.gate.relay_path() {
        info!(
            path = %path,
            upgrade = header_str(headers, UPGRADE.as_str()).unwrap_or("-"),
            connection = header_str(headers, CONNECTION.as_str()).unwrap_or("-"),
            origin = header_str(headers, ORIGIN.as_str()).unwrap_or("-"),
            "upgrade attempt"
        );
    }

    match state.gate.check(&path, headers) {
        Ok(GateDecision::Upgrade) => {
            let remote = RemoteAddr(remote_addr(&request));
            request.extensions_mut().insert(remote);
            next.run(request).await
        }
        Ok(GateDecision::PassThrough) => next.run(request).await,
        Err(rejection) => {
            state.metrics.record_upgrade_rejected();
            warn!(path = %path, status = %rejection.status(), "upgrade rejected");
            rejection.into_response()
        }
    }
}
