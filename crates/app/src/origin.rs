use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use bone_gateway_core::{OriginDecision, OriginPolicy};

pub const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

/// Transport the origin check was performed for; only used to label logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Http,
    Realtime,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Realtime => "realtime",
        }
    }
}

/// Shared admission hook wrapping the pure [`OriginPolicy`] with logging.
///
/// Both the HTTP surface and the realtime handshake hold a clone of the same
/// gate, so they can never disagree about an origin.
#[derive(Debug, Clone)]
pub struct OriginGate {
    policy: Arc<OriginPolicy>,
}

impl OriginGate {
    pub fn new(policy: Arc<OriginPolicy>) -> Self {
        Self { policy }
    }

    /// Evaluates `origin` and records the outcome. Every call is logged,
    /// production included; these records are the audit trail for origin mismatches.
    pub fn admit(&self, origin: Option<&str>, channel: Channel) -> OriginDecision {
        let decision = self.policy.decide(origin);
        let raw = origin.unwrap_or("<none>");
        match decision {
            OriginDecision::Allow(reason) => info!(
                stage = "origin",
                channel = channel.as_str(),
                origin = raw,
                decision = "allow",
                reason = reason.as_str(),
                "origin evaluated"
            ),
            OriginDecision::Deny(reason) => warn!(
                stage = "origin",
                channel = channel.as_str(),
                origin = raw,
                decision = "deny",
                reason = %reason,
                "origin rejected"
            ),
        }
        decision
    }

    /// CORS response headers for admitted origins. The predicate consults the
    /// same policy without logging, since [`enforce`] already recorded the decision.
    pub fn cors_layer(&self) -> CorsLayer {
        let policy = self.policy.clone();
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
                origin
                    .to_str()
                    .map(|origin| policy.decide(Some(origin)).is_allowed())
                    .unwrap_or(false)
            }))
            .allow_credentials(true)
            .allow_methods(ALLOWED_METHODS)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
    }
}

/// Reads the `Origin` header. A header that is not valid UTF-8 is treated as
/// a present but unmatchable origin.
pub fn header_origin(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::ORIGIN)
        .map(|value| value.to_str().unwrap_or("<invalid>"))
}

/// Middleware gate: denied origins never reach a route handler.
///
/// A denial answers an empty 403 with no CORS headers instead of letting the
/// request through with the headers stripped. Stripping alone would still run
/// the handler, and a browser reports both outcomes as the same CORS failure.
pub async fn enforce(State(gate): State<OriginGate>, request: Request, next: Next) -> Response {
    let decision = gate.admit(header_origin(request.headers()), Channel::Http);
    if decision.is_allowed() {
        next.run(request).await
    } else {
        StatusCode::FORBIDDEN.into_response()
    }
}
