//! Request ids, tracing spans and header redaction.

use axum::Router;
use axum::http::header::{self, HeaderName};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

/// Header carrying the request id.
const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Webhook signature headers, redacted from logs like credentials.
const SIGNATURE_HEADERS: [HeaderName; 3] = [
    HeaderName::from_static("x-hub-signature-256"),
    HeaderName::from_static("payload-signature"),
    HeaderName::from_static("x-signature"),
];

/// Extension trait for `axum::`[`Router`] to apply observability middleware.
pub trait RouterObservabilityExt<S> {
    /// Generates request ids, opens a tracing span per request, propagates
    /// the id to responses and marks credential headers as sensitive.
    fn with_observability(self) -> Self;
}

impl<S> RouterObservabilityExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_observability(self) -> Self {
        let sensitive = [header::AUTHORIZATION, header::COOKIE]
            .into_iter()
            .chain(SIGNATURE_HEADERS);

        self.layer(PropagateRequestIdLayer::new(REQUEST_ID))
            .layer(SetSensitiveRequestHeadersLayer::new(sensitive))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(REQUEST_ID, MakeRequestUuid))
    }
}
