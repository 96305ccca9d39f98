//! Raw inbound delivery envelopes.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};

use crate::signature::SignatureError;

/// An inbound provider delivery as received, before any JSON parsing.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Request headers.
    pub headers: HeaderMap,
    /// Raw request body, exactly as signed by the provider.
    pub body: Bytes,
}

impl InboundRequest {
    /// Creates a new inbound request.
    pub fn new(headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.body)
    }
}

/// A response an integration may return verbatim to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// JSON body.
    pub body: Value,
}

impl InboundResponse {
    /// Creates a response with the given status and body.
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// 200 acknowledgement.
    pub fn acknowledged() -> Self {
        Self::new(StatusCode::OK, json!({ "received": true }))
    }

    /// 200 acknowledgement for deliveries that were deliberately ignored.
    pub fn ignored(reason: &str) -> Self {
        Self::new(
            StatusCode::OK,
            json!({ "received": true, "ignored": reason }),
        )
    }

    /// 401 for failed signature verification.
    pub fn unauthorized(message: &str) -> Self {
        Self::error(StatusCode::UNAUTHORIZED, message)
    }

    /// 400 for malformed payloads.
    pub fn bad_request(message: &str) -> Self {
        Self::error(StatusCode::BAD_REQUEST, message)
    }

    /// 404 for unknown or unconfigured integrations.
    pub fn not_found(message: &str) -> Self {
        Self::error(StatusCode::NOT_FOUND, message)
    }

    /// 503 for transient failures before acknowledgement, so the provider
    /// redelivers.
    pub fn service_unavailable(message: &str) -> Self {
        Self::error(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    fn error(status: StatusCode, message: &str) -> Self {
        Self::new(status, json!({ "error": message }))
    }

    /// Returns whether this response acknowledges the delivery.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl From<SignatureError> for InboundResponse {
    fn from(error: SignatureError) -> Self {
        Self::unauthorized(&error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_error_maps_to_unauthorized() {
        let response = InboundResponse::from(SignatureError::MissingHeader);
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body["error"], "missing signature header");
    }

    #[test]
    fn test_request_json() {
        let request = InboundRequest::new(HeaderMap::new(), r#"{"type":"identify"}"#);
        assert_eq!(request.json().unwrap()["type"], "identify");

        let request = InboundRequest::new(HeaderMap::new(), "{not json");
        assert!(request.json().is_err());
    }
}
