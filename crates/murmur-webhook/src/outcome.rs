//! Uniform outcome contract for outbound hooks.

use murmur_core::{Error, ErrorKind};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Result of running one integration hook for one event.
///
/// Providers never surface their failures as `Err`; every path, including
/// events the provider ignores, ends in a `HookResult`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResult {
    /// Whether the provider accepted the event.
    pub success: bool,
    /// Human-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the failure is transient and worth retrying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_retry: Option<bool>,
    /// Identifier of the object created on the provider side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Link to the object created on the provider side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
}

impl HookResult {
    /// A successful delivery.
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Acknowledges an event the provider does not act on.
    pub fn skipped() -> Self {
        Self::ok()
    }

    /// A successful delivery that created an external object.
    pub fn created(external_id: impl Into<String>, external_url: Option<String>) -> Self {
        Self {
            success: true,
            external_id: Some(external_id.into()),
            external_url,
            ..Self::default()
        }
    }

    /// A failed delivery.
    pub fn failure(error: impl Into<String>, should_retry: bool) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            should_retry: Some(should_retry),
            ..Self::default()
        }
    }

    /// A failed delivery classified by the provider's HTTP status.
    pub fn from_status(status: StatusCode, detail: impl AsRef<str>) -> Self {
        let detail = detail.as_ref();
        let message = if detail.is_empty() {
            format!("provider responded with {status}")
        } else {
            format!("provider responded with {status}: {detail}")
        };

        Self::failure(message, is_retryable_status(status))
    }

    /// A failed delivery classified by [`is_retryable_error`].
    pub fn from_error(error: &Error) -> Self {
        Self::failure(error.to_string(), is_retryable_error(error))
    }

    /// Returns true when the failure should be handed to the retry queue.
    pub fn is_retryable(&self) -> bool {
        !self.success && self.should_retry.unwrap_or(false)
    }
}

/// Classifies a provider HTTP status.
///
/// 401/403 mean the credentials need reconnecting, 429 and 5xx are
/// transient, and any other 4xx is a permanent rejection.
pub fn is_retryable_status(status: StatusCode) -> bool {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => false,
        StatusCode::TOO_MANY_REQUESTS => true,
        status => status.is_server_error(),
    }
}

/// Maps a non-success provider status onto an error kind whose retryability
/// agrees with [`is_retryable_status`].
pub fn error_kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::UNAUTHORIZED => ErrorKind::Authentication,
        StatusCode::FORBIDDEN => ErrorKind::Authorization,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimited,
        status if status.is_server_error() => ErrorKind::ServiceUnavailable,
        _ => ErrorKind::ExternalError,
    }
}

/// Shared classifier for failures raised before a provider status is known.
///
/// Timeouts and connection failures are retryable; malformed input and
/// serialization problems are not.
pub fn is_retryable_error(error: &Error) -> bool {
    error.is_retryable()
}
