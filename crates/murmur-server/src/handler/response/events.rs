use serde::Serialize;

/// Acknowledgement of a domain event queued for dispatch.
#[must_use]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAccepted {
    /// Wire name of the accepted event.
    pub event: &'static str,
}
