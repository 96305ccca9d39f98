use serde::Serialize;

/// Liveness response.
#[must_use]
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Always `ok` while the process serves requests.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
