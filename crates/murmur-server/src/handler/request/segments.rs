use serde::Deserialize;
use uuid::Uuid;

/// Membership delta of one segment.
#[must_use]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SegmentSyncRequest {
    /// Principals that joined the segment.
    #[serde(default)]
    pub added: Vec<Uuid>,
    /// Principals that left the segment.
    #[serde(default)]
    pub removed: Vec<Uuid>,
}
