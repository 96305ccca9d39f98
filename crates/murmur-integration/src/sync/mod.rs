//! User-data synchronization with customer data platforms.
//!
//! Inbound identify calls merge provider attributes into user metadata;
//! outbound segment membership changes are pushed in bounded batches.

mod attributes;
mod batch;
mod orchestrator;

pub use attributes::{AttributeType, UserAttributeDefinition, coerce, map_attributes};
pub use batch::{BatchReport, DEFAULT_BATCH_SIZE, run_batched};
pub use orchestrator::{SegmentSyncOutcome, SyncReport, UserSyncOrchestrator};

/// Tracing target for user sync.
pub const TRACING_TARGET: &str = "murmur_integration::sync";
