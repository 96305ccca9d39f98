//! Fan-out of domain events to every connected integration's hook.

mod dispatcher;

pub use dispatcher::{DispatchOutcome, HookDispatcher};

/// Tracing target for hook dispatch.
pub const TRACING_TARGET: &str = "murmur_integration::hook";
