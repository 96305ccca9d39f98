//! Request extractors whose rejections render as [`Error`] responses.
//!
//! [`Json`], [`Path`] and [`Query`] wrap their axum counterparts and turn
//! rejections into `400`s with a readable context; [`ClientAddr`] names the
//! caller for rate limiting.
//!
//! [`Error`]: crate::handler::Error

mod client_addr;
pub mod reject;

pub use crate::extract::client_addr::ClientAddr;
pub use crate::extract::reject::{Json, Path, Query};

/// Tracing target for extractor rejections.
pub(crate) const TRACING_TARGET: &str = "murmur_server::extract";

/// Keeps rejection messages short and single line.
pub(crate) fn sanitize_error_message(message: &str) -> String {
    let lines = message.lines().take(3).collect::<Vec<_>>();
    lines.join(" ").chars().take(200).collect()
}
