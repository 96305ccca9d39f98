//! Response types for HTTP handlers.

mod connections;
mod error_response;
mod events;
mod monitors;

pub use connections::Connection;
pub use error_response::ErrorResponse;
pub use events::EventAccepted;
pub use monitors::HealthStatus;
