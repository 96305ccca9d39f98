//! Drop-in replacements for axum's data extractors.

mod json;
mod path;
mod query;

pub use self::json::Json;
pub use self::path::Path;
pub use self::query::Query;
