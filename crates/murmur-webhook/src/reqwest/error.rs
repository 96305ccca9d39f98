//! Conversion of reqwest failures into hub errors.

use thiserror::Error;

/// Result type alias for provider client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for provider client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// Response body was not the expected JSON.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<Error> for murmur_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Reqwest(e) => {
                if e.is_timeout() {
                    murmur_core::Error::timeout()
                        .with_message(e.to_string())
                        .with_source(e)
                } else if e.is_connect() {
                    murmur_core::Error::network_error()
                        .with_message("Connection failed")
                        .with_source(e)
                } else if e.is_decode() || e.is_builder() {
                    murmur_core::Error::serialization()
                        .with_message(e.to_string())
                        .with_source(e)
                } else {
                    murmur_core::Error::network_error()
                        .with_message(e.to_string())
                        .with_source(e)
                }
            }
            Error::Serde(e) => murmur_core::Error::serialization()
                .with_message(e.to_string())
                .with_source(e),
        }
    }
}
