//! Hub error to HTTP error conversion.

use murmur_core::{Error as CoreError, ErrorKind as CoreErrorKind};

use super::http_error::{Error as HttpError, ErrorKind};

/// Tracing target for hub error conversions.
const TRACING_TARGET: &str = "murmur_server::handler::error";

impl From<CoreError> for HttpError<'static> {
    fn from(error: CoreError) -> Self {
        let kind = match error.kind {
            CoreErrorKind::NotFound => ErrorKind::NotFound,
            CoreErrorKind::Configuration => ErrorKind::Conflict,
            CoreErrorKind::Authentication => ErrorKind::Unauthorized,
            CoreErrorKind::InvalidInput => ErrorKind::BadRequest,
            CoreErrorKind::RateLimited => ErrorKind::TooManyRequests,
            _ => ErrorKind::InternalServerError,
        };

        if kind == ErrorKind::InternalServerError {
            tracing::error!(
                target: TRACING_TARGET,
                error = %error,
                error_kind = %error.kind,
                "Hub operation failed"
            );

            // Internal details stay in the logs.
            return kind.into_error();
        }

        tracing::warn!(
            target: TRACING_TARGET,
            error = %error,
            error_kind = %error.kind,
            "Hub operation rejected"
        );

        let mut http_error = kind.with_message(error.message_or_kind().to_owned());
        if let Some(context) = error.context {
            http_error = http_error.with_resource(context);
        }

        http_error
    }
}
