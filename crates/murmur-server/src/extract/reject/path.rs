//! Path parameter extractor.

use axum::extract::rejection::PathRejection;
use axum::extract::{FromRequestParts, Path as AxumPath};
use axum::http::request::Parts;
use derive_more::{Deref, DerefMut, From};
use serde::de::DeserializeOwned;

use crate::extract::{TRACING_TARGET, sanitize_error_message};
use crate::handler::{Error, ErrorKind};

/// [`axum::extract::Path`] with rejections rendered as [`Error`]s.
#[must_use]
#[derive(Debug, Clone, Copy, Default, Deref, DerefMut, From)]
pub struct Path<T>(pub T);

impl<T> Path<T> {
    /// Returns the inner value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send + 'static,
    S: Send + Sync,
{
    type Rejection = Error<'static>;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let extractor =
            <AxumPath<T> as FromRequestParts<S>>::from_request_parts(parts, state).await;
        extractor.map(|x| Self(x.0)).map_err(Into::into)
    }
}

impl From<PathRejection> for Error<'static> {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(
            target: TRACING_TARGET,
            error = %rejection,
            "Path parameters rejected"
        );

        match rejection {
            PathRejection::FailedToDeserializePathParams(err) => {
                let message = err.body_text();
                let hint = if message.to_lowercase().contains("uuid") {
                    "Identifiers must be UUIDs"
                } else {
                    "Check that the parameter format matches the route"
                };

                ErrorKind::BadRequest
                    .with_message("Invalid path parameter format")
                    .with_context(format!("{}. {}", sanitize_error_message(&message), hint))
            }
            PathRejection::MissingPathParams(err) => ErrorKind::MissingPathParam
                .with_message("Required path parameter missing")
                .with_context(sanitize_error_message(&err.body_text())),
            _ => ErrorKind::InternalServerError.with_message("Path processing failed"),
        }
    }
}
