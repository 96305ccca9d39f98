//! Query string extractor.

use axum::extract::rejection::QueryRejection;
use axum::extract::{FromRequestParts, Query as AxumQuery};
use axum::http::request::Parts;
use derive_more::{Deref, DerefMut, From};
use serde::de::DeserializeOwned;

use crate::extract::{TRACING_TARGET, sanitize_error_message};
use crate::handler::{Error, ErrorKind};

/// [`axum::extract::Query`] with rejections rendered as [`Error`]s.
#[must_use]
#[derive(Debug, Clone, Copy, Default, Deref, DerefMut, From)]
pub struct Query<T>(pub T);

impl<T> Query<T> {
    /// Returns the inner value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error<'static>;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AxumQuery::<T>::from_request_parts(parts, state).await {
            Ok(AxumQuery(query)) => Ok(Query(query)),
            Err(rejection) => Err(rejection.into()),
        }
    }
}

impl From<QueryRejection> for Error<'static> {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(
            target: TRACING_TARGET,
            error = %rejection,
            "Query string rejected"
        );

        let message = rejection.body_text();
        let summary = if message.contains("missing field") {
            "Missing required query parameter"
        } else if message.contains("duplicate field") {
            "Duplicate query parameter"
        } else {
            "Invalid query parameters"
        };

        ErrorKind::BadRequest
            .with_message(summary)
            .with_context(sanitize_error_message(&message))
    }
}
