//! Fixed-size parallel batches with aggregated failure reporting.

use std::future::Future;

use futures::future::join_all;
use murmur_core::{Error, Result};
use serde::Serialize;

use super::TRACING_TARGET;

/// Default number of concurrent calls per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Failure messages kept on a report.
const MAX_RECORDED_ERRORS: usize = 5;

/// Outcome of a batched run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Items attempted.
    pub total: usize,
    /// Items that succeeded.
    pub succeeded: usize,
    /// Items that failed.
    pub failed: usize,
    /// First few failure messages.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl BatchReport {
    /// Turns any failure into a single error naming the count.
    pub fn into_result(self, operation: &str) -> Result<Self> {
        if self.failed == 0 {
            return Ok(self);
        }

        let mut message = format!("{} of {} {operation} failed", self.failed, self.total);
        if let Some(first) = self.errors.first() {
            message.push_str(&format!(" (first error: {first})"));
        }

        Err(Error::external_error().with_message(message))
    }
}

/// Runs `operation` over `items` in sequential batches of `batch_size`,
/// with every item in a batch running concurrently.
///
/// A failing item never stops later items or batches.
pub async fn run_batched<T, F, Fut>(items: &[T], batch_size: usize, operation: F) -> BatchReport
where
    F: Fn(&T) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut report = BatchReport {
        total: items.len(),
        ..BatchReport::default()
    };

    for (index, batch) in items.chunks(batch_size.max(1)).enumerate() {
        let results = join_all(batch.iter().map(&operation)).await;

        for result in results {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(error) => {
                    report.failed += 1;
                    if report.errors.len() < MAX_RECORDED_ERRORS {
                        report.errors.push(error.to_string());
                    }
                }
            }
        }

        tracing::trace!(
            target: TRACING_TARGET,
            batch = index,
            succeeded = report.succeeded,
            failed = report.failed,
            "Batch completed"
        );
    }

    report
}
