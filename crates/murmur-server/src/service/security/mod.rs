//! Request throttling.

mod rate_limiter;

pub use rate_limiter::{Clock, RateLimitConfig, RateLimitKey, RateLimiter, SystemClock};
#[cfg(test)]
pub(crate) use rate_limiter::tests::ManualClock;
