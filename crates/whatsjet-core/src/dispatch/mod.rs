//! Rate-limited dispatch of campaign recipients onto the send queue

mod dispatcher;
mod rate_limiter;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use rate_limiter::{TokenBucket, VendorRateLimiter};
