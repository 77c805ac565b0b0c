//! Send Worker - executes queued sends against the messaging provider

mod backoff;
mod job;
mod send;

pub use backoff::RetryPolicy;
pub use job::SendJob;
pub use send::{JobOutcome, SendWorker};
