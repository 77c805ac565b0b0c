//! Inbound Event Processor

mod events;
mod processor;
pub mod webhook;

pub use events::{EventKind, InboundEvent};
pub use processor::{counter_delta, EventOutcome, InboundProcessor};
