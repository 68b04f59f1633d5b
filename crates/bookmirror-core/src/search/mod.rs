//! Background search queue
//!
//! Searches are slow and rate-limited on the server, so they are queued and
//! run one at a time with a short pause between them.

mod queue;

pub use queue::{SearchQueue, DRAIN_DELAY, QUEUE_STORE_KEY};
