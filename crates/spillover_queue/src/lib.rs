//! Durable spillover queue
//!
//! Bounded FIFO with two tiers: an in-memory ring for the fast path and an
//! append-only disk log that absorbs bursts and survives restarts.
//!
//! - `codec`: value encoding for the disk tier
//! - `log`: the `{name}.fifo` record log
//! - `queue`: the async queue combining both tiers

mod codec;
mod error;
mod log;
mod queue;

pub use codec::{BincodeCodec, QueueCodec, RawCodec, Utf8Codec};
pub use error::QueueError;
pub use log::{inspect, LogReport};
pub use queue::{EnqueueResult, QueueEntry, QueueOptions, Residency, SpilloverQueue};
