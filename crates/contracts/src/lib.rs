//! # Contracts
//!
//! Frozen interface contracts shared by every IPC crate: the envelope and chunk data
//! model, RPC/Sink module traits, the transport seams and the error taxonomy.
//! All business crates depend on this crate, reverse dependencies are prohibited.
//!
//! ## Traffic model
//! - RPC: request/reply, correlated back to a caller-visible future under a deadline
//! - Sink: fire-and-forget, split into ordered chunks that must land in one shard

mod chunk;
mod config;
mod envelope;
mod error;
mod rpc;
mod sink;
mod tracing_info;
mod transport;

pub use chunk::*;
pub use config::*;
pub use envelope::*;
pub use error::*;
pub use rpc::*;
pub use sink::*;
pub use tracing_info::*;
pub use transport::*;
