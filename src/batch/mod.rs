//! Request batching per property group.
mod batch_collector;

pub use batch_collector::*;
