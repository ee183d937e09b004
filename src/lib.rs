//! Batched, subprocess-backed node properties.
//!
//! Consumers ask a [`PropertyEngine`] for a property of a node and get a
//! [`Task`] back. Requests for the same property group are coalesced by the
//! [`BatchCollector`], one command runs per batch, and its output is
//! demultiplexed by the [`StreamDemuxer`] back onto every waiting request.
//! A [`TaskScheduler`] places work inline, on a UI loop, on a worker pool or
//! on an external queue; a [`ResourceLock`] guards the shared bookkeeping.
mod batch;
mod config;
mod constants;
mod context;
mod demux;
mod engine;
mod errors;
mod intref;
mod lock;
mod node;
mod pending;
mod refresh;
mod registry;
mod scheduler;

pub use batch::*;
pub use config::*;
pub use context::*;
pub use demux::*;
pub use engine::*;
pub use errors::*;
pub use intref::*;
pub use lock::*;
pub use node::*;
pub use pending::*;
pub use refresh::*;
pub use registry::*;
pub use scheduler::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
