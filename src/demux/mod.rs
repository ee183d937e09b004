//! Demultiplexing of a batch command's output into per-node values.
mod stream_demuxer;

pub use stream_demuxer::*;
