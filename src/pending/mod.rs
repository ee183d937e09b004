//! Outstanding consumer requests awaiting a batch result.
mod pending_request_table;

pub use pending_request_table::*;
