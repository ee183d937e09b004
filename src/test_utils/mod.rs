//! Helpers shared by the unit tests.
mod common;
mod fake_runner;

pub use common::*;
pub use fake_runner::*;
