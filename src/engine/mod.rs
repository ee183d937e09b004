//! Consumer-facing refresh API.
mod property_engine;

pub use property_engine::*;
