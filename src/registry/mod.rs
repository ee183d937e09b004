//! Property definitions and their grouping into command invocations.
mod property;
mod property_registry;

pub use property::*;
pub use property_registry::*;
