mod resource_lock;

pub use resource_lock::*;

#[cfg(test)]
mod resource_lock_test;
