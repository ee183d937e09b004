mod intref_table;

pub use intref_table::*;

#[cfg(test)]
mod intref_table_test;
