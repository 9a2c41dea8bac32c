//! Raw SQL for the collection tables.

pub mod records;
