//! Shared utilities
//!
//! Arrow column handling, Parquet IO, logging and progress helpers, numeric
//! helpers and test fixtures.

pub mod arrow;
pub mod io;
pub mod logging;
pub mod stats;
pub mod test;
