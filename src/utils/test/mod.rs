//! Test utilities
//!
//! Seeded synthetic inputs and helpers for writing them as Parquet, shared by
//! unit and integration tests.

pub mod fixtures;
pub mod helpers;

// Re-export commonly used functions for convenience
pub use fixtures::{month, official_from_records, synthetic_panel};
pub use helpers::{client_month_batch, official_batch, write_client_months, write_official};
