//! Arrow data handling utilities
//!
//! Column extraction with type adaptation for loaders, and the `ArrowTable`
//! trait used to turn analysis rows into record batches.

pub mod array_utils;
pub mod extractors;
pub mod table;

// Re-export commonly used functions for convenience
pub use array_utils::{column_names, get_column, require_columns};
pub use extractors::{
    extract_bool_column, extract_date_column, extract_f64_column, extract_i64_column,
    extract_string_column,
};
pub use table::ArrowTable;
