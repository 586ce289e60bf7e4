//! Logging utilities for output and progress tracking
//!
//! This module provides utilities for logging and progress tracking of pipeline stages.

pub mod log;
pub mod progress;

// Re-export commonly used functions for convenience
pub use log::{
    log_directory_read, log_file_read, log_input_loaded, log_skipped_rows, log_table_written,
};
pub use progress::{create_main_progress_bar, finish_progress_bar};
