//! Input/output utilities

pub mod parquet;

pub use parquet::{find_parquet_files, read_parquet, read_parquet_path, write_parquet};
