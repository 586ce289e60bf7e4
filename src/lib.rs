//! Payroll-provider client panels benchmarked against official labor statistics
//!
//! Builds a stacked multi-level panel from client-month records, measures its
//! coverage and composition against QCEW-, CES- and BED-style series, compares
//! growth, decomposes divergence and rakes record weights to official totals.

pub mod algorithm;
pub mod config;
pub mod error;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod utils;

// Re-export the most common types for easier use
// Core types
pub use config::{PipelineConfig, RakeConfig, ReliabilityThresholds};
pub use error::{PanelError, Result};
pub use models::{
    AggregationLevel, BirthStatus, Capabilities, CellKey, ClientMonth, ClientMonthTable,
    Dimension, OfficialObservation, PanelRow, Quarter, SizeClass,
};
pub use pipeline::{Pipeline, RunSummary};

// Arrow types
pub use arrow::record_batch::RecordBatch;

// Loading and export
pub use loader::{load_bed_series, load_ces_series, load_client_months, load_official_series};
pub use utils::arrow::ArrowTable;
pub use utils::io::{read_parquet_path, write_parquet};

// Analyses
pub use algorithm::panel::{build_panel, build_panel_levels, filter_stable_panel};
pub use algorithm::raking::{RakeOutcome, RakingStrategy, SequentialIpf, rake, rake_to_official};
