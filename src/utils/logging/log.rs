//! Log lines for inputs read and tables written
//!
//! Every loader and pipeline stage reports through these so a run's log reads
//! as one row count per input and per output table.

use std::path::Path;
use std::time::Duration;

/// Log one Parquet file read
pub fn log_file_read(path: &Path, rows: usize, elapsed: Duration) {
    log::debug!("Read {rows} rows from {} in {elapsed:?}", path.display());
}

/// Log a directory of Parquet files read as one input
pub fn log_directory_read(dir: &Path, files: usize, batches: usize) {
    if files == 0 {
        log::warn!("No Parquet files found in {}", dir.display());
    } else {
        log::info!(
            "Loaded {batches} batches from {files} Parquet files in {}",
            dir.display()
        );
    }
}

/// Log a normalised input table
///
/// `source` names the input, e.g. `client-month` or `BED`.
pub fn log_input_loaded(source: &str, path: &Path, rows: usize, elapsed: Option<Duration>) {
    match elapsed {
        Some(duration) => log::info!(
            "Loaded {rows} {source} rows from {} in {duration:?}",
            path.display()
        ),
        None => log::info!("Loaded {rows} {source} rows from {}", path.display()),
    }
}

/// Log input rows dropped during normalisation
pub fn log_skipped_rows(source: &str, skipped: usize, reason: &str) {
    if skipped > 0 {
        log::warn!("Skipped {skipped} {source} rows {reason}");
    }
}

/// Log an analysis table written to disk
///
/// An empty table is a warning: the stage ran but its inputs produced nothing.
pub fn log_table_written(name: &str, path: &Path, rows: usize) {
    if rows == 0 {
        log::warn!("{name}: no rows produced ({})", path.display());
    } else {
        log::info!("{name}: {rows} rows written to {}", path.display());
    }
}
