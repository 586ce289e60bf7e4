//! Parquet file operations
//!
//! Reading single files or directories of Parquet files into Arrow record
//! batches, and writing analysis tables back out.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rayon::prelude::*;

use crate::error::util::{safe_open_file, validate_directory};
use crate::error::{PanelError, Result};
use crate::utils::logging::{log_directory_read, log_file_read};

/// Default batch size for Parquet reading
pub const DEFAULT_BATCH_SIZE: usize = 16384;

/// Helper function to get batch size from environment
#[must_use]
pub fn get_batch_size() -> Option<usize> {
    std::env::var("PARQUET_BATCH_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
}

/// Read a Parquet file into Arrow record batches
pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>> {
    let start = std::time::Instant::now();
    let file = safe_open_file(path, "reading parquet data")?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
        .with_batch_size(get_batch_size().unwrap_or(DEFAULT_BATCH_SIZE))
        .build()?;

    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;

    let rows = batches.iter().map(RecordBatch::num_rows).sum();
    log_file_read(path, rows, start.elapsed());
    Ok(batches)
}

/// Find all Parquet files in a directory, sorted by name
pub fn find_parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    validate_directory(dir, "searching for parquet files")?;

    let parquet_files = std::fs::read_dir(dir)
        .map_err(|e| PanelError::io_with_source("Failed to read directory", e).with_path(dir))?
        .filter_map(|entry_result| match entry_result {
            Ok(entry) => {
                let path = entry.path();
                (path.is_file() && path.extension().is_some_and(|ext| ext == "parquet"))
                    .then_some(Ok(path))
            }
            Err(e) => Some(Err(PanelError::io_with_source(
                "Failed to read directory entry",
                e,
            )
            .with_path(dir))),
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .sorted()
        .collect_vec();

    Ok(parquet_files)
}

/// Read a Parquet file, or every Parquet file in a directory
///
/// Directory files are read in parallel and concatenated in file-name order.
pub fn read_parquet_path(path: &Path) -> Result<Vec<RecordBatch>> {
    if !path.is_dir() {
        return read_parquet(path);
    }

    let files = find_parquet_files(path)?;
    let per_file: Vec<Result<Vec<RecordBatch>>> =
        files.par_iter().map(|file| read_parquet(file)).collect();

    let mut batches = Vec::new();
    for result in per_file {
        batches.extend(result?);
    }

    log_directory_read(path, files.len(), batches.len());
    Ok(batches)
}

/// Write a record batch to a Parquet file, replacing any existing file
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        PanelError::io_with_source("Failed to create parquet file", e).with_path(path)
    })?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;

    log::debug!("Wrote {} rows to {}", batch.num_rows(), path.display());
    Ok(())
}
