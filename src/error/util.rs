//! Utility functions for error handling
//!
//! File-system checks that produce `PanelError::Io` with the offending path attached.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{PanelError, Result};

/// Safely open a file with rich error information
///
/// # Arguments
/// * `path` - The path to the file to open
/// * `purpose` - Why the file is being opened (for error context)
pub fn safe_open_file(path: &Path, purpose: &str) -> Result<fs::File> {
    if !path.exists() {
        return Err(PanelError::io(format!("File not found, needed for: {purpose}")).with_path(path));
    }

    if !path.is_file() {
        return Err(PanelError::io(format!("Path is not a file, expected a file for: {purpose}"))
            .with_path(path));
    }

    fs::File::open(path).map_err(|e| {
        let context = match e.kind() {
            io::ErrorKind::PermissionDenied => "Permission denied - check file permissions".to_string(),
            _ => format!("Failed to open file for: {purpose}"),
        };
        PanelError::io_with_source(context, e).with_path(path)
    })
}

/// Check if a directory exists and is readable, with rich error information
pub fn validate_directory(path: &Path, purpose: &str) -> Result<()> {
    if !path.exists() {
        return Err(
            PanelError::io(format!("Directory not found, needed for: {purpose}")).with_path(path),
        );
    }

    if !path.is_dir() {
        return Err(PanelError::io(format!(
            "Path is not a directory, expected a directory for: {purpose}"
        ))
        .with_path(path));
    }

    fs::read_dir(path).map(|_| ()).map_err(|e| {
        let context = match e.kind() {
            io::ErrorKind::PermissionDenied => {
                "Permission denied - check directory permissions".to_string()
            }
            _ => format!("Failed to access directory for: {purpose}"),
        };
        PanelError::io_with_source(context, e).with_path(path)
    })
}

/// Create a directory (and parents) for writing outputs
pub fn ensure_directory(path: &Path, purpose: &str) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        PanelError::io_with_source(format!("Failed to create directory for: {purpose}"), e)
            .with_path(path)
    })
}

/// Safely read a file to string with rich error information
pub fn safe_read_to_string(path: &Path, purpose: &str) -> Result<String> {
    let mut file = safe_open_file(path, purpose)?;

    let mut content = String::new();
    io::Read::read_to_string(&mut file, &mut content).map_err(|e| {
        let context = match e.kind() {
            io::ErrorKind::InvalidData => {
                "File contains invalid UTF-8 data - cannot read as text".to_string()
            }
            _ => format!("Failed to read file content for: {purpose}"),
        };
        PanelError::io_with_source(context, e).with_path(path)
    })?;
    Ok(content)
}
