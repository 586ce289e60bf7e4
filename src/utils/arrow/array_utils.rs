//! Utilities for working with Arrow arrays.
//!
//! This module provides utility functions for safely extracting columns from
//! record batches, converting them to the type the loaders expect.

use arrow::array::{Array, ArrayRef};
use arrow::compute::{can_cast_types, cast};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use log::debug;

use crate::error::{PanelError, Result};

/// Names of every column in a batch
#[must_use]
pub fn column_names(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

/// Check that every required column is present, reporting all missing ones at once
///
/// # Arguments
///
/// * `table` - Name of the input table, used in the error message
/// * `available` - Column names present in the input
/// * `required` - Column names that must be present
pub fn require_columns(table: &str, available: &[String], required: &[&str]) -> Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !available.iter().any(|a| a == *name))
        .map(|name| (*name).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PanelError::MissingColumns {
            table: table.to_string(),
            missing,
            available: available.to_vec(),
        })
    }
}

/// Get a column from a record batch with automatic type adaptation
///
/// If the column has a different type than `expected_type`, it is cast with
/// arrow's cast kernel. Values that cannot be represented become null.
///
/// # Returns
///
/// * `Ok(Some(ArrayRef))` - The column array (converted if necessary) if found
/// * `Ok(None)` - If the column is not found and `required` is false
/// * `Err(PanelError)` - If the column is missing and required, or its type cannot be cast
pub fn get_column(
    batch: &RecordBatch,
    column_name: &str,
    expected_type: &DataType,
    required: bool,
) -> Result<Option<ArrayRef>> {
    let Ok(idx) = batch.schema().index_of(column_name) else {
        if required {
            return Err(PanelError::MissingColumns {
                table: "input".to_string(),
                missing: vec![column_name.to_string()],
                available: column_names(batch),
            });
        }
        return Ok(None);
    };

    let column = batch.column(idx);
    let actual_type = column.data_type();

    if actual_type == expected_type {
        return Ok(Some(column.clone()));
    }

    if !can_cast_types(actual_type, expected_type) {
        return Err(PanelError::ColumnType {
            column: column_name.to_string(),
            data_type: actual_type.to_string(),
            expected: expected_type.to_string(),
        });
    }

    debug!("Converting column '{column_name}' from {actual_type:?} to {expected_type:?}");
    Ok(Some(cast(column, expected_type)?))
}

/// Downcast a column to a specific array type with clear error messages
pub fn downcast_array<'a, A: Array + 'static>(
    array: &'a ArrayRef,
    column_name: &str,
    expected_type_name: &str,
) -> Result<&'a A> {
    array
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| PanelError::ColumnType {
            column: column_name.to_string(),
            data_type: array.data_type().to_string(),
            expected: expected_type_name.to_string(),
        })
}
