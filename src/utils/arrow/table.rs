//! Conversion of typed analysis rows into Arrow record batches
//!
//! Each output row type declares its Arrow fields once; serde_arrow fills the
//! columns from the rows' `Serialize` implementation. Declaring the fields
//! explicitly keeps dates as `Date32` and gives empty tables their full schema.

use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, FieldRef, Schema};
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;

/// A row type that can be written as a flat Arrow table
pub trait ArrowTable: Serialize + Sized {
    /// Arrow fields in column order
    fn fields() -> Vec<Field>;

    /// Arrow schema of the table
    fn schema() -> Schema {
        Schema::new(Self::fields())
    }

    /// Convert rows into a `RecordBatch`; no rows gives an empty batch with the full schema
    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
        if rows.is_empty() {
            return Ok(RecordBatch::new_empty(Arc::new(Self::schema())));
        }
        let fields: Vec<FieldRef> = Self::fields().into_iter().map(Arc::new).collect();
        Ok(serde_arrow::to_record_batch(&fields, &rows)?)
    }
}

/// Nullable or non-nullable string column
#[must_use]
pub fn utf8(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Utf8, nullable)
}

/// Date column
#[must_use]
pub fn date(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Date32, nullable)
}

/// 64-bit integer column
#[must_use]
pub fn int64(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Int64, nullable)
}

/// 64-bit float column
#[must_use]
pub fn float64(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Float64, nullable)
}

/// Boolean column
#[must_use]
pub fn boolean(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Boolean, nullable)
}

/// The three nullable classification key columns shared by every table
#[must_use]
pub fn cell_fields() -> Vec<Field> {
    vec![
        utf8("supersector", true),
        utf8("state_fips", true),
        utf8("size_class", true),
    ]
}
