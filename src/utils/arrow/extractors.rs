//! Column extraction utilities for Arrow record batches
//!
//! Each extractor adapts the column to one Arrow type with [`get_column`] and
//! returns its values as a vector of options, one per row.

use arrow::array::{Array, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;

use crate::error::Result;
use crate::utils::arrow::array_utils::{downcast_array, get_column};

/// Extract a column as strings
///
/// Integer columns are rendered in decimal. Empty strings are returned as `None`.
///
/// # Returns
///
/// * `Ok(Some(values))` - One entry per row
/// * `Ok(None)` - If the column is not present and not required
pub fn extract_string_column(
    batch: &RecordBatch,
    column_name: &str,
    required: bool,
) -> Result<Option<Vec<Option<String>>>> {
    let Some(array) = get_column(batch, column_name, &DataType::Utf8, required)? else {
        return Ok(None);
    };
    let strings = downcast_array::<StringArray>(&array, column_name, "Utf8")?;

    Ok(Some(
        strings
            .iter()
            .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
            .collect(),
    ))
}

/// Extract a column as dates
///
/// Accepts Date32, Date64, timestamps and `YYYY-MM-DD` strings.
pub fn extract_date_column(
    batch: &RecordBatch,
    column_name: &str,
    required: bool,
) -> Result<Option<Vec<Option<NaiveDate>>>> {
    let Some(array) = get_column(batch, column_name, &DataType::Date32, required)? else {
        return Ok(None);
    };
    let dates = downcast_array::<Date32Array>(&array, column_name, "Date32")?;

    Ok(Some(
        (0..dates.len())
            .map(|i| {
                if dates.is_null(i) {
                    None
                } else {
                    dates.value_as_date(i)
                }
            })
            .collect(),
    ))
}

/// Extract a numeric column as `i64`
pub fn extract_i64_column(
    batch: &RecordBatch,
    column_name: &str,
    required: bool,
) -> Result<Option<Vec<Option<i64>>>> {
    let Some(array) = get_column(batch, column_name, &DataType::Int64, required)? else {
        return Ok(None);
    };
    let values = downcast_array::<Int64Array>(&array, column_name, "Int64")?;
    Ok(Some(values.iter().collect()))
}

/// Extract a numeric column as `f64`
pub fn extract_f64_column(
    batch: &RecordBatch,
    column_name: &str,
    required: bool,
) -> Result<Option<Vec<Option<f64>>>> {
    let Some(array) = get_column(batch, column_name, &DataType::Float64, required)? else {
        return Ok(None);
    };
    let values = downcast_array::<Float64Array>(&array, column_name, "Float64")?;
    Ok(Some(values.iter().collect()))
}

/// Extract a boolean column; nulls are preserved
pub fn extract_bool_column(
    batch: &RecordBatch,
    column_name: &str,
    required: bool,
) -> Result<Option<Vec<Option<bool>>>> {
    let Some(array) = get_column(batch, column_name, &DataType::Boolean, required)? else {
        return Ok(None);
    };
    let values = downcast_array::<BooleanArray>(&array, column_name, "Boolean")?;
    Ok(Some(values.iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    #[test]
    fn dates_from_strings() {
        let schema = Schema::new(vec![Field::new("ref_date", DataType::Utf8, true)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(StringArray::from(vec![Some("2020-01-12"), None]))],
        )
        .unwrap();

        let dates = extract_date_column(&batch, "ref_date", true).unwrap().unwrap();
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2020, 1, 12));
        assert_eq!(dates[1], None);
    }

    #[test]
    fn integer_codes_as_strings() {
        let schema = Schema::new(vec![Field::new("state_fips", DataType::Int32, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Int32Array::from(vec![6, 36]))],
        )
        .unwrap();

        let codes = extract_string_column(&batch, "state_fips", true)
            .unwrap()
            .unwrap();
        assert_eq!(codes, vec![Some("6".to_string()), Some("36".to_string())]);
    }
}
