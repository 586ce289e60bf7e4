//! Writing typed inputs back out as Parquet
//!
//! Used by tests and demos that exercise the loaders on files they generate.

use arrow::array::{ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::models::client_month::{Capabilities, ClientMonth};
use crate::models::official::OfficialObservation;
use crate::utils::io::write_parquet;

fn epoch_days(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    i32::try_from((date - epoch).num_days()).unwrap_or_default()
}

fn strings(values: impl Iterator<Item = Option<String>>) -> ArrayRef {
    Arc::new(values.collect::<StringArray>())
}

fn dates(values: impl Iterator<Item = Option<NaiveDate>>) -> ArrayRef {
    Arc::new(values.map(|d| d.map(epoch_days)).collect::<Date32Array>())
}

/// Build a client-month batch in the loader's input layout
///
/// Optional columns (`employee_id`, `gross_pay`, `filing_date`, `hires` and
/// `separations`) are written only when some record carries them, so the
/// reloaded table reports the same capabilities.
pub fn client_month_batch(records: &[ClientMonth]) -> Result<RecordBatch> {
    let caps = Capabilities::detect(records);

    let mut fields = vec![
        Field::new("client_id", DataType::Utf8, false),
        Field::new("ref_date", DataType::Date32, false),
        Field::new("entry_month", DataType::Date32, false),
        Field::new("exit_month", DataType::Date32, true),
        Field::new("is_birth", DataType::Boolean, true),
        Field::new("naics_code", DataType::Utf8, false),
        Field::new("state_fips", DataType::Utf8, false),
        Field::new("qualified_employment", DataType::Int64, false),
    ];
    let mut columns: Vec<ArrayRef> = vec![
        strings(records.iter().map(|r| Some(r.client_id.clone()))),
        dates(records.iter().map(|r| Some(r.ref_date))),
        dates(records.iter().map(|r| Some(r.entry_month))),
        dates(records.iter().map(|r| r.exit_month)),
        Arc::new(records.iter().map(|r| r.birth.as_flag()).collect::<BooleanArray>()),
        strings(records.iter().map(|r| Some(r.naics_code.clone()))),
        strings(records.iter().map(|r| Some(r.state_fips.clone()))),
        Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.employment))),
    ];

    if caps.has_employee_id {
        fields.push(Field::new("employee_id", DataType::Utf8, true));
        columns.push(strings(records.iter().map(|r| r.employee_id.clone())));
    }
    if caps.has_earnings {
        fields.push(Field::new("gross_pay", DataType::Float64, true));
        columns.push(Arc::new(
            records.iter().map(|r| r.gross_pay).collect::<Float64Array>(),
        ));
    }
    if caps.has_filing_date {
        fields.push(Field::new("filing_date", DataType::Date32, true));
        columns.push(dates(records.iter().map(|r| r.filing_date)));
    }
    if caps.has_flow_columns {
        fields.push(Field::new("hires", DataType::Int64, true));
        fields.push(Field::new("separations", DataType::Int64, true));
        columns.push(Arc::new(records.iter().map(|r| r.hires).collect::<Int64Array>()));
        columns.push(Arc::new(
            records.iter().map(|r| r.separations).collect::<Int64Array>(),
        ));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Build an official batch with `ref_date`, `quarter`, the key columns and `employment`
pub fn official_batch(observations: &[OfficialObservation]) -> Result<RecordBatch> {
    let schema = Schema::new(vec![
        Field::new("ref_date", DataType::Date32, true),
        Field::new("quarter", DataType::Utf8, true),
        Field::new("supersector", DataType::Utf8, true),
        Field::new("state_fips", DataType::Utf8, true),
        Field::new("size_class", DataType::Utf8, true),
        Field::new("employment", DataType::Float64, true),
    ]);
    let columns: Vec<ArrayRef> = vec![
        dates(observations.iter().map(|o| o.ref_date)),
        strings(observations.iter().map(|o| o.quarter.map(|q| q.to_string()))),
        strings(observations.iter().map(|o| o.cell.supersector.clone())),
        strings(observations.iter().map(|o| o.cell.state_fips.clone())),
        strings(observations.iter().map(|o| o.cell.size_class.clone())),
        Arc::new(
            observations
                .iter()
                .map(|o| o.employment)
                .collect::<Float64Array>(),
        ),
    ];
    Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
}

/// Write client-month records to a Parquet file
pub fn write_client_months(path: &Path, records: &[ClientMonth]) -> Result<()> {
    write_parquet(path, &client_month_batch(records)?)
}

/// Write official observations to a Parquet file
pub fn write_official(path: &Path, observations: &[OfficialObservation]) -> Result<()> {
    write_parquet(path, &official_batch(observations)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::client_month::{BirthStatus, ClientMonthTable};

    #[test]
    fn batch_round_trips_through_loader() {
        let record = ClientMonth::new(
            "c1",
            NaiveDate::from_ymd_opt(2020, 3, 12).unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 12).unwrap(),
            None,
            BirthStatus::Confirmed,
            "236220",
            "06",
            15,
        )
        .with_gross_pay(2500.0);

        let batch = client_month_batch(std::slice::from_ref(&record)).unwrap();
        assert!(batch.schema().index_of("gross_pay").is_ok());
        assert!(batch.schema().index_of("employee_id").is_err());

        let table = ClientMonthTable::from_batches(&[batch]).unwrap();
        assert_eq!(table.records(), &[record]);
        assert!(table.capabilities().has_earnings);
        assert!(!table.capabilities().has_employee_id);
    }
}
