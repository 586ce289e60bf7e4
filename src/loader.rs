//! Loading client-month and official tables from Parquet
//!
//! Loaders validate the schema once, adapt column types and build the typed
//! records the analyses work on.

use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::path::Path;
use std::time::Instant;

use crate::error::{PanelError, Result};
use crate::models::cell::CellKey;
use crate::models::client_month::{BirthStatus, Capabilities, ClientMonth, ClientMonthTable};
use crate::models::official::{
    BedObservation, BedRecord, CesRecord, OfficialObservation, QcewQuarterRecord,
};
use crate::models::period::{Quarter, align_day_of_month};
use crate::utils::arrow::{
    column_names, extract_bool_column, extract_date_column, extract_f64_column,
    extract_i64_column, extract_string_column, require_columns,
};
use crate::utils::io::read_parquet_path;
use crate::utils::logging::{log_input_loaded, log_skipped_rows};

/// Columns every client-month input must carry
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "client_id",
    "ref_date",
    "entry_month",
    "exit_month",
    "is_birth",
    "naics_code",
    "state_fips",
    "qualified_employment",
];

const PAYROLL_TABLE: &str = "client-month";

/// Employment columns recognised in official tables, in order of preference
const EMPLOYMENT_COLUMNS: [&str; 3] = ["qcew_employment", "employment", "month1_emplvl"];

/// Establishment columns recognised in official tables, in order of preference
const ESTABLISHMENT_COLUMNS: [&str; 3] =
    ["qcew_establishments", "qtrly_estabs_count", "establishments"];

const QUARTERLY_COLUMNS: [&str; 5] = ["year", "qtr", "month1_emplvl", "month2_emplvl", "month3_emplvl"];

/// Load a client-month table from a Parquet file or directory
pub fn load_client_months(path: &Path) -> Result<ClientMonthTable> {
    let start = Instant::now();
    let batches = read_parquet_path(path)?;
    let table = ClientMonthTable::from_batches(&batches)?;
    log_input_loaded("client-month", path, table.len(), Some(start.elapsed()));
    debug!("Client-month capabilities: {:?}", table.capabilities());
    Ok(table)
}

/// Zero-pad purely numeric state codes to two digits
fn normalize_fips(code: String) -> String {
    if !code.is_empty() && code.len() < 2 && code.chars().all(|c| c.is_ascii_digit()) {
        format!("{code:0>2}")
    } else {
        code
    }
}

fn required<T>(value: Option<T>, column: &str, row: usize) -> Result<T> {
    value.ok_or_else(|| PanelError::null_value(column, row))
}

/// Unwrap a column that `require_columns` already checked for
fn present<T>(column: Option<Vec<T>>, name: &str, batch: &RecordBatch) -> Result<Vec<T>> {
    column.ok_or_else(|| PanelError::MissingColumns {
        table: PAYROLL_TABLE.to_string(),
        missing: vec![name.to_string()],
        available: column_names(batch),
    })
}

impl ClientMonthTable {
    /// Validate and extract client-month records from record batches
    ///
    /// Every missing required column is reported together. Nulls in required
    /// columns other than `exit_month` and `is_birth` are errors, as are
    /// negative employment counts. Optional columns (`employee_id`,
    /// `gross_pay`, `filing_date`, `hires`, `separations`) set the table's
    /// capabilities when present.
    pub fn from_batches(batches: &[RecordBatch]) -> Result<Self> {
        let Some(first) = batches.first() else {
            warn!("Client-month input contains no record batches");
            return Ok(Self::default());
        };

        let available = column_names(first);
        require_columns(PAYROLL_TABLE, &available, &REQUIRED_COLUMNS)?;

        let has = |name: &str| available.iter().any(|c| c == name);
        let capabilities = Capabilities {
            has_employee_id: has("employee_id"),
            has_earnings: has("gross_pay"),
            has_flow_columns: has("hires") && has("separations"),
            has_filing_date: has("filing_date"),
        };

        let total_rows = batches.iter().map(RecordBatch::num_rows).sum();
        let mut records = Vec::with_capacity(total_rows);
        let mut offset = 0;

        for batch in batches {
            require_columns(PAYROLL_TABLE, &column_names(batch), &REQUIRED_COLUMNS)?;
            records.extend(extract_client_months(batch, offset)?);
            offset += batch.num_rows();
        }

        if !capabilities.has_employee_id {
            info!("No employee_id column; job flows fall back to client-level data");
        }
        if !capabilities.has_earnings {
            info!("No gross_pay column; earnings outputs will be empty");
        }

        Ok(Self::with_capabilities(records, capabilities))
    }
}

fn extract_client_months(batch: &RecordBatch, offset: usize) -> Result<Vec<ClientMonth>> {
    let client_ids = present(extract_string_column(batch, "client_id", true)?, "client_id", batch)?;
    let ref_dates = present(extract_date_column(batch, "ref_date", true)?, "ref_date", batch)?;
    let entry_months = present(
        extract_date_column(batch, "entry_month", true)?,
        "entry_month",
        batch,
    )?;
    let exit_months = present(
        extract_date_column(batch, "exit_month", true)?,
        "exit_month",
        batch,
    )?;
    let births = present(extract_bool_column(batch, "is_birth", true)?, "is_birth", batch)?;
    let naics = present(extract_string_column(batch, "naics_code", true)?, "naics_code", batch)?;
    let states = present(extract_string_column(batch, "state_fips", true)?, "state_fips", batch)?;
    let employment = present(
        extract_i64_column(batch, "qualified_employment", true)?,
        "qualified_employment",
        batch,
    )?;

    let employee_ids = extract_string_column(batch, "employee_id", false)?;
    let gross_pay = extract_f64_column(batch, "gross_pay", false)?;
    let filing_dates = extract_date_column(batch, "filing_date", false)?;
    let hires = extract_i64_column(batch, "hires", false)?;
    let separations = extract_i64_column(batch, "separations", false)?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let row = offset + i;
        let emp = required(employment[i], "qualified_employment", row)?;
        if emp < 0 {
            return Err(PanelError::InvalidValue {
                column: "qualified_employment".to_string(),
                row,
                message: format!("negative employment {emp}"),
            });
        }

        let mut record = ClientMonth::new(
            required(client_ids[i].clone(), "client_id", row)?,
            required(ref_dates[i], "ref_date", row)?,
            required(entry_months[i], "entry_month", row)?,
            exit_months[i],
            BirthStatus::from_flag(births[i]),
            &required(naics[i].clone(), "naics_code", row)?,
            normalize_fips(required(states[i].clone(), "state_fips", row)?),
            emp,
        );

        record.employee_id = employee_ids.as_ref().and_then(|v| v[i].clone());
        record.gross_pay = gross_pay.as_ref().and_then(|v| v[i]);
        record.filing_date = filing_dates.as_ref().and_then(|v| v[i]);
        record.hires = hires.as_ref().and_then(|v| v[i]);
        record.separations = separations.as_ref().and_then(|v| v[i]);
        records.push(record);
    }

    Ok(records)
}

/// Optional key columns of an official table
fn extract_cells(batch: &RecordBatch) -> Result<Vec<CellKey>> {
    let supersectors = extract_string_column(batch, "supersector", false)?;
    let states = extract_string_column(batch, "state_fips", false)?;
    let sizes = extract_string_column(batch, "size_class", false)?;

    Ok((0..batch.num_rows())
        .map(|i| CellKey {
            supersector: supersectors.as_ref().and_then(|v| v[i].clone()),
            state_fips: states.as_ref().and_then(|v| v[i].clone()).map(normalize_fips),
            size_class: sizes.as_ref().and_then(|v| v[i].clone()),
        })
        .collect())
}

fn first_present<'a>(available: &[String], candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .find(|c| available.iter().any(|a| a == c))
}

/// Load a QCEW-style official employment series
///
/// See [`official_from_batches`] for the recognised layouts.
pub fn load_official_series(path: &Path, day_of_month: u32) -> Result<Vec<OfficialObservation>> {
    let batches = read_parquet_path(path)?;
    let observations = official_from_batches(&batches, day_of_month)?;
    log_input_loaded("official", path, observations.len(), None);
    Ok(observations)
}

/// Normalise official record batches to observations
///
/// Recognised layouts:
/// - quarterly rows with `year`, `qtr` and `month1_emplvl`..`month3_emplvl`,
///   unpivoted to one observation per month
/// - one value per row in `qcew_employment`, `employment` or `month1_emplvl`,
///   dated by `ref_date` (aligned to `day_of_month`) or by a `quarter` label
///
/// Establishments are read from `qcew_establishments`, `qtrly_estabs_count`
/// or `establishments`. Rows without a usable period are skipped.
pub fn official_from_batches(
    batches: &[RecordBatch],
    day_of_month: u32,
) -> Result<Vec<OfficialObservation>> {
    let mut observations = Vec::new();
    let mut skipped = 0usize;

    for batch in batches {
        let available = column_names(batch);
        let cells = extract_cells(batch)?;
        let establishments = match first_present(&available, &ESTABLISHMENT_COLUMNS) {
            Some(name) => extract_f64_column(batch, name, false)?,
            None => None,
        };
        let estab_at = |i: usize| establishments.as_ref().and_then(|v| v[i]);

        if QUARTERLY_COLUMNS
            .iter()
            .all(|c| available.iter().any(|a| a == c))
        {
            let years = extract_i64_column(batch, "year", true)?.unwrap_or_default();
            let qtrs = extract_i64_column(batch, "qtr", true)?.unwrap_or_default();
            let m1 = extract_f64_column(batch, "month1_emplvl", true)?.unwrap_or_default();
            let m2 = extract_f64_column(batch, "month2_emplvl", true)?.unwrap_or_default();
            let m3 = extract_f64_column(batch, "month3_emplvl", true)?.unwrap_or_default();

            for (i, cell) in cells.into_iter().enumerate() {
                let (Some(year), Some(qtr)) = (years[i], qtrs[i]) else {
                    skipped += 1;
                    continue;
                };
                let record = QcewQuarterRecord {
                    year: i32::try_from(year).unwrap_or_default(),
                    qtr: u32::try_from(qtr).unwrap_or_default(),
                    cell,
                    month1_emplvl: m1[i],
                    month2_emplvl: m2[i],
                    month3_emplvl: m3[i],
                    qtrly_estabs_count: estab_at(i),
                };
                let months = record.unpivot(day_of_month);
                if months.is_empty() {
                    skipped += 1;
                }
                observations.extend(months);
            }
            continue;
        }

        let employment = match first_present(&available, &EMPLOYMENT_COLUMNS) {
            Some(name) => extract_f64_column(batch, name, false)?,
            None => None,
        };
        if employment.is_none() && establishments.is_none() {
            return Err(PanelError::MissingColumns {
                table: "official".to_string(),
                missing: vec!["employment (qcew_employment, employment or month1_emplvl)".to_string()],
                available,
            });
        }

        let dates = extract_date_column(batch, "ref_date", false)?;
        let quarters = extract_string_column(batch, "quarter", false)?;
        if dates.is_none() && quarters.is_none() {
            return Err(PanelError::MissingColumns {
                table: "official".to_string(),
                missing: vec!["ref_date or quarter".to_string()],
                available,
            });
        }

        for (i, cell) in cells.into_iter().enumerate() {
            let ref_date = dates
                .as_ref()
                .and_then(|v| v[i])
                .map(|d| align_day_of_month(d, day_of_month));
            let quarter = ref_date.map(Quarter::from_date).or_else(|| {
                quarters
                    .as_ref()
                    .and_then(|v| v[i].as_deref())
                    .and_then(|label| label.parse::<Quarter>().ok())
            });
            if quarter.is_none() {
                skipped += 1;
                continue;
            }
            observations.push(OfficialObservation {
                ref_date,
                quarter,
                cell,
                employment: employment.as_ref().and_then(|v| v[i]),
                establishments: estab_at(i),
            });
        }
    }

    log_skipped_rows("official", skipped, "without a usable period");
    Ok(observations)
}

/// Load a CES-style supersector employment series (`ref_date` or `date`,
/// `supersector`, `employment`)
pub fn load_ces_series(path: &Path, day_of_month: u32) -> Result<Vec<OfficialObservation>> {
    let batches = read_parquet_path(path)?;
    let records = ces_from_batches(&batches)?;
    log_input_loaded("CES", path, records.len(), None);
    Ok(records
        .iter()
        .map(|record| record.to_observation(day_of_month))
        .collect())
}

/// Extract CES records, skipping rows with a null date, supersector or value
pub fn ces_from_batches(batches: &[RecordBatch]) -> Result<Vec<CesRecord>> {
    let mut records = Vec::new();
    for batch in batches {
        let available = column_names(batch);
        let date_column = first_present(&available, &["ref_date", "date"]).unwrap_or("ref_date");
        require_columns("CES", &available, &[date_column, "supersector", "employment"])?;

        let dates: Vec<Option<NaiveDate>> =
            extract_date_column(batch, date_column, true)?.unwrap_or_default();
        let sectors = extract_string_column(batch, "supersector", true)?.unwrap_or_default();
        let values = extract_f64_column(batch, "employment", true)?.unwrap_or_default();

        records.extend(
            dates
                .into_iter()
                .zip(sectors)
                .zip(values)
                .filter_map(|((date, supersector), employment)| {
                    Some(CesRecord {
                        date: date?,
                        supersector: supersector?,
                        employment: employment?,
                    })
                }),
        );
    }
    Ok(records)
}

/// Load a BED-style establishment birth table
pub fn load_bed_series(path: &Path) -> Result<Vec<BedObservation>> {
    let batches = read_parquet_path(path)?;
    let observations = bed_from_batches(&batches)?;
    log_input_loaded("BED", path, observations.len(), None);
    Ok(observations)
}

/// Normalise BED record batches; `year` and `quarter` are required
pub fn bed_from_batches(batches: &[RecordBatch]) -> Result<Vec<BedObservation>> {
    let mut observations = Vec::new();
    let mut skipped = 0usize;

    for batch in batches {
        require_columns("BED", &column_names(batch), &["year", "quarter"])?;
        let years = extract_i64_column(batch, "year", true)?.unwrap_or_default();
        let quarters = extract_i64_column(batch, "quarter", true)?.unwrap_or_default();
        let naics = extract_string_column(batch, "naics_code", false)?;
        let supersectors = extract_string_column(batch, "supersector", false)?;
        let sizes = extract_string_column(batch, "size_class", false)?;
        let states = extract_string_column(batch, "state_fips", false)?;
        let births = extract_f64_column(batch, "births", false)?;
        let deaths = extract_f64_column(batch, "deaths", false)?;
        let estabs = extract_f64_column(batch, "total_establishments", false)?;
        let rates = extract_f64_column(batch, "birth_rate", false)?;

        for i in 0..batch.num_rows() {
            let (Some(year), Some(quarter)) = (years[i], quarters[i]) else {
                skipped += 1;
                continue;
            };
            let record = BedRecord {
                year: i32::try_from(year).unwrap_or_default(),
                quarter: u32::try_from(quarter).unwrap_or_default(),
                naics_code: naics.as_ref().and_then(|v| v[i].clone()),
                supersector: supersectors.as_ref().and_then(|v| v[i].clone()),
                size_class: sizes.as_ref().and_then(|v| v[i].clone()),
                state_fips: states.as_ref().and_then(|v| v[i].clone()),
                births: births.as_ref().and_then(|v| v[i]),
                deaths: deaths.as_ref().and_then(|v| v[i]),
                total_establishments: estabs.as_ref().and_then(|v| v[i]),
                birth_rate: rates.as_ref().and_then(|v| v[i]),
            };
            match record.normalize() {
                Some(observation) => observations.push(observation),
                None => skipped += 1,
            }
        }
    }

    log_skipped_rows("BED", skipped, "with an invalid period");
    Ok(observations)
}
