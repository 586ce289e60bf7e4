//! Employment by client vintage
//!
//! A client's vintage is the calendar year of its first observed reference
//! date. A period whose newest vintage holds a large share of employment is
//! flagged as contaminated by recent panel entrants.

use chrono::{Datelike, NaiveDate};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::cell::{CellKey, Dimension};
use crate::models::client_month::ClientMonth;
use crate::utils::arrow::table::{self, ArrowTable};

/// Employment of one vintage in one (date, cell)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VintageRow {
    pub ref_date: NaiveDate,
    pub vintage_year: i32,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub employment: i64,
    pub client_count: i64,
}

impl ArrowTable for VintageRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![
            table::date("ref_date", false),
            arrow::datatypes::Field::new("vintage_year", arrow::datatypes::DataType::Int32, false),
        ];
        fields.extend(table::cell_fields());
        fields.extend([
            table::int64("employment", false),
            table::int64("client_count", false),
        ]);
        fields
    }
}

/// Year each client was first observed
fn client_vintages(records: &[ClientMonth]) -> FxHashMap<&str, i32> {
    let mut first: FxHashMap<&str, NaiveDate> = FxHashMap::default();
    for record in records {
        first
            .entry(&record.client_id)
            .and_modify(|date| *date = (*date).min(record.ref_date))
            .or_insert(record.ref_date);
    }
    first
        .into_iter()
        .map(|(client, date)| (client, date.year()))
        .collect()
}

/// Employment and client counts by (date, vintage, cell)
#[must_use]
pub fn compute_vintage_analysis(records: &[ClientMonth], dimensions: &[Dimension]) -> Vec<VintageRow> {
    let vintages = client_vintages(records);

    let mut groups: BTreeMap<(NaiveDate, i32, CellKey), (i64, FxHashSet<&str>)> = BTreeMap::new();
    for record in records {
        let Some(&vintage) = vintages.get(record.client_id.as_str()) else {
            continue;
        };
        let (employment, clients) = groups
            .entry((record.ref_date, vintage, record.cell(dimensions)))
            .or_default();
        *employment += record.employment;
        clients.insert(&record.client_id);
    }

    groups
        .into_iter()
        .map(|((ref_date, vintage_year, cell), (employment, clients))| VintageRow {
            ref_date,
            vintage_year,
            supersector: cell.supersector,
            state_fips: cell.state_fips,
            size_class: cell.size_class,
            employment,
            client_count: clients.len() as i64,
        })
        .collect()
}

/// Share of national employment held by one vintage in one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VintageShareRow {
    pub ref_date: NaiveDate,
    pub vintage_year: i32,
    pub employment: i64,
    pub employment_share: Option<f64>,
    /// Newest vintage of the period with a share above the threshold
    pub is_contaminated: bool,
}

impl ArrowTable for VintageShareRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        vec![
            table::date("ref_date", false),
            arrow::datatypes::Field::new("vintage_year", arrow::datatypes::DataType::Int32, false),
            table::int64("employment", false),
            table::float64("employment_share", true),
            table::boolean("is_contaminated", false),
        ]
    }
}

/// National employment share per vintage and period
///
/// The share is `None` for a period with zero employment.
#[must_use]
pub fn compute_vintage_shares(records: &[ClientMonth], contamination_share: f64) -> Vec<VintageShareRow> {
    let vintage = compute_vintage_analysis(records, &[]);

    let mut totals: FxHashMap<NaiveDate, i64> = FxHashMap::default();
    let mut latest: FxHashMap<NaiveDate, i32> = FxHashMap::default();
    for row in &vintage {
        *totals.entry(row.ref_date).or_default() += row.employment;
        latest
            .entry(row.ref_date)
            .and_modify(|year| *year = (*year).max(row.vintage_year))
            .or_insert(row.vintage_year);
    }

    vintage
        .into_iter()
        .map(|row| {
            let total = totals.get(&row.ref_date).copied().unwrap_or(0);
            let employment_share = (total != 0).then(|| row.employment as f64 / total as f64);
            let is_latest = latest.get(&row.ref_date) == Some(&row.vintage_year);
            VintageShareRow {
                ref_date: row.ref_date,
                vintage_year: row.vintage_year,
                employment: row.employment,
                employment_share,
                is_contaminated: is_latest
                    && employment_share.is_some_and(|share| share > contamination_share),
            }
        })
        .collect()
}
