//! Client tenure and client entry and exit

use chrono::NaiveDate;
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::cell::{CellKey, Dimension};
use crate::models::client_month::ClientMonth;
use crate::models::period::{Quarter, days_between};
use crate::utils::arrow::table::{self, ArrowTable};
use crate::utils::stats::{self, safe_divisor};

/// Days per month used to turn an observation span into tenure months
pub const TENURE_DAYS_PER_MONTH: f64 = 30.0;

/// Observation history of one client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientTenureRow {
    pub client_id: String,
    pub first_observed: NaiveDate,
    pub last_observed: NaiveDate,
    pub months_observed: i64,
    pub tenure_months: i64,
    pub initial_emp: i64,
    pub final_emp: i64,
    pub avg_emp: f64,
    /// Birth flag of the first observation
    pub is_likely_birth: Option<bool>,
}

impl ArrowTable for ClientTenureRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        vec![
            table::utf8("client_id", false),
            table::date("first_observed", false),
            table::date("last_observed", false),
            table::int64("months_observed", false),
            table::int64("tenure_months", false),
            table::int64("initial_emp", false),
            table::int64("final_emp", false),
            table::float64("avg_emp", false),
            table::boolean("is_likely_birth", true),
        ]
    }
}

/// Tenure of every client, ordered by client id
///
/// Tenure is the span between first and last observation in days / 30,
/// rounded. Initial and final employment come from the earliest and latest
/// records.
#[must_use]
pub fn compute_client_tenure(records: &[ClientMonth]) -> Vec<ClientTenureRow> {
    let mut by_client: BTreeMap<&str, Vec<&ClientMonth>> = BTreeMap::new();
    for record in records {
        by_client.entry(&record.client_id).or_default().push(record);
    }

    by_client
        .into_iter()
        .filter_map(|(client_id, mut history)| {
            history.sort_by_key(|r| r.ref_date);
            let first = *history.first()?;
            let last = *history.last()?;
            let months_observed = history.iter().map(|r| r.ref_date).unique().count() as i64;
            let employment = history.iter().map(|r| r.employment as f64).collect_vec();
            let span = days_between(first.ref_date, last.ref_date) as f64;

            Some(ClientTenureRow {
                client_id: client_id.to_string(),
                first_observed: first.ref_date,
                last_observed: last.ref_date,
                months_observed,
                tenure_months: (span / TENURE_DAYS_PER_MONTH).round() as i64,
                initial_emp: first.employment,
                final_emp: last.employment,
                avg_emp: stats::mean(&employment).unwrap_or(0.0),
                is_likely_birth: first.birth.as_flag(),
            })
        })
        .collect()
}

/// Distribution of client tenure within one category of a dimension
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenureSummaryRow {
    pub dimension: String,
    pub category: String,
    pub mean_tenure: Option<f64>,
    pub median_tenure: Option<f64>,
    pub p25_tenure: Option<f64>,
    pub p75_tenure: Option<f64>,
    pub std_tenure: Option<f64>,
    pub client_count: i64,
}

impl ArrowTable for TenureSummaryRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        vec![
            table::utf8("dimension", false),
            table::utf8("category", false),
            table::float64("mean_tenure", true),
            table::float64("median_tenure", true),
            table::float64("p25_tenure", true),
            table::float64("p75_tenure", true),
            table::float64("std_tenure", true),
            table::int64("client_count", false),
        ]
    }
}

/// Summarise tenure per category, placing each client by its earliest record
#[must_use]
pub fn summarize_tenure(records: &[ClientMonth], dimension: Dimension) -> Vec<TenureSummaryRow> {
    let mut first_seen: FxHashMap<&str, &ClientMonth> = FxHashMap::default();
    for record in records {
        first_seen
            .entry(&record.client_id)
            .and_modify(|current| {
                if record.ref_date < current.ref_date {
                    *current = record;
                }
            })
            .or_insert(record);
    }

    let mut by_category: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for tenure in compute_client_tenure(records) {
        if let Some(record) = first_seen.get(tenure.client_id.as_str()) {
            by_category
                .entry(record.key(dimension).to_string())
                .or_default()
                .push(tenure.tenure_months as f64);
        }
    }

    by_category
        .into_iter()
        .map(|(category, mut tenures)| {
            tenures.sort_by(f64::total_cmp);
            TenureSummaryRow {
                dimension: dimension.column().to_string(),
                category,
                mean_tenure: stats::mean(&tenures),
                median_tenure: stats::median(&tenures),
                p25_tenure: stats::quantile_sorted(&tenures, 0.25),
                p75_tenure: stats::quantile_sorted(&tenures, 0.75),
                std_tenure: stats::sample_std(&tenures),
                client_count: tenures.len() as i64,
            }
        })
        .collect()
}

/// Client entries and exits of one (date, cell)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryExitRow {
    pub ref_date: NaiveDate,
    pub quarter: String,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub active_clients: i64,
    pub entries: i64,
    pub exits: i64,
    pub entry_rate: f64,
    pub exit_rate: f64,
    pub churn_rate: f64,
    pub net_client_change: i64,
}

impl ArrowTable for EntryExitRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![table::date("ref_date", false), table::utf8("quarter", false)];
        fields.extend(table::cell_fields());
        fields.extend([
            table::int64("active_clients", false),
            table::int64("entries", false),
            table::int64("exits", false),
            table::float64("entry_rate", false),
            table::float64("exit_rate", false),
            table::float64("churn_rate", false),
            table::int64("net_client_change", false),
        ]);
        fields
    }
}

#[derive(Default)]
struct EntryExitCounts<'a> {
    clients: FxHashSet<&'a str>,
    entries: i64,
    exits: i64,
}

/// Client entry and exit counts and rates per (date, cell)
///
/// Active clients are distinct client ids in the group. Rates divide by the
/// active client count, or by 1 when it is zero. Rows are ordered by date, then
/// cell.
#[must_use]
pub fn compute_client_entry_exit(
    records: &[ClientMonth],
    dimensions: &[Dimension],
) -> Vec<EntryExitRow> {
    let mut groups: BTreeMap<(NaiveDate, CellKey), EntryExitCounts<'_>> = BTreeMap::new();
    for record in records {
        let counts = groups
            .entry((record.ref_date, record.cell(dimensions)))
            .or_default();
        counts.clients.insert(&record.client_id);
        counts.entries += i64::from(record.is_entry());
        counts.exits += i64::from(record.is_exit());
    }

    groups
        .into_iter()
        .map(|((ref_date, cell), counts)| {
            let active = counts.clients.len() as i64;
            let denominator = safe_divisor(Some(active as f64));
            EntryExitRow {
                ref_date,
                quarter: Quarter::from_date(ref_date).to_string(),
                supersector: cell.supersector,
                state_fips: cell.state_fips,
                size_class: cell.size_class,
                active_clients: active,
                entries: counts.entries,
                exits: counts.exits,
                entry_rate: counts.entries as f64 / denominator,
                exit_rate: counts.exits as f64 / denominator,
                churn_rate: (counts.entries + counts.exits) as f64 / denominator,
                net_client_change: counts.entries - counts.exits,
            }
        })
        .collect()
}
