//! Stable (long-tenure) panel selection

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::models::client_month::ClientMonthTable;
use crate::models::period::days_between;

/// Days per month used to express tenure in months
const DAYS_PER_MONTH: f64 = 30.0;

/// Keep every record of clients observed for at least `min_tenure_months`
///
/// Tenure is the span between a client's first and last reference date, in
/// days divided by 30.
#[must_use]
pub fn filter_stable_panel(table: &ClientMonthTable, min_tenure_months: i64) -> ClientMonthTable {
    let mut spans: FxHashMap<&str, (NaiveDate, NaiveDate)> = FxHashMap::default();
    for record in table.records() {
        spans
            .entry(record.client_id.as_str())
            .and_modify(|(first, last)| {
                *first = (*first).min(record.ref_date);
                *last = (*last).max(record.ref_date);
            })
            .or_insert((record.ref_date, record.ref_date));
    }

    let threshold = min_tenure_months as f64;
    let stable: FxHashMap<&str, bool> = spans
        .into_iter()
        .map(|(id, (first, last))| {
            (id, days_between(first, last) as f64 / DAYS_PER_MONTH >= threshold)
        })
        .collect();

    let filtered = table.filter(|r| stable.get(r.client_id.as_str()).copied().unwrap_or(false));
    log::info!(
        "Stable panel: {} of {} records from clients with >= {min_tenure_months} months tenure",
        filtered.len(),
        table.len()
    );
    filtered
}
