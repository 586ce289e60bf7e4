//! Synthetic client-month panels
//!
//! Panels are generated from a fixed seed so invariant tests are reproducible.

use chrono::{Months, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::models::cell::{CellKey, Dimension};
use crate::models::client_month::{BirthStatus, ClientMonth, ClientMonthTable};
use crate::models::official::OfficialObservation;

const NAICS_CODES: [&str; 6] = ["236220", "445110", "541511", "622110", "722511", "311812"];
const STATES: [&str; 4] = ["06", "36", "48", "17"];

/// Reference date `offset` months after January 2019, on the 12th
#[must_use]
pub fn month(offset: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 1, 12)
        .and_then(|start| start.checked_add_months(Months::new(offset)))
        .unwrap_or_default()
}

/// Generate a consistent client-month panel
///
/// Every client has one record per month from its entry month to its exit
/// month. Clients that leave before the last month carry that exit month.
/// Employment follows a small random walk.
#[must_use]
pub fn synthetic_panel(seed: u64, clients: usize, months: u32) -> ClientMonthTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let months = months.max(1);
    let mut records = Vec::new();

    for client in 0..clients {
        let id = format!("client-{client:05}");
        let entry = rng.random_range(0..months);
        let last = rng.random_range(entry..months);
        let exit = (last + 1 < months).then(|| month(last));
        let birth = match rng.random_range(0..3) {
            0 => BirthStatus::Confirmed,
            1 => BirthStatus::Disconfirmed,
            _ => BirthStatus::Undeterminable,
        };
        let naics = NAICS_CODES[rng.random_range(0..NAICS_CODES.len())];
        let state = STATES[rng.random_range(0..STATES.len())];
        let mut employment: i64 = rng.random_range(0..300);

        for offset in entry..=last {
            records.push(ClientMonth::new(
                id.as_str(),
                month(offset),
                month(entry),
                exit,
                birth,
                naics,
                state,
                employment,
            ));
            if rng.random_bool(0.5) {
                employment += rng.random_range(0..10);
            } else {
                employment = (employment - rng.random_range(0..10)).max(0);
            }
        }
    }

    ClientMonthTable::new(records)
}

/// Monthly official totals that are the records' employment times `scale`
///
/// Gives a benchmark exactly consistent with the panel on `dimensions`.
#[must_use]
pub fn official_from_records(
    records: &[ClientMonth],
    dimensions: &[Dimension],
    scale: f64,
) -> Vec<OfficialObservation> {
    let mut totals: FxHashMap<(NaiveDate, CellKey), f64> = FxHashMap::default();
    for record in records {
        *totals
            .entry((record.ref_date, record.cell(dimensions)))
            .or_default() += record.employment as f64 * scale;
    }

    let mut observations: Vec<OfficialObservation> = totals
        .into_iter()
        .map(|((ref_date, cell), employment)| {
            OfficialObservation::monthly(ref_date, cell, employment)
        })
        .collect();
    observations.sort_by(|a, b| (a.ref_date, &a.cell).cmp(&(b.ref_date, &b.cell)));
    observations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_is_reproducible() {
        let a = synthetic_panel(7, 20, 6);
        let b = synthetic_panel(7, 20, 6);
        assert_eq!(a.records(), b.records());
        assert!(!a.is_empty());
    }

    #[test]
    fn records_respect_entry_and_exit() {
        let table = synthetic_panel(11, 50, 12);
        for record in table.records() {
            assert!(record.entry_month <= record.ref_date);
            if let Some(exit) = record.exit_month {
                assert!(record.ref_date <= exit);
            }
            assert!(record.employment >= 0);
        }
    }

    #[test]
    fn official_totals_match_records() {
        let table = synthetic_panel(3, 10, 3);
        let official = official_from_records(table.records(), &[], 2.0);
        let total: f64 = official.iter().filter_map(|o| o.employment).sum();
        let panel: i64 = table.records().iter().map(|r| r.employment).sum();
        assert!((total - 2.0 * panel as f64).abs() < 1e-6);
    }
}
