//! Multi-level panel builder
//!
//! Each aggregation level is computed directly from the client-month records,
//! never from another level, so any subset of levels can be rebuilt alone.
//! Levels run in parallel on the rayon pool and are concatenated in the order
//! requested.

use chrono::NaiveDate;
use log::debug;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::models::cell::CellKey;
use crate::models::client_month::ClientMonth;
use crate::models::panel::{AggregationLevel, PanelRow};
use crate::models::period::Quarter;

type GroupKey<'a> = (NaiveDate, SmallVec<[&'a str; 2]>);

#[derive(Default)]
struct LevelAccumulator<'a> {
    employment: i64,
    active_clients: FxHashSet<&'a str>,
    births: i64,
    determinable: i64,
    entries: i64,
    exits: i64,
    continuing_employment: i64,
}

impl<'a> LevelAccumulator<'a> {
    fn add(&mut self, record: &'a ClientMonth) {
        self.employment += record.employment;
        if record.employment > 0 {
            self.active_clients.insert(&record.client_id);
        }
        if record.birth.is_birth() {
            self.births += 1;
        }
        if record.birth.is_determinable() {
            self.determinable += 1;
        }
        if record.is_entry() {
            self.entries += 1;
        }
        if record.is_exit() {
            self.exits += 1;
        }
        if record.is_continuing() {
            self.continuing_employment += record.employment;
        }
    }
}

/// Build all six panel levels
#[must_use]
pub fn build_panel(records: &[ClientMonth]) -> Vec<PanelRow> {
    build_panel_levels(records, &AggregationLevel::ALL)
}

/// Build the requested panel levels, stacked in the order given
///
/// Within a level rows are sorted by reference date, then by cell. An empty
/// input gives an empty panel.
#[must_use]
pub fn build_panel_levels(records: &[ClientMonth], levels: &[AggregationLevel]) -> Vec<PanelRow> {
    let per_level: Vec<Vec<PanelRow>> = levels
        .par_iter()
        .map(|level| aggregate_level(records, *level))
        .collect();

    per_level.into_iter().flatten().collect()
}

fn aggregate_level(records: &[ClientMonth], level: AggregationLevel) -> Vec<PanelRow> {
    let dimensions = level.dimensions();
    let mut groups: FxHashMap<GroupKey<'_>, LevelAccumulator<'_>> = FxHashMap::default();

    for record in records {
        let keys = dimensions.iter().map(|d| record.key(*d)).collect();
        groups.entry((record.ref_date, keys)).or_default().add(record);
    }

    let mut rows: Vec<(NaiveDate, CellKey, LevelAccumulator<'_>)> = groups
        .into_iter()
        .map(|((ref_date, keys), acc)| {
            let mut cell = CellKey::national();
            for (dimension, value) in dimensions.iter().zip(keys) {
                cell.set(*dimension, Some(value.to_string()));
            }
            (ref_date, cell, acc)
        })
        .collect();
    rows.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

    debug!("Panel level {level}: {} rows", rows.len());

    rows.into_iter()
        .map(|(ref_date, cell, acc)| PanelRow {
            grouping_level: level.name().to_string(),
            ref_date,
            quarter: Quarter::from_date(ref_date).to_string(),
            supersector: cell.supersector,
            state_fips: cell.state_fips,
            size_class: cell.size_class,
            payroll_employment: acc.employment,
            client_count: acc.active_clients.len() as i64,
            birth_count: acc.births,
            birth_determinable_count: acc.determinable,
            entry_count: acc.entries,
            exit_count: acc.exits,
            continuing_employment: acc.continuing_employment,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::client_month::BirthStatus;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(id: &str, month: u32, entry: u32, exit: Option<u32>, emp: i64) -> ClientMonth {
        ClientMonth::new(
            id,
            date(2020, month, 12),
            date(2020, entry, 12),
            exit.map(|m| date(2020, m, 12)),
            BirthStatus::Undeterminable,
            "236220",
            "06",
            emp,
        )
    }

    #[test]
    fn two_entering_clients() {
        let records = vec![record("a", 1, 1, None, 10), record("b", 1, 1, None, 5)];
        let panel = build_panel_levels(&records, &[AggregationLevel::National]);
        assert_eq!(panel.len(), 1);
        let row = &panel[0];
        assert_eq!(row.grouping_level, "national");
        assert_eq!(row.quarter, "2020Q1");
        assert_eq!(row.payroll_employment, 15);
        assert_eq!(row.entry_count, 2);
        assert_eq!(row.exit_count, 0);
        assert_eq!(row.continuing_employment, 0);
        assert_eq!(row.client_count, 2);
        assert!(row.supersector.is_none() && row.state_fips.is_none() && row.size_class.is_none());
    }

    #[test]
    fn birth_counts_ignore_undeterminable() {
        let mut records = vec![
            record("a", 1, 1, None, 3),
            record("b", 1, 1, None, 3),
            record("c", 1, 1, None, 3),
        ];
        records[0].birth = BirthStatus::Confirmed;
        records[1].birth = BirthStatus::Disconfirmed;

        let panel = build_panel_levels(&records, &[AggregationLevel::National]);
        assert_eq!(panel[0].birth_count, 1);
        assert_eq!(panel[0].birth_determinable_count, 2);
    }

    #[test]
    fn exits_and_continuing_employment() {
        let records = vec![
            record("a", 3, 1, Some(3), 4),
            record("b", 3, 1, None, 6),
            record("c", 3, 3, None, 2),
            record("d", 3, 1, Some(6), 0),
        ];
        let panel = build_panel_levels(&records, &[AggregationLevel::National]);
        let row = &panel[0];
        assert_eq!(row.exit_count, 1);
        assert_eq!(row.entry_count, 1);
        assert_eq!(row.continuing_employment, 6);
        assert_eq!(row.client_count, 3);
    }

    #[test]
    fn levels_stack_in_fixed_order() {
        let records = vec![record("a", 1, 1, None, 10), record("b", 2, 1, None, 50)];
        let panel = build_panel(&records);
        let levels: Vec<&str> = panel.iter().map(|r| r.grouping_level.as_str()).collect();
        assert_eq!(levels.first(), Some(&"national"));
        assert_eq!(levels.last(), Some(&"supersector_size_class"));
        let size_rows: Vec<_> = panel
            .iter()
            .filter(|r| r.is_level(AggregationLevel::SizeClass))
            .collect();
        assert_eq!(size_rows.len(), 2);
        assert_eq!(size_rows[0].size_class.as_deref(), Some("10-19"));
        assert_eq!(size_rows[1].size_class.as_deref(), Some("50-99"));
    }

    #[test]
    fn empty_input_gives_empty_panel() {
        assert!(build_panel(&[]).is_empty());
    }
}
