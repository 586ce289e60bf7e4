mod utils;

use std::collections::BTreeMap;

use payroll_panel::models::classification::SizeClass;
use payroll_panel::{AggregationLevel, build_panel, build_panel_levels, filter_stable_panel};
use utils::{SEEDS, employment_by_date, seeded_table};

#[test]
fn every_level_totals_the_records() {
    for seed in SEEDS {
        let table = seeded_table(seed);
        let expected = employment_by_date(table.records());

        for level in AggregationLevel::ALL {
            let rows = build_panel_levels(table.records(), &[level]);
            let mut totals: BTreeMap<_, i64> = BTreeMap::new();
            for row in &rows {
                assert_eq!(row.grouping_level, level.name());
                *totals.entry(row.ref_date).or_insert(0) += row.payroll_employment;
            }
            assert_eq!(totals, expected, "level {level} seed {seed}");
        }
    }
}

#[test]
fn levels_do_not_depend_on_each_other() {
    let table = seeded_table(3);
    let full = build_panel(table.records());
    for level in AggregationLevel::ALL {
        let alone = build_panel_levels(table.records(), &[level]);
        let from_full: Vec<_> = full.iter().filter(|r| r.is_level(level)).cloned().collect();
        assert_eq!(alone, from_full, "level {level}");
    }
}

#[test]
fn size_class_cross_tab_sums_to_supersector() {
    for seed in SEEDS {
        let table = seeded_table(seed);
        let panel = build_panel(table.records());

        let mut cross: BTreeMap<_, i64> = BTreeMap::new();
        let mut single: BTreeMap<_, i64> = BTreeMap::new();
        for row in &panel {
            let key = (row.ref_date, row.supersector.clone());
            if row.is_level(AggregationLevel::SupersectorSizeClass) {
                *cross.entry(key).or_insert(0) += row.payroll_employment;
            } else if row.is_level(AggregationLevel::Supersector) {
                *single.entry(key).or_insert(0) += row.payroll_employment;
            }
        }
        assert_eq!(cross, single, "seed {seed}");
    }
}

#[test]
fn panel_rows_are_internally_consistent() {
    let table = seeded_table(11);
    for row in build_panel(table.records()) {
        assert!(row.client_count >= 0);
        assert!(row.birth_count <= row.birth_determinable_count);
        assert!(row.continuing_employment <= row.payroll_employment);
        if let Some(size) = &row.size_class {
            assert!(size.parse::<SizeClass>().is_ok());
        }
    }
}

#[test]
fn stable_panel_keeps_whole_clients() {
    let table = seeded_table(42);
    let stable = filter_stable_panel(&table, 6);
    let mut per_client: BTreeMap<&str, usize> = BTreeMap::new();
    for record in table.records() {
        *per_client.entry(record.client_id.as_str()).or_insert(0) += 1;
    }
    let mut kept: BTreeMap<&str, usize> = BTreeMap::new();
    for record in stable.records() {
        *kept.entry(record.client_id.as_str()).or_insert(0) += 1;
    }
    for (client, count) in kept {
        assert_eq!(per_client[client], count, "client {client} partially kept");
        assert!(count >= 7);
    }
}
