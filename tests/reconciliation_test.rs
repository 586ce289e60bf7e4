mod utils;

use std::collections::BTreeMap;

use payroll_panel::algorithm::reconciliation::{
    Reliability, SeriesPoint, classify_reliability, compute_composition_shift_index,
    compute_coverage, compute_share_comparison, decompose_employment_change,
    decompose_growth_divergence,
};
use payroll_panel::utils::test::official_from_records;
use payroll_panel::{AggregationLevel, Dimension, ReliabilityThresholds, build_panel};
use utils::{SEEDS, assert_close, seeded_table, steady_client};

#[test]
fn shift_share_effects_add_up() {
    for seed in SEEDS {
        let payroll = seeded_table(seed);
        let benchmark = seeded_table(seed + 100);
        let panel = build_panel(payroll.records());

        for dimension in Dimension::ALL {
            let level = AggregationLevel::for_dimensions(&[dimension]).unwrap();
            let official = official_from_records(benchmark.records(), &[dimension], 1.0);
            let rows = decompose_growth_divergence(
                &SeriesPoint::from_panel(&panel, level),
                &SeriesPoint::from_official(&official, &[dimension]),
                Some(dimension),
            );
            assert!(!rows.is_empty(), "seed {seed} {dimension}");
            for row in rows {
                assert_close(
                    row.total_divergence,
                    row.composition_effect + row.within_cell_effect,
                    1e-9,
                );
            }
        }
    }
}

#[test]
fn identical_sources_have_no_divergence() {
    let table = seeded_table(5);
    let panel = build_panel(table.records());
    let official = official_from_records(table.records(), &[Dimension::Supersector], 1.0);
    let rows = decompose_growth_divergence(
        &SeriesPoint::from_panel(&panel, AggregationLevel::Supersector),
        &SeriesPoint::from_official(&official, &[Dimension::Supersector]),
        Some(Dimension::Supersector),
    );
    for row in rows {
        assert_close(row.total_divergence, 0.0, 1e-12);
        assert_close(row.composition_effect, 0.0, 1e-12);
    }
}

#[test]
fn employment_change_parts_add_up() {
    for seed in SEEDS {
        let table = seeded_table(seed);
        for dims in [&[][..], &[Dimension::Supersector][..], &[Dimension::Geography][..]] {
            for row in decompose_employment_change(table.records(), dims) {
                assert_eq!(
                    row.total_change,
                    row.within_change + row.entry_contribution - row.exit_contribution,
                    "seed {seed} at {}",
                    row.ref_date
                );
            }
        }
    }
}

#[test]
fn shares_sum_to_one_per_period() {
    for seed in SEEDS {
        let table = seeded_table(seed);
        let panel = build_panel(table.records());
        for dimension in Dimension::ALL {
            let benchmark_table = seeded_table(seed + 1);
            let official = official_from_records(benchmark_table.records(), &[dimension], 1.0);
            let rows = compute_share_comparison(&panel, &official, dimension);

            let mut payroll: BTreeMap<_, f64> = BTreeMap::new();
            let mut benchmark: BTreeMap<_, f64> = BTreeMap::new();
            for row in &rows {
                if let Some(share) = row.payroll_share {
                    *payroll.entry(row.ref_date).or_insert(0.0) += share;
                }
                if let Some(share) = row.official_share {
                    *benchmark.entry(row.ref_date).or_insert(0.0) += share;
                }
            }
            for total in payroll.values().chain(benchmark.values()) {
                assert_close(*total, 1.0, 1e-9);
            }
        }
    }
}

#[test]
fn csi_is_bounded() {
    for seed in SEEDS {
        let panel = build_panel(seeded_table(seed).records());
        for dimension in Dimension::ALL {
            for row in compute_composition_shift_index(&panel, dimension) {
                if let Some(csi) = row.csi {
                    assert!((0.0..=2.0 + 1e-12).contains(&csi), "csi {csi}");
                }
            }
        }
    }
}

#[test]
fn csi_detects_composition_change() {
    let mut records = steady_client("a", "236220", 40, 4);
    records.extend(steady_client("b", "722511", 60, 4));
    let panel = build_panel(&records);
    let rows = compute_composition_shift_index(&panel, Dimension::Supersector);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].csi, None);
    for row in &rows[1..] {
        assert_close(row.csi.unwrap(), 0.0, 1e-12);
    }

    records.extend(steady_client("c", "722511", 100, 4).into_iter().skip(3));
    let panel = build_panel(&records);
    let rows = compute_composition_shift_index(&panel, Dimension::Supersector);
    assert!(rows[3].csi.unwrap() > 0.0);
}

#[test]
fn reliability_is_total() {
    let thresholds = ReliabilityThresholds::default();
    for clients in [0, 1, 29, 30, 31, 1000] {
        for coverage in [0.0, 0.001, 0.005, 0.1, 1.0, 50.0, f64::NAN] {
            let label = classify_reliability(clients, coverage, &thresholds);
            assert!(matches!(
                label,
                Reliability::Reliable | Reliability::Marginal | Reliability::Insufficient
            ));
        }
    }
}

#[test]
fn coverage_of_exact_benchmark_is_one() {
    let table = seeded_table(8);
    let panel = build_panel(table.records());
    let official = official_from_records(table.records(), &[Dimension::Supersector], 1.0);
    let rows = compute_coverage(&panel, &official, &[Dimension::Supersector]);
    assert!(!rows.is_empty());
    for row in rows {
        if row.payroll_employment > 0 {
            assert_close(row.coverage_ratio_employment, 1.0, 1e-12);
        }
    }
}
