#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::PathBuf;

use payroll_panel::models::client_month::{BirthStatus, ClientMonth, ClientMonthTable};
use payroll_panel::utils::test::{month, synthetic_panel};

/// Seeds used by the invariant tests
pub const SEEDS: [u64; 4] = [1, 7, 42, 2024];

/// A seeded synthetic panel of moderate size
#[must_use]
pub fn seeded_table(seed: u64) -> ClientMonthTable {
    synthetic_panel(seed, 120, 15)
}

/// Temporary directory that lives as long as the returned guard
pub fn temp_dir() -> anyhow::Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().to_path_buf();
    Ok((dir, path))
}

/// Sum of employment per reference date
#[must_use]
pub fn employment_by_date(records: &[ClientMonth]) -> BTreeMap<NaiveDate, i64> {
    let mut totals = BTreeMap::new();
    for record in records {
        *totals.entry(record.ref_date).or_insert(0) += record.employment;
    }
    totals
}

/// One record for a client observed in every one of `months` months
#[must_use]
pub fn steady_client(id: &str, naics: &str, employment: i64, months: u32) -> Vec<ClientMonth> {
    (0..months)
        .map(|i| {
            ClientMonth::new(
                id,
                month(i),
                month(0),
                None,
                BirthStatus::Undeterminable,
                naics,
                "06",
                employment,
            )
        })
        .collect()
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} +/- {tolerance}, got {actual}"
    );
}
