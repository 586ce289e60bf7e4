//! Coverage of the panel against official employment and establishments

use chrono::NaiveDate;
use log::debug;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;

use crate::algorithm::reconciliation::{keyed_exactly, official_at};
use crate::config::ReliabilityThresholds;
use crate::models::cell::{CellKey, Dimension};
use crate::models::official::OfficialObservation;
use crate::models::panel::PanelRow;
use crate::models::period::Quarter;
use crate::utils::arrow::table::{self, ArrowTable};
use crate::utils::stats::safe_divisor;

/// Reliability label of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reliability {
    /// Both thresholds met
    Reliable,
    /// Exactly one threshold met
    Marginal,
    /// Neither threshold met
    Insufficient,
}

impl Reliability {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Reliable => "reliable",
            Self::Marginal => "marginal",
            Self::Insufficient => "insufficient",
        }
    }
}

impl fmt::Display for Reliability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a cell from its client count and coverage ratio
///
/// A NaN coverage ratio never meets the coverage threshold.
#[must_use]
pub fn classify_reliability(
    client_count: i64,
    coverage_ratio: f64,
    thresholds: &ReliabilityThresholds,
) -> Reliability {
    let enough_clients = client_count >= thresholds.min_clients;
    let enough_coverage = coverage_ratio >= thresholds.min_coverage;
    match (enough_clients, enough_coverage) {
        (true, true) => Reliability::Reliable,
        (false, false) => Reliability::Insufficient,
        _ => Reliability::Marginal,
    }
}

/// Panel measures next to the official benchmark for one (date, cell)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRow {
    pub ref_date: NaiveDate,
    pub quarter: String,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub payroll_employment: i64,
    pub qcew_employment: Option<f64>,
    pub coverage_ratio_employment: f64,
    pub payroll_clients: i64,
    pub qcew_establishments: Option<f64>,
    pub coverage_ratio_estab: f64,
    pub reliability: Option<String>,
}

impl CoverageRow {
    #[must_use]
    pub fn cell(&self) -> CellKey {
        CellKey {
            supersector: self.supersector.clone(),
            state_fips: self.state_fips.clone(),
            size_class: self.size_class.clone(),
        }
    }
}

impl ArrowTable for CoverageRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![table::date("ref_date", false), table::utf8("quarter", false)];
        fields.extend(table::cell_fields());
        fields.extend([
            table::int64("payroll_employment", false),
            table::float64("qcew_employment", true),
            table::float64("coverage_ratio_employment", false),
            table::int64("payroll_clients", false),
            table::float64("qcew_establishments", true),
            table::float64("coverage_ratio_estab", false),
            table::utf8("reliability", true),
        ]);
        fields
    }
}

#[derive(Default, Clone, Copy)]
struct OfficialTotals {
    employment: Option<f64>,
    establishments: Option<f64>,
}

impl OfficialTotals {
    fn add(&mut self, obs: &OfficialObservation) {
        self.employment = add_optional(self.employment, obs.employment);
        self.establishments = add_optional(self.establishments, obs.establishments);
    }
}

fn add_optional(acc: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (acc, value) {
        (Some(a), Some(v)) => Some(a + v),
        (None, v) => v,
        (a, None) => a,
    }
}

/// Left join panel rows onto official totals and compute coverage ratios
///
/// Only panel rows and official observations keyed on exactly `dimensions`
/// take part. Monthly observations match on reference date, quarterly-only
/// observations on quarter. Duplicate official rows for a key are summed.
/// A missing or zero official denominator is replaced by 1, so the ratio
/// reports the raw panel value for cells without a benchmark.
#[must_use]
pub fn compute_coverage(
    panel: &[PanelRow],
    official: &[OfficialObservation],
    dimensions: &[Dimension],
) -> Vec<CoverageRow> {
    let mut monthly: FxHashMap<(NaiveDate, CellKey), OfficialTotals> = FxHashMap::default();
    let mut quarterly: FxHashMap<(Quarter, CellKey), OfficialTotals> = FxHashMap::default();
    for obs in official_at(official, dimensions) {
        match (obs.ref_date, obs.quarter) {
            (Some(ref_date), _) => monthly
                .entry((ref_date, obs.cell.clone()))
                .or_default()
                .add(obs),
            (None, Some(quarter)) => quarterly
                .entry((quarter, obs.cell.clone()))
                .or_default()
                .add(obs),
            (None, None) => {}
        }
    }

    let rows: Vec<CoverageRow> = panel
        .iter()
        .filter(|row| keyed_exactly(&row.cell(), dimensions))
        .map(|row| {
            let cell = row.cell();
            let totals = monthly
                .get(&(row.ref_date, cell.clone()))
                .or_else(|| {
                    let quarter = Quarter::from_date(row.ref_date);
                    quarterly.get(&(quarter, cell))
                })
                .copied()
                .unwrap_or_default();

            CoverageRow {
                ref_date: row.ref_date,
                quarter: row.quarter.clone(),
                supersector: row.supersector.clone(),
                state_fips: row.state_fips.clone(),
                size_class: row.size_class.clone(),
                payroll_employment: row.payroll_employment,
                qcew_employment: totals.employment,
                coverage_ratio_employment: row.payroll_employment as f64
                    / safe_divisor(totals.employment),
                payroll_clients: row.client_count,
                qcew_establishments: totals.establishments,
                coverage_ratio_estab: row.client_count as f64
                    / safe_divisor(totals.establishments),
                reliability: None,
            }
        })
        .collect();

    debug!(
        "Coverage over {:?}: {} rows, {} with an official benchmark",
        dimensions,
        rows.len(),
        rows.iter().filter(|r| r.qcew_employment.is_some()).count()
    );
    rows
}

/// Attach a reliability label to every coverage row
#[must_use]
pub fn compute_cell_reliability(
    mut rows: Vec<CoverageRow>,
    thresholds: &ReliabilityThresholds,
) -> Vec<CoverageRow> {
    for row in &mut rows {
        let label = classify_reliability(
            row.payroll_clients,
            row.coverage_ratio_employment,
            thresholds,
        );
        row.reliability = Some(label.label().to_string());
    }
    rows
}
