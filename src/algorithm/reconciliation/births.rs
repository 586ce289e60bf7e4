//! Establishment birth rates of the panel against BED
//!
//! A panel birth rate counts confirmed births over birth-determinable records,
//! so records whose birth status is unknown drop out of both terms.

use chrono::NaiveDate;
use log::warn;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::algorithm::reconciliation::composition::shares;
use crate::algorithm::reconciliation::keyed_exactly;
use crate::models::cell::{CellKey, Dimension};
use crate::models::client_month::ClientMonth;
use crate::models::official::BedObservation;
use crate::models::panel::{AggregationLevel, PanelRow, level_rows};
use crate::models::period::Quarter;
use crate::utils::arrow::table::{self, ArrowTable};
use crate::utils::stats::safe_divisor;

/// Payroll birth rate of one panel row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BirthRateRow {
    pub ref_date: NaiveDate,
    pub quarter: String,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub birth_count: i64,
    pub birth_determinable_count: i64,
    /// `None` when no record is birth-determinable
    pub birth_rate: Option<f64>,
}

impl BirthRateRow {
    #[must_use]
    pub fn cell(&self) -> CellKey {
        CellKey {
            supersector: self.supersector.clone(),
            state_fips: self.state_fips.clone(),
            size_class: self.size_class.clone(),
        }
    }
}

impl ArrowTable for BirthRateRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![table::date("ref_date", false), table::utf8("quarter", false)];
        fields.extend(table::cell_fields());
        fields.extend([
            table::int64("birth_count", false),
            table::int64("birth_determinable_count", false),
            table::float64("birth_rate", true),
        ]);
        fields
    }
}

fn birth_rate(births: i64, determinable: i64) -> Option<f64> {
    (determinable > 0).then(|| births as f64 / determinable as f64)
}

/// Births over birth-determinable records for each row of one panel level
#[must_use]
pub fn compute_payroll_birth_rates(panel: &[PanelRow], level: AggregationLevel) -> Vec<BirthRateRow> {
    level_rows(panel, level)
        .into_iter()
        .map(|row| BirthRateRow {
            ref_date: row.ref_date,
            quarter: row.quarter.clone(),
            supersector: row.supersector.clone(),
            state_fips: row.state_fips.clone(),
            size_class: row.size_class.clone(),
            birth_count: row.birth_count,
            birth_determinable_count: row.birth_determinable_count,
            birth_rate: birth_rate(row.birth_count, row.birth_determinable_count),
        })
        .collect()
}

/// Quarterly payroll and BED birth rates for one cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BirthComparisonRow {
    pub quarter: String,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub payroll_births: i64,
    pub payroll_determinable: i64,
    pub payroll_birth_rate: Option<f64>,
    pub bed_births: Option<f64>,
    pub bed_birth_rate: Option<f64>,
    /// Payroll minus BED rate, with a missing BED rate counted as zero
    pub birth_rate_diff: Option<f64>,
    /// Payroll over BED rate, dividing by 1 when the BED rate is missing or zero
    pub birth_rate_ratio: Option<f64>,
}

impl ArrowTable for BirthComparisonRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![table::utf8("quarter", false)];
        fields.extend(table::cell_fields());
        fields.extend([
            table::int64("payroll_births", false),
            table::int64("payroll_determinable", false),
            table::float64("payroll_birth_rate", true),
            table::float64("bed_births", true),
            table::float64("bed_birth_rate", true),
            table::float64("birth_rate_diff", true),
            table::float64("birth_rate_ratio", true),
        ]);
        fields
    }
}

/// Left join quarterly payroll birth rates onto BED birth rates
///
/// Monthly payroll counts are summed to (quarter, cell) before the rate is
/// taken. Only BED rows keyed on exactly `dimensions` are used; the last row
/// wins when a key repeats.
#[must_use]
pub fn compare_birth_rates(
    payroll: &[BirthRateRow],
    bed: &[BedObservation],
    dimensions: &[Dimension],
) -> Vec<BirthComparisonRow> {
    let mut quarterly: BTreeMap<(Quarter, CellKey), (i64, i64)> = BTreeMap::new();
    for row in payroll {
        let cell = row.cell();
        if !keyed_exactly(&cell, dimensions) {
            continue;
        }
        let entry = quarterly
            .entry((Quarter::from_date(row.ref_date), cell))
            .or_default();
        entry.0 += row.birth_count;
        entry.1 += row.birth_determinable_count;
    }

    let mut bed_index: FxHashMap<(Quarter, &CellKey), &BedObservation> = FxHashMap::default();
    for obs in bed.iter().filter(|obs| keyed_exactly(&obs.cell, dimensions)) {
        if bed_index.insert((obs.quarter, &obs.cell), obs).is_some() {
            warn!("Repeated BED row for {} {:?}; keeping the last", obs.quarter, obs.cell);
        }
    }

    quarterly
        .into_iter()
        .map(|((quarter, cell), (births, determinable))| {
            let matched = bed_index.get(&(quarter, &cell));
            let bed_rate = matched.and_then(|obs| obs.birth_rate);
            let payroll_rate = birth_rate(births, determinable);
            BirthComparisonRow {
                quarter: quarter.to_string(),
                payroll_births: births,
                payroll_determinable: determinable,
                payroll_birth_rate: payroll_rate,
                bed_births: matched.and_then(|obs| obs.births),
                bed_birth_rate: bed_rate,
                birth_rate_diff: payroll_rate.map(|rate| rate - bed_rate.unwrap_or(0.0)),
                birth_rate_ratio: payroll_rate.map(|rate| rate / safe_divisor(bed_rate)),
                supersector: cell.supersector,
                state_fips: cell.state_fips,
                size_class: cell.size_class,
            }
        })
        .collect()
}

/// How far the birth-determinable subset's composition is from the full table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionGapRow {
    pub dimension: String,
    /// Half the summed absolute share differences; `None` without determinable records
    pub misallocation_index: Option<f64>,
    pub categories: i64,
}

impl ArrowTable for CompositionGapRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        vec![
            table::utf8("dimension", false),
            table::float64("misallocation_index", true),
            table::int64("categories", false),
        ]
    }
}

/// Compare record shares of the birth-determinable subset with the full table
///
/// One row per classification dimension; no rows for an empty table.
#[must_use]
pub fn compare_birth_determinable_composition(records: &[ClientMonth]) -> Vec<CompositionGapRow> {
    if records.is_empty() {
        return Vec::new();
    }

    Dimension::ALL
        .iter()
        .map(|&dimension| {
            let mut full: BTreeMap<String, f64> = BTreeMap::new();
            let mut determinable: BTreeMap<String, f64> = BTreeMap::new();
            for record in records {
                let category = record.key(dimension);
                *full.entry(category.to_string()).or_default() += 1.0;
                if record.birth.is_determinable() {
                    *determinable.entry(category.to_string()).or_default() += 1.0;
                }
            }

            let misallocation_index = (!determinable.is_empty()).then(|| {
                let full_shares = shares(&full);
                let subset_shares = shares(&determinable);
                full_shares
                    .iter()
                    .map(|(category, share)| {
                        let subset = subset_shares.get(category).copied().flatten();
                        (share.unwrap_or(0.0) - subset.unwrap_or(0.0)).abs()
                    })
                    .sum::<f64>()
                    / 2.0
            });

            CompositionGapRow {
                dimension: dimension.column().to_string(),
                misallocation_index,
                categories: full.len() as i64,
            }
        })
        .collect()
}
