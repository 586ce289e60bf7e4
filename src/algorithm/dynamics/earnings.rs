//! Earnings distribution of positive gross pay

use chrono::NaiveDate;
use itertools::Itertools;
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::cell::{CellKey, Dimension};
use crate::models::client_month::ClientMonthTable;
use crate::models::period::Quarter;
use crate::utils::arrow::table::{self, ArrowTable};
use crate::utils::stats;

/// Earnings statistics of one (date, cell)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarningsRow {
    pub ref_date: NaiveDate,
    pub quarter: String,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub records: i64,
    pub mean_earnings: f64,
    pub median_earnings: f64,
    pub p10_earnings: f64,
    pub p25_earnings: f64,
    pub p75_earnings: f64,
    pub p90_earnings: f64,
    pub std_earnings: Option<f64>,
    pub cv_earnings: Option<f64>,
}

impl EarningsRow {
    fn cell(&self) -> CellKey {
        CellKey {
            supersector: self.supersector.clone(),
            state_fips: self.state_fips.clone(),
            size_class: self.size_class.clone(),
        }
    }
}

impl ArrowTable for EarningsRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![table::date("ref_date", false), table::utf8("quarter", false)];
        fields.extend(table::cell_fields());
        fields.extend([
            table::int64("records", false),
            table::float64("mean_earnings", false),
            table::float64("median_earnings", false),
            table::float64("p10_earnings", false),
            table::float64("p25_earnings", false),
            table::float64("p75_earnings", false),
            table::float64("p90_earnings", false),
            table::float64("std_earnings", true),
            table::float64("cv_earnings", true),
        ]);
        fields
    }
}

/// Distribution of positive gross pay per (date, cell), ordered by date then cell
///
/// Quantiles use the nearest rank. A group with one record has no standard
/// deviation. Returns no rows when the table carries no earnings.
#[must_use]
pub fn compute_earnings_distribution(
    table: &ClientMonthTable,
    dimensions: &[Dimension],
) -> Vec<EarningsRow> {
    if !table.capabilities().has_earnings {
        warn!("No gross pay in the payroll input; skipping earnings distribution");
        return Vec::new();
    }

    let mut groups: BTreeMap<(NaiveDate, CellKey), Vec<f64>> = BTreeMap::new();
    for record in table.records() {
        if let Some(pay) = record.gross_pay.filter(|pay| *pay > 0.0) {
            groups
                .entry((record.ref_date, record.cell(dimensions)))
                .or_default()
                .push(pay);
        }
    }

    groups
        .into_iter()
        .filter_map(|((ref_date, cell), mut pay)| {
            pay.sort_by(f64::total_cmp);
            let mean = stats::mean(&pay)?;
            let std = stats::sample_std(&pay);
            Some(EarningsRow {
                ref_date,
                quarter: Quarter::from_date(ref_date).to_string(),
                records: pay.len() as i64,
                mean_earnings: mean,
                median_earnings: stats::median(&pay)?,
                p10_earnings: stats::quantile_sorted(&pay, 0.10)?,
                p25_earnings: stats::quantile_sorted(&pay, 0.25)?,
                p75_earnings: stats::quantile_sorted(&pay, 0.75)?,
                p90_earnings: stats::quantile_sorted(&pay, 0.90)?,
                std_earnings: std,
                cv_earnings: std.map(|s| s / mean),
                supersector: cell.supersector,
                state_fips: cell.state_fips,
                size_class: cell.size_class,
            })
        })
        .collect()
}

/// Mean and median earnings with year-over-year growth
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarningsGrowthRow {
    pub ref_date: NaiveDate,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub mean_earnings: f64,
    pub median_earnings: f64,
    pub mean_earnings_yoy: Option<f64>,
    pub median_earnings_yoy: Option<f64>,
}

impl ArrowTable for EarningsGrowthRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![table::date("ref_date", false)];
        fields.extend(table::cell_fields());
        fields.extend([
            table::float64("mean_earnings", false),
            table::float64("median_earnings", false),
            table::float64("mean_earnings_yoy", true),
            table::float64("median_earnings_yoy", true),
        ]);
        fields
    }
}

/// Twelve-row year-over-year growth of mean and median earnings per cell
///
/// Rows are ordered by cell, then date.
#[must_use]
pub fn compute_earnings_growth(
    table: &ClientMonthTable,
    dimensions: &[Dimension],
) -> Vec<EarningsGrowthRow> {
    let distribution = compute_earnings_distribution(table, dimensions);
    let groups = distribution.into_iter().into_group_map_by(EarningsRow::cell);

    let mut rows = Vec::new();
    for (_, mut group) in groups.into_iter().sorted_by(|a, b| a.0.cmp(&b.0)) {
        group.sort_by_key(|r| r.ref_date);
        let means = group.iter().map(|r| r.mean_earnings).collect_vec();
        let medians = group.iter().map(|r| r.median_earnings).collect_vec();
        let mean_yoy = stats::lagged_pct_change(&means, 12);
        let median_yoy = stats::lagged_pct_change(&medians, 12);

        for ((row, mean_earnings_yoy), median_earnings_yoy) in
            group.into_iter().zip(mean_yoy).zip(median_yoy)
        {
            rows.push(EarningsGrowthRow {
                ref_date: row.ref_date,
                supersector: row.supersector,
                state_fips: row.state_fips,
                size_class: row.size_class,
                mean_earnings: row.mean_earnings,
                median_earnings: row.median_earnings,
                mean_earnings_yoy,
                median_earnings_yoy,
            });
        }
    }
    rows
}
