//! Growth rates of employment series and their comparison
//!
//! Series are grouped by an arbitrary set of classification keys and sorted
//! by date within each group. Month-over-month growth compares a row with the
//! previous row of its group; year-over-year growth with the row twelve
//! positions back.

use chrono::NaiveDate;
use itertools::Itertools;
use log::debug;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::algorithm::reconciliation::official_at;
use crate::models::cell::{CellKey, Dimension, Dimensions};
use crate::models::client_month::ClientMonth;
use crate::models::official::OfficialObservation;
use crate::models::panel::{AggregationLevel, PanelRow, level_rows};
use crate::models::period::{Quarter, days_between};
use crate::utils::arrow::table::{self, ArrowTable};
use crate::utils::stats;

/// Rows back for year-over-year growth
pub const YOY_LAG: usize = 12;

/// Window of the rolling correlation between two growth series
pub const CORRELATION_WINDOW: usize = 12;

/// Average days per month used for lead/lag in months
pub const DAYS_PER_MONTH: f64 = 30.4375;

/// One value of an employment series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub ref_date: NaiveDate,
    pub cell: CellKey,
    pub value: f64,
}

impl SeriesPoint {
    #[must_use]
    pub const fn new(ref_date: NaiveDate, cell: CellKey, value: f64) -> Self {
        Self {
            ref_date,
            cell,
            value,
        }
    }

    /// Payroll employment of one panel level
    #[must_use]
    pub fn from_panel(panel: &[PanelRow], level: AggregationLevel) -> Vec<Self> {
        level_rows(panel, level)
            .into_iter()
            .map(|row| Self::new(row.ref_date, row.cell(), row.payroll_employment as f64))
            .collect()
    }

    /// Monthly official employment keyed on exactly `dimensions`
    #[must_use]
    pub fn from_official(official: &[OfficialObservation], dimensions: &[Dimension]) -> Vec<Self> {
        official_at(official, dimensions)
            .filter_map(|obs| Some(Self::new(obs.ref_date?, obs.cell.clone(), obs.employment?)))
            .collect()
    }

    /// Employment of client-month records, optionally multiplied by per-record weights
    ///
    /// `weights` is parallel to `records`; records past its end keep weight 1.
    #[must_use]
    pub fn from_records(
        records: &[ClientMonth],
        weights: Option<&[f64]>,
        dimensions: &[Dimension],
    ) -> Vec<Self> {
        records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let weight = weights.and_then(|w| w.get(i)).copied().unwrap_or(1.0);
                Self::new(
                    record.ref_date,
                    record.cell(dimensions),
                    record.employment as f64 * weight,
                )
            })
            .collect()
    }
}

/// Growth rates of one (date, cell)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthRow {
    pub ref_date: NaiveDate,
    pub quarter: String,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub employment: f64,
    pub mom_growth: Option<f64>,
    pub yoy_growth: Option<f64>,
}

impl GrowthRow {
    #[must_use]
    pub fn cell(&self) -> CellKey {
        CellKey {
            supersector: self.supersector.clone(),
            state_fips: self.state_fips.clone(),
            size_class: self.size_class.clone(),
        }
    }
}

impl ArrowTable for GrowthRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![table::date("ref_date", false), table::utf8("quarter", false)];
        fields.extend(table::cell_fields());
        fields.extend([
            table::float64("employment", false),
            table::float64("mom_growth", true),
            table::float64("yoy_growth", true),
        ]);
        fields
    }
}

/// Sum a series by (cell projected to `dimensions`, date), grouped and sorted
pub(crate) fn group_series(
    points: &[SeriesPoint],
    dimensions: &[Dimension],
) -> BTreeMap<CellKey, BTreeMap<NaiveDate, f64>> {
    let mut groups: BTreeMap<CellKey, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for point in points {
        *groups
            .entry(point.cell.project(dimensions))
            .or_default()
            .entry(point.ref_date)
            .or_default() += point.value;
    }
    groups
}

/// Month-over-month and year-over-year growth per group
///
/// Rows are ordered by cell, then date. The first row of a group has no
/// month-over-month growth, and the first twelve have no year-over-year growth.
#[must_use]
pub fn compute_growth_rates(points: &[SeriesPoint], dimensions: &[Dimension]) -> Vec<GrowthRow> {
    let mut rows = Vec::with_capacity(points.len());
    for (cell, series) in group_series(points, dimensions) {
        let values = series.values().copied().collect_vec();
        let mom = stats::lagged_pct_change(&values, 1);
        let yoy = stats::lagged_pct_change(&values, YOY_LAG);

        for (i, (ref_date, employment)) in series.into_iter().enumerate() {
            rows.push(GrowthRow {
                ref_date,
                quarter: Quarter::from_date(ref_date).to_string(),
                supersector: cell.supersector.clone(),
                state_fips: cell.state_fips.clone(),
                size_class: cell.size_class.clone(),
                employment,
                mom_growth: mom[i],
                yoy_growth: yoy[i],
            });
        }
    }
    rows
}

/// Payroll and official growth side by side for one (date, cell)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthComparisonRow {
    pub ref_date: NaiveDate,
    pub quarter: String,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub payroll_employment: f64,
    pub official_employment: f64,
    pub payroll_mom: Option<f64>,
    pub official_mom: Option<f64>,
    pub payroll_yoy: Option<f64>,
    pub official_yoy: Option<f64>,
    /// Payroll minus official year-over-year growth
    pub growth_diff: Option<f64>,
    pub abs_diff: Option<f64>,
    pub rolling_corr_12: Option<f64>,
}

impl ArrowTable for GrowthComparisonRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![table::date("ref_date", false), table::utf8("quarter", false)];
        fields.extend(table::cell_fields());
        fields.extend([
            table::float64("payroll_employment", false),
            table::float64("official_employment", false),
            table::float64("payroll_mom", true),
            table::float64("official_mom", true),
            table::float64("payroll_yoy", true),
            table::float64("official_yoy", true),
            table::float64("growth_diff", true),
            table::float64("abs_diff", true),
            table::float64("rolling_corr_12", true),
        ]);
        fields
    }
}

/// Dimensions carried by at least one row
fn key_dimensions(rows: &[GrowthRow]) -> Dimensions {
    Dimension::ALL
        .into_iter()
        .filter(|d| rows.iter().any(|row| row.cell().get(*d).is_some()))
        .collect()
}

/// Inner join two growth series on date and their shared keys, and correlate them
///
/// The join keys are the dimensions both series carry, so a supersector
/// series matches a national one on date alone. Each joined row keeps the
/// payroll keys plus any key only the official row carries. The 12-period
/// rolling correlation of year-over-year growth runs within each joined cell,
/// so it stays undefined until a cell has twelve matched periods with defined
/// growth on both sides.
#[must_use]
pub fn compare_growth(payroll: &[GrowthRow], official: &[GrowthRow]) -> Vec<GrowthComparisonRow> {
    let official_dims = key_dimensions(official);
    let shared: Dimensions = key_dimensions(payroll)
        .into_iter()
        .filter(|d| official_dims.contains(d))
        .collect();

    let mut official_index: FxHashMap<(NaiveDate, CellKey), Vec<&GrowthRow>> = FxHashMap::default();
    for row in official {
        official_index
            .entry((row.ref_date, row.cell().project(&shared)))
            .or_default()
            .push(row);
    }

    let mut groups: BTreeMap<CellKey, Vec<GrowthComparisonRow>> = BTreeMap::new();
    for row in payroll {
        let payroll_cell = row.cell();
        let Some(matches) = official_index.get(&(row.ref_date, payroll_cell.project(&shared))) else {
            continue;
        };
        for other in matches {
            let mut cell = payroll_cell.clone();
            for dimension in &official_dims {
                if cell.get(*dimension).is_none() {
                    cell.set(*dimension, other.cell().get(*dimension).map(str::to_string));
                }
            }
            let growth_diff = row.yoy_growth.zip(other.yoy_growth).map(|(p, o)| p - o);
            groups.entry(cell.clone()).or_default().push(GrowthComparisonRow {
                ref_date: row.ref_date,
                quarter: row.quarter.clone(),
                supersector: cell.supersector,
                state_fips: cell.state_fips,
                size_class: cell.size_class,
                payroll_employment: row.employment,
                official_employment: other.employment,
                payroll_mom: row.mom_growth,
                official_mom: other.mom_growth,
                payroll_yoy: row.yoy_growth,
                official_yoy: other.yoy_growth,
                growth_diff,
                abs_diff: growth_diff.map(f64::abs),
                rolling_corr_12: None,
            });
        }
    }

    let mut rows = Vec::new();
    for (_, mut group) in groups {
        group.sort_by_key(|r| r.ref_date);
        let xs = group.iter().map(|r| r.payroll_yoy).collect_vec();
        let ys = group.iter().map(|r| r.official_yoy).collect_vec();
        let correlation = stats::rolling_correlation(&xs, &ys, CORRELATION_WINDOW);
        for (row, corr) in group.iter_mut().zip(correlation) {
            row.rolling_corr_12 = corr;
        }
        rows.extend(group);
    }

    debug!("Growth comparison: {} matched rows", rows.len());
    rows
}

/// A payroll turning point matched to the nearest official one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurningPointRow {
    pub payroll_turn_date: NaiveDate,
    pub official_turn_date: NaiveDate,
    /// Positive when the payroll turn comes later
    pub lead_lag_months: f64,
    pub median_lead_lag: f64,
    pub mean_lead_lag: f64,
}

impl ArrowTable for TurningPointRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        vec![
            table::date("payroll_turn_date", false),
            table::date("official_turn_date", false),
            table::float64("lead_lag_months", false),
            table::float64("median_lead_lag", false),
            table::float64("mean_lead_lag", false),
        ]
    }
}

/// Dates where the sign of year-over-year growth flips between -1 and +1
///
/// Rows are taken in date order; a row with undefined growth breaks the
/// comparison with its neighbours.
fn turning_points(series: &[GrowthRow]) -> Vec<NaiveDate> {
    let ordered = series.iter().sorted_by_key(|r| r.ref_date).collect_vec();
    ordered
        .iter()
        .tuple_windows()
        .filter_map(|(before, after)| {
            let prev = stats::sign(before.yoy_growth?);
            let next = stats::sign(after.yoy_growth?);
            ((i16::from(next) - i16::from(prev)).abs() == 2).then_some(after.ref_date)
        })
        .collect()
}

/// Match payroll turning points to official ones and measure the lead or lag
///
/// Each series should hold a single group (usually national). Returns no rows
/// when either series has no turning point.
#[must_use]
pub fn analyze_turning_points(payroll: &[GrowthRow], official: &[GrowthRow]) -> Vec<TurningPointRow> {
    let payroll_turns = turning_points(payroll);
    let official_turns = turning_points(official);
    if payroll_turns.is_empty() || official_turns.is_empty() {
        return Vec::new();
    }

    let matched = payroll_turns
        .into_iter()
        .filter_map(|turn| {
            let nearest = official_turns
                .iter()
                .copied()
                .min_by_key(|other| days_between(*other, turn).abs())?;
            let lead_lag = days_between(nearest, turn) as f64 / DAYS_PER_MONTH;
            Some((turn, nearest, lead_lag))
        })
        .collect_vec();

    let lags = matched.iter().map(|(_, _, lag)| *lag).collect_vec();
    let median = stats::median(&lags).unwrap_or(0.0);
    let mean = stats::mean(&lags).unwrap_or(0.0);

    matched
        .into_iter()
        .map(|(payroll_turn_date, official_turn_date, lead_lag_months)| TurningPointRow {
            payroll_turn_date,
            official_turn_date,
            lead_lag_months,
            median_lead_lag: median,
            mean_lead_lag: mean,
        })
        .collect()
}
