//! Composition of employment across the categories of one dimension
//!
//! Shares are always normalised by the total of their own period, so the
//! shares of each source sum to one within a period.

use chrono::NaiveDate;
use itertools::Itertools;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::algorithm::reconciliation::official_at;
use crate::models::cell::{CellKey, Dimension};
use crate::models::official::OfficialObservation;
use crate::models::panel::{AggregationLevel, PanelRow, level_rows};
use crate::models::period::Quarter;
use crate::utils::arrow::table::{self, ArrowTable};

/// Category shares of both sources for one (date, category)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareRow {
    pub ref_date: NaiveDate,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub payroll_employment: Option<f64>,
    pub official_employment: Option<f64>,
    pub payroll_share: Option<f64>,
    pub official_share: Option<f64>,
    pub abs_deviation: f64,
    /// Half the summed absolute deviations of the period, repeated per row
    pub misallocation_index: f64,
}

impl ArrowTable for ShareRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![table::date("ref_date", false)];
        fields.extend(table::cell_fields());
        fields.extend([
            table::float64("payroll_employment", true),
            table::float64("official_employment", true),
            table::float64("payroll_share", true),
            table::float64("official_share", true),
            table::float64("abs_deviation", false),
            table::float64("misallocation_index", false),
        ]);
        fields
    }
}

/// Composition Shift Index for one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsiRow {
    pub ref_date: NaiveDate,
    pub quarter: String,
    pub dimension: String,
    /// `None` when no category has a predecessor period
    pub csi: Option<f64>,
    pub categories_compared: i64,
}

impl ArrowTable for CsiRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        vec![
            table::date("ref_date", false),
            table::utf8("quarter", false),
            table::utf8("dimension", false),
            table::float64("csi", true),
            table::int64("categories_compared", false),
        ]
    }
}

type PeriodTotals = BTreeMap<NaiveDate, BTreeMap<String, f64>>;

/// Employment of one dimension's categories per date from panel rows
fn panel_by_category(panel: &[PanelRow], dimension: Dimension) -> PeriodTotals {
    let mut totals = PeriodTotals::new();
    let Some(level) = AggregationLevel::for_dimensions(&[dimension]) else {
        return totals;
    };
    for row in level_rows(panel, level) {
        if let Some(category) = row.cell().get(dimension) {
            *totals
                .entry(row.ref_date)
                .or_default()
                .entry(category.to_string())
                .or_default() += row.payroll_employment as f64;
        }
    }
    totals
}

/// Monthly official employment of one dimension's categories per date
fn official_by_category(official: &[OfficialObservation], dimension: Dimension) -> PeriodTotals {
    let mut totals = PeriodTotals::new();
    for obs in official_at(official, &[dimension]) {
        let (Some(ref_date), Some(employment), Some(category)) =
            (obs.ref_date, obs.employment, obs.cell.get(dimension))
        else {
            continue;
        };
        *totals
            .entry(ref_date)
            .or_default()
            .entry(category.to_string())
            .or_default() += employment;
    }
    totals
}

/// Share of each category within one period; `None` when the total is zero
pub(crate) fn shares(values: &BTreeMap<String, f64>) -> BTreeMap<String, Option<f64>> {
    let total: f64 = values.values().sum();
    values
        .iter()
        .map(|(category, value)| {
            let share = (total != 0.0).then(|| value / total);
            (category.clone(), share)
        })
        .collect()
}

/// Compare payroll and official category shares per period
///
/// Full outer join on (date, category): a category missing on one side has a
/// null share there, counted as zero in the deviation. Rows are ordered by
/// date, then category.
#[must_use]
pub fn compute_share_comparison(
    panel: &[PanelRow],
    official: &[OfficialObservation],
    dimension: Dimension,
) -> Vec<ShareRow> {
    let payroll = panel_by_category(panel, dimension);
    let benchmark = official_by_category(official, dimension);
    let empty = BTreeMap::new();

    let dates: BTreeSet<NaiveDate> = payroll.keys().chain(benchmark.keys()).copied().collect();
    let mut rows = Vec::new();
    for ref_date in dates {
        let payroll_values = payroll.get(&ref_date).unwrap_or(&empty);
        let official_values = benchmark.get(&ref_date).unwrap_or(&empty);
        let payroll_shares = shares(payroll_values);
        let official_shares = shares(official_values);

        let categories: BTreeSet<&String> =
            payroll_values.keys().chain(official_values.keys()).collect();
        let start = rows.len();
        for category in categories {
            let payroll_share = payroll_shares.get(category).copied().flatten();
            let official_share = official_shares.get(category).copied().flatten();
            let cell = CellKey::national().with(dimension, category.clone());
            rows.push(ShareRow {
                ref_date,
                supersector: cell.supersector,
                state_fips: cell.state_fips,
                size_class: cell.size_class,
                payroll_employment: payroll_values.get(category).copied(),
                official_employment: official_values.get(category).copied(),
                payroll_share,
                official_share,
                abs_deviation: (payroll_share.unwrap_or(0.0) - official_share.unwrap_or(0.0)).abs(),
                misallocation_index: 0.0,
            });
        }

        let period = &mut rows[start..];
        let index = period.iter().map(|r| r.abs_deviation).sum::<f64>() / 2.0;
        for row in period {
            row.misallocation_index = index;
        }
    }
    rows
}

/// Composition Shift Index of the payroll panel for one dimension
///
/// CSI(t) is the sum over categories of |share(t) - share(prev)|, where prev
/// is the category's own preceding period in sorted order. Categories seen for
/// the first time have no predecessor and are left out of the sum.
#[must_use]
pub fn compute_composition_shift_index(panel: &[PanelRow], dimension: Dimension) -> Vec<CsiRow> {
    let by_period: Vec<(NaiveDate, BTreeMap<String, Option<f64>>)> =
        panel_by_category(panel, dimension)
            .into_iter()
            .map(|(ref_date, values)| (ref_date, shares(&values)))
            .collect();

    let mut previous: BTreeMap<String, Option<f64>> = BTreeMap::new();
    let mut rows = Vec::with_capacity(by_period.len());
    for (ref_date, period_shares) in by_period {
        let deltas = period_shares
            .iter()
            .filter_map(|(category, share)| {
                let before = previous.get(category).copied().flatten()?;
                Some((share.as_ref()? - before).abs())
            })
            .collect_vec();

        rows.push(CsiRow {
            ref_date,
            quarter: Quarter::from_date(ref_date).to_string(),
            dimension: dimension.column().to_string(),
            csi: (!deltas.is_empty()).then(|| deltas.iter().sum()),
            categories_compared: deltas.len() as i64,
        });
        previous.extend(period_shares);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn supersector_row(month: u32, supersector: &str, emp: i64) -> PanelRow {
        let ref_date = date(2021, month, 12);
        PanelRow {
            grouping_level: AggregationLevel::Supersector.name().to_string(),
            ref_date,
            quarter: Quarter::from_date(ref_date).to_string(),
            supersector: Some(supersector.to_string()),
            state_fips: None,
            size_class: None,
            payroll_employment: emp,
            client_count: 1,
            birth_count: 0,
            birth_determinable_count: 0,
            entry_count: 0,
            exit_count: 0,
            continuing_employment: emp,
        }
    }

    fn official(month: u32, supersector: &str, emp: f64) -> OfficialObservation {
        OfficialObservation::monthly(
            date(2021, month, 12),
            CellKey::national().with(Dimension::Supersector, supersector),
            emp,
        )
    }

    #[test]
    fn shares_and_misallocation() {
        let panel = vec![
            supersector_row(1, "Construction", 30),
            supersector_row(1, "Retail trade", 70),
        ];
        let official = vec![
            official(1, "Construction", 500.0),
            official(1, "Retail trade", 500.0),
        ];
        let rows = compute_share_comparison(&panel, &official, Dimension::Supersector);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].supersector.as_deref(), Some("Construction"));
        assert!((rows[0].payroll_share.unwrap() - 0.3).abs() < 1e-12);
        assert!((rows[0].abs_deviation - 0.2).abs() < 1e-12);
        assert!((rows[0].misallocation_index - 0.2).abs() < 1e-12);
        assert!((rows[1].misallocation_index - 0.2).abs() < 1e-12);
    }

    #[test]
    fn one_sided_categories_are_kept() {
        let panel = vec![supersector_row(1, "Construction", 10)];
        let official = vec![official(1, "Information", 10.0)];
        let rows = compute_share_comparison(&panel, &official, Dimension::Supersector);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].official_share, None);
        assert_eq!(rows[1].payroll_share, None);
        assert!((rows[0].misallocation_index - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unchanged_composition_has_zero_csi() {
        let panel = vec![
            supersector_row(1, "Construction", 10),
            supersector_row(1, "Retail trade", 30),
            supersector_row(2, "Construction", 20),
            supersector_row(2, "Retail trade", 60),
        ];
        let rows = compute_composition_shift_index(&panel, Dimension::Supersector);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].csi, None);
        assert_eq!(rows[0].categories_compared, 0);
        assert!(rows[1].csi.unwrap().abs() < 1e-12);
        assert_eq!(rows[1].categories_compared, 2);
    }

    #[test]
    fn shifted_composition_has_positive_csi() {
        let panel = vec![
            supersector_row(1, "Construction", 50),
            supersector_row(1, "Retail trade", 50),
            supersector_row(2, "Construction", 80),
            supersector_row(2, "Retail trade", 20),
        ];
        let rows = compute_composition_shift_index(&panel, Dimension::Supersector);
        let csi = rows[1].csi.unwrap();
        assert!((csi - 0.6).abs() < 1e-12);
        assert!(csi <= 2.0);
    }

    #[test]
    fn new_category_is_not_compared() {
        let panel = vec![
            supersector_row(1, "Construction", 50),
            supersector_row(2, "Construction", 50),
            supersector_row(2, "Information", 50),
        ];
        let rows = compute_composition_shift_index(&panel, Dimension::Supersector);
        assert_eq!(rows[1].categories_compared, 1);
        assert!((rows[1].csi.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_panel_gives_no_rows() {
        assert!(compute_share_comparison(&[], &[], Dimension::SizeClass).is_empty());
        assert!(compute_composition_shift_index(&[], Dimension::SizeClass).is_empty());
    }
}
