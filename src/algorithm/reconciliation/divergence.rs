//! Decompositions of growth and employment change
//!
//! The shift-share decomposition splits the gap between payroll and official
//! growth into a composition effect (different category weights) and a
//! within-cell effect (different growth inside categories). The employment
//! change decomposition splits period-to-period change of the panel into the
//! intensive margin (continuing clients) and the extensive margin (entry and
//! exit).

use chrono::NaiveDate;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::algorithm::reconciliation::growth::SeriesPoint;
use crate::models::cell::{CellKey, Dimension};
use crate::models::client_month::ClientMonth;
use crate::models::period::Quarter;
use crate::utils::arrow::table::{self, ArrowTable};
use crate::utils::stats::pct_change;

/// Shift-share decomposition of the growth gap for one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DivergenceRow {
    pub ref_date: NaiveDate,
    pub quarter: String,
    pub dimension: Option<String>,
    pub payroll_growth: f64,
    pub official_growth: f64,
    pub total_divergence: f64,
    pub composition_effect: f64,
    pub within_cell_effect: f64,
    /// Categories in the decomposition; zero for the single-series fallback
    pub categories: i64,
}

impl ArrowTable for DivergenceRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        vec![
            table::date("ref_date", false),
            table::utf8("quarter", false),
            table::utf8("dimension", true),
            table::float64("payroll_growth", false),
            table::float64("official_growth", false),
            table::float64("total_divergence", false),
            table::float64("composition_effect", false),
            table::float64("within_cell_effect", false),
            table::int64("categories", false),
        ]
    }
}

/// One source summed per category and per date, plus the per-date total
struct CategorySeries {
    categories: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    totals: BTreeMap<NaiveDate, f64>,
}

impl CategorySeries {
    fn new(points: &[SeriesPoint], dimension: Option<Dimension>) -> Self {
        let mut categories: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
        let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for point in points {
            *totals.entry(point.ref_date).or_default() += point.value;
            if let Some(category) = dimension.and_then(|d| point.cell.get(d)) {
                *categories
                    .entry(category.to_string())
                    .or_default()
                    .entry(point.ref_date)
                    .or_default() += point.value;
            }
        }
        Self { categories, totals }
    }

    /// Previous value and growth of a category at `date`, against its own previous row
    fn category_growth(&self, category: &str, date: NaiveDate) -> Option<(f64, f64)> {
        let series = self.categories.get(category)?;
        let current = *series.get(&date)?;
        let (_, previous) = series.range(..date).next_back()?;
        Some((*previous, pct_change(Some(*previous), Some(current))?))
    }

    /// Categories with a value at `date`
    fn categories_at(&self, date: NaiveDate) -> BTreeSet<&str> {
        self.categories
            .iter()
            .filter(|(_, series)| series.contains_key(&date))
            .map(|(category, _)| category.as_str())
            .collect()
    }

    fn total_growth(&self, date: NaiveDate) -> Option<f64> {
        let current = *self.totals.get(&date)?;
        let (_, previous) = self.totals.range(..date).next_back()?;
        pct_change(Some(*previous), Some(current))
    }
}

struct CategoryTerm {
    payroll_base: f64,
    payroll_growth: f64,
    official_base: f64,
    official_growth: f64,
}

/// Weighted shift-share over the categories present on both sides
///
/// Weights are the previous-period values normalised over the compared
/// categories. Returns `None` when either side's weights do not normalise.
fn shift_share(terms: &[CategoryTerm]) -> Option<(f64, f64, f64, f64)> {
    let payroll_total: f64 = terms.iter().map(|t| t.payroll_base).sum();
    let official_total: f64 = terms.iter().map(|t| t.official_base).sum();
    if terms.is_empty() || payroll_total == 0.0 || official_total == 0.0 {
        return None;
    }

    let (mut payroll_growth, mut official_growth) = (0.0, 0.0);
    let (mut composition, mut within) = (0.0, 0.0);
    for term in terms {
        let w_p = term.payroll_base / payroll_total;
        let w_o = term.official_base / official_total;
        payroll_growth += w_p * term.payroll_growth;
        official_growth += w_o * term.official_growth;
        composition += (w_p - w_o) * term.official_growth;
        within += w_p * (term.payroll_growth - term.official_growth);
    }
    Some((payroll_growth, official_growth, composition, within))
}

/// Decompose the payroll-official growth gap per period
///
/// With a dimension, the decomposition runs over the categories observed in
/// that period. Both sides must carry the same categories, each with defined
/// growth. Otherwise, and without a dimension, the period falls back to plain
/// growth of the totals with a zero composition effect. Periods without
/// defined growth on both sides are left out.
#[must_use]
pub fn decompose_growth_divergence(
    payroll: &[SeriesPoint],
    official: &[SeriesPoint],
    dimension: Option<Dimension>,
) -> Vec<DivergenceRow> {
    let payroll_series = CategorySeries::new(payroll, dimension);
    let official_series = CategorySeries::new(official, dimension);

    let mut rows = Vec::new();
    for &ref_date in payroll_series.totals.keys() {
        if !official_series.totals.contains_key(&ref_date) {
            continue;
        }

        let categories = payroll_series.categories_at(ref_date);
        let terms: Option<Vec<CategoryTerm>> = if categories
            == official_series.categories_at(ref_date)
        {
            categories
                .iter()
                .map(|category| {
                    let (payroll_base, payroll_growth) =
                        payroll_series.category_growth(category, ref_date)?;
                    let (official_base, official_growth) =
                        official_series.category_growth(category, ref_date)?;
                    Some(CategoryTerm {
                        payroll_base,
                        payroll_growth,
                        official_base,
                        official_growth,
                    })
                })
                .collect()
        } else {
            None
        };

        let decomposed = terms.as_deref().and_then(|terms| {
            shift_share(terms).map(|(p, o, composition, within)| {
                (p, o, composition, within, terms.len() as i64)
            })
        });
        let Some((payroll_growth, official_growth, composition, within, categories)) =
            decomposed.or_else(|| {
                let p = payroll_series.total_growth(ref_date)?;
                let o = official_series.total_growth(ref_date)?;
                Some((p, o, 0.0, p - o, 0))
            })
        else {
            continue;
        };

        rows.push(DivergenceRow {
            ref_date,
            quarter: Quarter::from_date(ref_date).to_string(),
            dimension: dimension.map(|d| d.column().to_string()),
            payroll_growth,
            official_growth,
            total_divergence: payroll_growth - official_growth,
            composition_effect: composition,
            within_cell_effect: within,
            categories,
        });
    }

    debug!(
        "Growth divergence by {:?}: {} periods",
        dimension.map(|d| d.column()),
        rows.len()
    );
    rows
}

/// Employment change between consecutive periods of one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmploymentChangeRow {
    pub ref_date: NaiveDate,
    pub previous_ref_date: NaiveDate,
    pub quarter: String,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub total_change: i64,
    pub within_change: i64,
    pub entry_contribution: i64,
    pub exit_contribution: i64,
    pub continuing_clients: i64,
    pub entering_clients: i64,
    pub exiting_clients: i64,
}

impl ArrowTable for EmploymentChangeRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![
            table::date("ref_date", false),
            table::date("previous_ref_date", false),
            table::utf8("quarter", false),
        ];
        fields.extend(table::cell_fields());
        fields.extend([
            table::int64("total_change", false),
            table::int64("within_change", false),
            table::int64("entry_contribution", false),
            table::int64("exit_contribution", false),
            table::int64("continuing_clients", false),
            table::int64("entering_clients", false),
            table::int64("exiting_clients", false),
        ]);
        fields
    }
}

/// Split period-to-period employment change into within, entry and exit parts
///
/// A client is present in a period when it has any record there; its
/// employment is summed over its records. Consecutive periods are consecutive
/// distinct dates of the group. Rows are ordered by date, then cell.
#[must_use]
pub fn decompose_employment_change(
    records: &[ClientMonth],
    dimensions: &[Dimension],
) -> Vec<EmploymentChangeRow> {
    let mut groups: BTreeMap<CellKey, BTreeMap<NaiveDate, FxHashMap<&str, i64>>> = BTreeMap::new();
    for record in records {
        *groups
            .entry(record.cell(dimensions))
            .or_default()
            .entry(record.ref_date)
            .or_default()
            .entry(record.client_id.as_str())
            .or_default() += record.employment;
    }

    let mut rows = Vec::new();
    for (cell, periods) in &groups {
        let periods: Vec<_> = periods.iter().collect();
        for pair in periods.windows(2) {
            let (previous_date, before) = pair[0];
            let (ref_date, after) = pair[1];

            let before_ids: FxHashSet<&str> = before.keys().copied().collect();
            let after_ids: FxHashSet<&str> = after.keys().copied().collect();

            let (mut within, mut entry, mut exit) = (0, 0, 0);
            let (mut continuing, mut entering, mut exiting) = (0, 0, 0);
            for (id, employment) in after {
                if let Some(earlier) = before.get(id) {
                    within += employment - earlier;
                    continuing += 1;
                } else {
                    entry += employment;
                    entering += 1;
                }
            }
            for id in before_ids.difference(&after_ids) {
                exit += before.get(id).copied().unwrap_or(0);
                exiting += 1;
            }

            let total: i64 = after.values().sum::<i64>() - before.values().sum::<i64>();
            rows.push(EmploymentChangeRow {
                ref_date: *ref_date,
                previous_ref_date: *previous_date,
                quarter: Quarter::from_date(*ref_date).to_string(),
                supersector: cell.supersector.clone(),
                state_fips: cell.state_fips.clone(),
                size_class: cell.size_class.clone(),
                total_change: total,
                within_change: within,
                entry_contribution: entry,
                exit_contribution: exit,
                continuing_clients: continuing,
                entering_clients: entering,
                exiting_clients: exiting,
            });
        }
    }

    rows.sort_by(|a, b| {
        (a.ref_date, &a.supersector, &a.state_fips, &a.size_class).cmp(&(
            b.ref_date,
            &b.supersector,
            &b.state_fips,
            &b.size_class,
        ))
    });
    let distinct: BTreeSet<NaiveDate> = rows.iter().map(|r| r.ref_date).collect();
    debug!(
        "Employment change over {:?}: {} rows across {} periods",
        dimensions,
        rows.len(),
        distinct.len()
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::client_month::BirthStatus;

    fn date(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, m, 12).unwrap()
    }

    fn point(m: u32, supersector: &str, value: f64) -> SeriesPoint {
        SeriesPoint::new(
            date(m),
            CellKey::national().with(Dimension::Supersector, supersector),
            value,
        )
    }

    fn record(id: &str, m: u32, emp: i64) -> ClientMonth {
        ClientMonth::new(
            id,
            date(m),
            date(1),
            None,
            BirthStatus::Undeterminable,
            "236220",
            "06",
            emp,
        )
    }

    #[test]
    fn shift_share_identity_holds() {
        let payroll = vec![
            point(1, "Construction", 30.0),
            point(1, "Retail trade", 70.0),
            point(2, "Construction", 33.0),
            point(2, "Retail trade", 70.0),
        ];
        let official = vec![
            point(1, "Construction", 500.0),
            point(1, "Retail trade", 500.0),
            point(2, "Construction", 510.0),
            point(2, "Retail trade", 495.0),
        ];
        let rows = decompose_growth_divergence(&payroll, &official, Some(Dimension::Supersector));
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.categories, 2);
        assert!((row.payroll_growth - 0.03).abs() < 1e-12);
        assert!((row.official_growth - 0.005).abs() < 1e-12);
        assert!(
            (row.total_divergence - (row.composition_effect + row.within_cell_effect)).abs() < 1e-9
        );
    }

    #[test]
    fn no_dimension_falls_back_to_totals() {
        let payroll = vec![point(1, "Construction", 100.0), point(2, "Construction", 110.0)];
        let official = vec![point(1, "Construction", 1000.0), point(2, "Construction", 1050.0)];
        let rows = decompose_growth_divergence(&payroll, &official, None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].categories, 0);
        assert_eq!(rows[0].composition_effect, 0.0);
        assert!((rows[0].total_divergence - 0.05).abs() < 1e-12);
        assert!((rows[0].within_cell_effect - rows[0].total_divergence).abs() < 1e-12);
    }

    #[test]
    fn disjoint_categories_fall_back_to_totals() {
        let payroll = vec![point(1, "Construction", 100.0), point(2, "Construction", 120.0)];
        let official = vec![point(1, "Information", 100.0), point(2, "Information", 110.0)];
        let rows = decompose_growth_divergence(&payroll, &official, Some(Dimension::Supersector));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].categories, 0);
        assert!((rows[0].total_divergence - 0.1).abs() < 1e-12);
    }

    #[test]
    fn partial_overlap_falls_back_to_totals() {
        let payroll = vec![
            point(1, "Construction", 100.0),
            point(1, "Retail trade", 100.0),
            point(2, "Construction", 110.0),
            point(2, "Retail trade", 200.0),
        ];
        let official = vec![point(1, "Construction", 100.0), point(2, "Construction", 105.0)];
        let rows = decompose_growth_divergence(&payroll, &official, Some(Dimension::Supersector));
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.categories, 0);
        assert!((row.payroll_growth - 0.55).abs() < 1e-12);
        assert!((row.official_growth - 0.05).abs() < 1e-12);
        assert_eq!(row.composition_effect, 0.0);
        assert!((row.within_cell_effect - 0.5).abs() < 1e-12);
    }

    #[test]
    fn employment_change_margins() {
        let records = vec![
            record("c1", 1, 100),
            record("c2", 1, 50),
            record("c1", 2, 110),
            record("c2", 2, 45),
            record("c1", 3, 120),
            record("c3", 3, 30),
        ];
        let rows = decompose_employment_change(&records, &[]);
        assert_eq!(rows.len(), 2);

        let feb = &rows[0];
        assert_eq!(feb.ref_date, date(2));
        assert_eq!(feb.within_change, 5);
        assert_eq!(feb.total_change, 5);

        let mar = &rows[1];
        assert_eq!(mar.previous_ref_date, date(2));
        assert_eq!(mar.within_change, 10);
        assert_eq!(mar.entry_contribution, 30);
        assert_eq!(mar.exit_contribution, 45);
        assert_eq!(mar.total_change, -5);
        assert_eq!(mar.entering_clients, 1);
        assert_eq!(mar.exiting_clients, 1);
        for row in &rows {
            assert_eq!(
                row.total_change,
                row.within_change + row.entry_contribution - row.exit_contribution
            );
        }
    }

    #[test]
    fn single_period_has_no_change_rows() {
        let records = vec![record("c1", 1, 10)];
        assert!(decompose_employment_change(&records, &[]).is_empty());
        assert!(decompose_employment_change(&[], &[Dimension::Supersector]).is_empty());
    }
}
