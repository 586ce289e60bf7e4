//! Sequential iterative proportional fitting
//!
//! Each iteration rakes the configured dimensions one after another. Raking a
//! dimension multiplies every record's weight by official / weighted panel
//! total for the record's category (and period, when split by period).

use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::algorithm::raking::RakingStrategy;
use crate::algorithm::reconciliation::keyed_exactly;
use crate::models::cell::Dimension;
use crate::models::client_month::ClientMonth;
use crate::models::official::OfficialObservation;
use crate::models::period::Quarter;
use crate::utils::stats::safe_divisor;

/// Period a margin is fitted within
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Period {
    All,
    Month(i32, u32),
    Quarter(Quarter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodSplit {
    None,
    Month,
    Quarter,
}

impl PeriodSplit {
    fn of_date(self, date: NaiveDate) -> Period {
        match self {
            Self::None => Period::All,
            Self::Month => Period::Month(date.year(), date.month()),
            Self::Quarter => Period::Quarter(Quarter::from_date(date)),
        }
    }
}

/// Official marginal totals of one dimension
#[derive(Debug, Clone)]
struct MarginTargets {
    dimension: Dimension,
    split: PeriodSplit,
    totals: FxHashMap<(Period, String), f64>,
}

impl MarginTargets {
    /// Collect usable official totals for a dimension
    ///
    /// Rows keyed on exactly this dimension are preferred; without any, every
    /// row carrying the dimension is summed. Non-positive totals are dropped.
    fn build(
        official: &[OfficialObservation],
        dimension: Dimension,
        split_by_period: bool,
    ) -> Self {
        let exact: Vec<&OfficialObservation> = official
            .iter()
            .filter(|obs| obs.employment.is_some() && keyed_exactly(&obs.cell, &[dimension]))
            .collect();
        let rows = if exact.is_empty() {
            official
                .iter()
                .filter(|obs| obs.employment.is_some() && obs.cell.get(dimension).is_some())
                .collect()
        } else {
            exact
        };

        let split = if !split_by_period || rows.is_empty() {
            PeriodSplit::None
        } else if rows.iter().all(|obs| obs.ref_date.is_some()) {
            PeriodSplit::Month
        } else if rows.iter().all(|obs| obs.quarter.is_some()) {
            PeriodSplit::Quarter
        } else {
            PeriodSplit::None
        };

        let mut totals: FxHashMap<(Period, String), f64> = FxHashMap::default();
        for obs in rows {
            let period = match (split, obs.ref_date, obs.quarter) {
                (PeriodSplit::Month, Some(date), _) => split.of_date(date),
                (PeriodSplit::Quarter, _, Some(quarter)) => Period::Quarter(quarter),
                _ => Period::All,
            };
            let (Some(category), Some(employment)) = (obs.cell.get(dimension), obs.employment)
            else {
                continue;
            };
            *totals.entry((period, category.to_string())).or_default() += employment;
        }

        let before = totals.len();
        totals.retain(|_, total| *total > 0.0);
        if totals.len() < before {
            warn!(
                "Dropped {} non-positive official totals for {dimension}",
                before - totals.len()
            );
        }

        Self {
            dimension,
            split,
            totals,
        }
    }

    fn key(&self, record: &ClientMonth) -> (Period, String) {
        (
            self.split.of_date(record.ref_date),
            record.key(self.dimension).to_string(),
        )
    }
}

/// Sequential IPF over an ordered list of dimensions
#[derive(Debug, Clone)]
pub struct SequentialIpf {
    margins: Vec<MarginTargets>,
    /// Margins whose zero panel total already received the fallback ratio
    fallback_applied: FxHashSet<(usize, Period, String)>,
}

impl SequentialIpf {
    /// Build the official margins for each dimension, in raking order
    #[must_use]
    pub fn new(
        dimensions: &[Dimension],
        official: &[OfficialObservation],
        split_by_period: bool,
    ) -> Self {
        let margins = dimensions
            .iter()
            .map(|&dimension| MarginTargets::build(official, dimension, split_by_period))
            .inspect(|margin| {
                if margin.totals.is_empty() {
                    warn!(
                        "No usable official totals for {}; it will not be raked",
                        margin.dimension
                    );
                } else {
                    debug!(
                        "Raking {} against {} official totals ({:?})",
                        margin.dimension,
                        margin.totals.len(),
                        margin.split
                    );
                }
            })
            .collect();

        Self {
            margins,
            fallback_applied: FxHashSet::default(),
        }
    }

    /// Whether any dimension has official totals to rake against
    #[must_use]
    pub fn has_targets(&self) -> bool {
        self.margins.iter().any(|m| !m.totals.is_empty())
    }

    fn rake_margin(&mut self, index: usize, records: &[ClientMonth], weights: &mut [f64]) -> f64 {
        let margin = &self.margins[index];
        if margin.totals.is_empty() {
            return 0.0;
        }

        let mut panel_totals: FxHashMap<(Period, String), f64> = FxHashMap::default();
        for (record, weight) in records.iter().zip(weights.iter()) {
            *panel_totals.entry(margin.key(record)).or_default() +=
                weight * record.employment as f64;
        }

        let mut ratios: FxHashMap<(Period, String), f64> = FxHashMap::default();
        for (key, official_total) in &margin.totals {
            let panel_total = panel_totals.get(key).copied();
            let ratio = if panel_total.is_some_and(|t| t != 0.0) {
                official_total / safe_divisor(panel_total)
            } else {
                // Zero or missing panel total: divide by 1, once per margin
                let marker = (index, key.0, key.1.clone());
                if !self.fallback_applied.insert(marker) {
                    continue;
                }
                official_total / safe_divisor(None)
            };
            ratios.insert(key.clone(), ratio);
        }

        let mut max_change: f64 = 0.0;
        for (record, weight) in records.iter().zip(weights.iter_mut()) {
            let Some(ratio) = ratios.get(&margin.key(record)) else {
                continue;
            };
            let updated = *weight * ratio;
            max_change = max_change.max((updated - *weight).abs());
            *weight = updated;
        }
        max_change
    }
}

impl RakingStrategy for SequentialIpf {
    fn name(&self) -> &'static str {
        "sequential_ipf"
    }

    fn iterate(&mut self, records: &[ClientMonth], weights: &mut [f64]) -> f64 {
        (0..self.margins.len())
            .map(|index| self.rake_margin(index, records, weights))
            .fold(0.0, f64::max)
    }
}
