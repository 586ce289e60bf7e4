//! Raking of per-record weights to official marginal totals
//!
//! A [`RakingStrategy`] performs one iteration over the weights; the driver in
//! [`rake`] repeats it until the largest weight change falls below the
//! tolerance or the iteration cap is reached. Reaching the cap is not an
//! error: the weights of the last iteration are returned with
//! `converged = false`. Employment values are never modified.

pub mod ipf;

pub use ipf::SequentialIpf;

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::algorithm::reconciliation::growth::{GrowthRow, SeriesPoint, compute_growth_rates};
use crate::config::RakeConfig;
use crate::models::cell::Dimension;
use crate::models::client_month::ClientMonth;
use crate::models::official::OfficialObservation;
use crate::utils::arrow::table::{self, ArrowTable};

/// One iteration of a raking method
pub trait RakingStrategy {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Update `weights` (parallel to `records`) and return the largest absolute change
    fn iterate(&mut self, records: &[ClientMonth], weights: &mut [f64]) -> f64;
}

/// Result of a raking run
#[derive(Debug, Clone, PartialEq)]
pub struct RakeOutcome {
    /// One weight per input record, in input order
    pub weights: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    /// Largest weight change of the last iteration
    pub max_change: f64,
    pub elapsed: Duration,
}

/// Run a strategy from unit weights until convergence or the iteration cap
pub fn rake<S: RakingStrategy>(
    records: &[ClientMonth],
    strategy: &mut S,
    config: &RakeConfig,
) -> RakeOutcome {
    let start = Instant::now();
    let mut weights = vec![1.0; records.len()];
    let mut iterations = 0;
    let mut max_change = 0.0;
    let mut converged = records.is_empty();

    while !converged && iterations < config.max_iterations {
        iterations += 1;
        max_change = strategy.iterate(records, &mut weights);
        debug!(
            "{} iteration {iterations}: max weight change {max_change:.3e}",
            strategy.name()
        );
        converged = max_change < config.tolerance;
    }

    if converged {
        info!(
            "Raking converged after {iterations} iterations ({:?})",
            start.elapsed()
        );
    } else {
        warn!(
            "Raking stopped at {iterations} iterations without converging (max change {max_change:.3e})"
        );
    }

    RakeOutcome {
        weights,
        iterations,
        converged,
        max_change,
        elapsed: start.elapsed(),
    }
}

/// Rake records to official totals with sequential IPF over `dimensions`
///
/// Without usable official totals every weight stays at 1.0.
pub fn rake_to_official(
    records: &[ClientMonth],
    official: &[OfficialObservation],
    dimensions: &[Dimension],
    config: &RakeConfig,
) -> RakeOutcome {
    let mut strategy = SequentialIpf::new(dimensions, official, config.split_by_period);
    if !strategy.has_targets() {
        warn!("No official totals to rake against; keeping unit weights");
        return RakeOutcome {
            weights: vec![1.0; records.len()],
            iterations: 0,
            converged: true,
            max_change: 0.0,
            elapsed: Duration::ZERO,
        };
    }
    rake(records, &mut strategy, config)
}

/// A client-month record with its rake weight
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RakeWeightRow {
    pub client_id: String,
    pub ref_date: NaiveDate,
    pub supersector: String,
    pub state_fips: String,
    pub size_class: String,
    pub employment: i64,
    pub rake_weight: f64,
}

impl ArrowTable for RakeWeightRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        vec![
            table::utf8("client_id", false),
            table::date("ref_date", false),
            table::utf8("supersector", false),
            table::utf8("state_fips", false),
            table::utf8("size_class", false),
            table::int64("employment", false),
            table::float64("rake_weight", false),
        ]
    }
}

/// Records with their weights attached
#[must_use]
pub fn weight_rows(records: &[ClientMonth], outcome: &RakeOutcome) -> Vec<RakeWeightRow> {
    records
        .iter()
        .zip(&outcome.weights)
        .map(|(record, weight)| RakeWeightRow {
            client_id: record.client_id.clone(),
            ref_date: record.ref_date,
            supersector: record.supersector.clone(),
            state_fips: record.state_fips.clone(),
            size_class: record.size_class.label().to_string(),
            employment: record.employment,
            rake_weight: *weight,
        })
        .collect()
}

/// Growth of weighted national employment
#[must_use]
pub fn compute_raked_growth(records: &[ClientMonth], outcome: &RakeOutcome) -> Vec<GrowthRow> {
    let points = SeriesPoint::from_records(records, Some(&outcome.weights), &[]);
    compute_growth_rates(&points, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cell::CellKey;
    use crate::models::client_month::BirthStatus;

    fn date(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, m, 12).unwrap()
    }

    fn record(id: &str, naics: &str, state: &str, emp: i64) -> ClientMonth {
        ClientMonth::new(id, date(1), date(1), None, BirthStatus::Undeterminable, naics, state, emp)
    }

    fn weighted_sum(records: &[ClientMonth], weights: &[f64], naics2: &str) -> f64 {
        records
            .iter()
            .zip(weights)
            .filter(|(r, _)| r.naics2 == naics2)
            .map(|(r, w)| r.employment as f64 * w)
            .sum()
    }

    #[test]
    fn two_category_panel_reaches_official_totals() {
        let records = vec![record("a", "236220", "06", 100), record("b", "441110", "06", 200)];
        let official = vec![
            OfficialObservation::monthly(
                date(1),
                CellKey::national().with(Dimension::Supersector, "Construction"),
                600.0,
            ),
            OfficialObservation::monthly(
                date(1),
                CellKey::national().with(Dimension::Supersector, "Retail trade"),
                400.0,
            ),
        ];
        let outcome = rake_to_official(&records, &official, &[Dimension::Supersector], &RakeConfig::default());
        assert!(outcome.converged);
        assert!((weighted_sum(&records, &outcome.weights, "23") - 600.0).abs() <= 1.0);
        assert!((weighted_sum(&records, &outcome.weights, "44") - 400.0).abs() <= 1.0);
        let total: f64 = records.iter().zip(&outcome.weights).map(|(r, w)| r.employment as f64 * w).sum();
        assert!((total - 1000.0).abs() <= 1.0);
        assert_eq!(records[0].employment, 100);
    }

    #[test]
    fn empty_official_keeps_unit_weights() {
        let records = vec![record("a", "236220", "06", 100)];
        let outcome = rake_to_official(&records, &[], &[Dimension::Supersector], &RakeConfig::default());
        assert_eq!(outcome.weights, vec![1.0]);
        assert_eq!(outcome.iterations, 0);
    }

    #[test]
    fn two_dimensions_converge_within_cap() {
        let records = vec![
            record("a", "236220", "06", 40),
            record("b", "236220", "36", 60),
            record("c", "441110", "06", 30),
            record("d", "441110", "36", 70),
        ];
        let cell = |d: Dimension, v: &str| CellKey::national().with(d, v);
        let official = vec![
            OfficialObservation::monthly(date(1), cell(Dimension::Supersector, "Construction"), 120.0),
            OfficialObservation::monthly(date(1), cell(Dimension::Supersector, "Retail trade"), 80.0),
            OfficialObservation::monthly(date(1), cell(Dimension::Geography, "06"), 90.0),
            OfficialObservation::monthly(date(1), cell(Dimension::Geography, "36"), 110.0),
        ];
        let config = RakeConfig::default().with_max_iterations(500);
        let outcome = rake_to_official(
            &records,
            &official,
            &[Dimension::Supersector, Dimension::Geography],
            &config,
        );
        assert!(outcome.converged);
        assert!(outcome.iterations > 1);
        assert!(outcome.weights.iter().all(|w| *w > 0.0));
        assert!((weighted_sum(&records, &outcome.weights, "23") - 120.0).abs() < 1e-3);
    }

    #[test]
    fn iteration_cap_bounds_the_run() {
        struct Never;
        impl RakingStrategy for Never {
            fn name(&self) -> &'static str {
                "never"
            }
            fn iterate(&mut self, _: &[ClientMonth], weights: &mut [f64]) -> f64 {
                weights.iter_mut().for_each(|w| *w *= 1.5);
                1.0
            }
        }
        let records = vec![record("a", "236220", "06", 1)];
        let config = RakeConfig::default().with_max_iterations(3);
        let outcome = rake(&records, &mut Never, &config);
        assert_eq!(outcome.iterations, 3);
        assert!(!outcome.converged);
        assert!((outcome.weights[0] - 3.375).abs() < 1e-12);
    }

    #[test]
    fn raked_growth_uses_weights() {
        let records = vec![record("a", "236220", "06", 10)];
        let outcome = RakeOutcome {
            weights: vec![3.0],
            iterations: 1,
            converged: true,
            max_change: 0.0,
            elapsed: Duration::ZERO,
        };
        let growth = compute_raked_growth(&records, &outcome);
        assert_eq!(growth.len(), 1);
        assert!((growth[0].employment - 30.0).abs() < 1e-12);
        let rows = weight_rows(&records, &outcome);
        assert!((rows[0].rake_weight - 3.0).abs() < 1e-12);
        assert_eq!(rows[0].size_class, "10-19");
    }
}
