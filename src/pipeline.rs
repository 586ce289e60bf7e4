//! End-to-end pipeline run
//!
//! Loads the client-month panel and whichever official series are configured,
//! runs every analysis in a fixed order and writes each result table as
//! `<output_dir>/analysis/<name>.parquet`. A `run_summary.json` next to the
//! tables records row counts and the raking outcome.

use indicatif::ProgressBar;
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::algorithm::dynamics::{
    compute_client_entry_exit, compute_client_tenure, compute_earnings_distribution,
    compute_earnings_growth, compute_job_flows, compute_vintage_analysis, compute_vintage_shares,
    summarize_tenure,
};
use crate::algorithm::panel::{build_panel, filter_stable_panel};
use crate::algorithm::raking::{compute_raked_growth, rake_to_official, weight_rows};
use crate::algorithm::reconciliation::{
    GrowthRow, SeriesPoint, ShareRow, analyze_turning_points, compare_birth_determinable_composition,
    compare_birth_rates, compare_growth, compute_cell_reliability,
    compute_composition_shift_index, compute_coverage, compute_growth_rates,
    compute_payroll_birth_rates, compute_share_comparison, decompose_employment_change,
    decompose_growth_divergence,
};
use crate::config::PipelineConfig;
use crate::error::util::ensure_directory;
use crate::error::{PanelError, Result};
use crate::loader::{load_bed_series, load_ces_series, load_client_months, load_official_series};
use crate::models::cell::Dimension;
use crate::models::client_month::ClientMonthTable;
use crate::models::official::{BedObservation, OfficialObservation};
use crate::models::panel::{AggregationLevel, PanelRow};
use crate::utils::arrow::ArrowTable;
use crate::utils::io::write_parquet;
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar, log_table_written};

/// Number of progress steps in a run
const STAGES: u64 = 15;

/// Levels growth is compared on
const GROWTH_LEVELS: [AggregationLevel; 2] =
    [AggregationLevel::National, AggregationLevel::Supersector];

/// Outcome of the raking stage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RakeSummary {
    pub dimensions: Vec<Dimension>,
    pub iterations: usize,
    pub converged: bool,
    pub max_change: f64,
}

/// What a run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Rows written per table name
    pub tables: BTreeMap<String, usize>,
    pub client_months: usize,
    pub rake: RakeSummary,
    pub elapsed_seconds: f64,
}

impl RunSummary {
    /// Rows written for a table, if it was written
    #[must_use]
    pub fn rows(&self, table: &str) -> Option<usize> {
        self.tables.get(table).copied()
    }
}

/// Official inputs of a run
#[derive(Debug, Default)]
struct Benchmarks {
    qcew: Option<Vec<OfficialObservation>>,
    ces: Option<Vec<OfficialObservation>>,
    bed: Option<Vec<BedObservation>>,
}

impl Benchmarks {
    /// Series for employment levels: coverage, shares and raking
    ///
    /// QCEW when configured, CES otherwise.
    fn levels(&self) -> Option<&[OfficialObservation]> {
        self.qcew.as_deref().or(self.ces.as_deref())
    }

    /// Series for month-to-month growth: comparison and divergence
    ///
    /// CES when configured, QCEW otherwise.
    fn growth(&self) -> Option<&[OfficialObservation]> {
        self.ces.as_deref().or(self.qcew.as_deref())
    }
}

/// A configured pipeline run
pub struct Pipeline {
    config: PipelineConfig,
    analysis_dir: PathBuf,
    summary: RunSummary,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        let analysis_dir = config.analysis_dir();
        Self {
            config,
            analysis_dir,
            summary: RunSummary::default(),
        }
    }

    /// Run every stage on a dedicated rayon pool and return the summary
    pub fn run(mut self) -> Result<RunSummary> {
        self.config.validate()?;
        let threads = self.config.threads.unwrap_or_else(num_cpus::get);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| PanelError::Config(format!("cannot build thread pool: {e}")))?;

        info!("Starting payroll panel run on {threads} threads");
        info!("{}", self.config);
        pool.install(|| self.run_stages())?;
        Ok(self.summary)
    }

    fn run_stages(&mut self) -> Result<()> {
        let start = Instant::now();
        ensure_directory(&self.analysis_dir, "creating analysis output directory")?;
        let pb = create_main_progress_bar(STAGES, Some("Loading inputs"));

        let table = load_client_months(&self.config.payroll_path)?;
        self.summary.client_months = table.len();
        let benchmarks = self.load_benchmarks()?;
        pb.inc(1);

        advance(&pb, "Building panel");
        let panel = build_panel(table.records());
        self.write("panel", &panel)?;
        let stable = filter_stable_panel(&table, self.config.min_tenure_months);
        self.write("stable_panel", &build_panel(stable.records()))?;

        advance(&pb, "Coverage");
        self.coverage(&panel, benchmarks.levels())?;

        advance(&pb, "Composition");
        self.composition(&panel, benchmarks.levels())?;

        advance(&pb, "Growth");
        self.growth(&panel, benchmarks.growth())?;

        advance(&pb, "Growth divergence");
        self.divergence(&panel, benchmarks.growth())?;

        advance(&pb, "Employment change");
        let mut changes = decompose_employment_change(table.records(), &[]);
        changes.extend(decompose_employment_change(
            table.records(),
            &[Dimension::Supersector],
        ));
        self.write("employment_change", &changes)?;

        advance(&pb, "Job flows");
        let mut flows = compute_job_flows(&table, &[]);
        flows.extend(compute_job_flows(&table, &[Dimension::Supersector]));
        self.write("job_flows", &flows)?;

        advance(&pb, "Client dynamics");
        self.client_dynamics(&table)?;

        advance(&pb, "Vintage");
        self.write("vintage", &compute_vintage_analysis(table.records(), &[]))?;
        self.write(
            "vintage_shares",
            &compute_vintage_shares(table.records(), self.config.contamination_share),
        )?;

        advance(&pb, "Earnings");
        let mut earnings = compute_earnings_distribution(&table, &[]);
        earnings.extend(compute_earnings_distribution(&table, &[Dimension::Supersector]));
        self.write("earnings_distribution", &earnings)?;
        let mut earnings_growth = compute_earnings_growth(&table, &[]);
        earnings_growth.extend(compute_earnings_growth(&table, &[Dimension::Supersector]));
        self.write("earnings_growth", &earnings_growth)?;

        advance(&pb, "Raking");
        self.raking(&table, benchmarks.levels())?;

        advance(&pb, "Births");
        self.births(&panel, &table, benchmarks.bed.as_deref())?;

        advance(&pb, "Writing summary");
        self.summary.elapsed_seconds = start.elapsed().as_secs_f64();
        self.write_summary()?;
        pb.inc(1);
        finish_progress_bar(&pb, Some("Run complete"));

        info!(
            "Wrote {} tables to {} in {:?}",
            self.summary.tables.len(),
            self.analysis_dir.display(),
            start.elapsed()
        );
        Ok(())
    }

    fn load_benchmarks(&self) -> Result<Benchmarks> {
        let day = self.config.day_of_month;
        let qcew = match &self.config.qcew_path {
            Some(path) => Some(load_official_series(path, day)?),
            None => None,
        };
        let ces = match &self.config.ces_path {
            Some(path) => Some(load_ces_series(path, day)?),
            None => None,
        };
        if qcew.is_none() && ces.is_none() {
            warn!("No official employment series configured; benchmark outputs will be empty");
        }
        let bed = match &self.config.bed_path {
            Some(path) => Some(load_bed_series(path)?),
            None => {
                warn!("No BED series configured; birth comparison will be empty");
                None
            }
        };
        Ok(Benchmarks { qcew, ces, bed })
    }

    fn coverage(&mut self, panel: &[PanelRow], official: Option<&[OfficialObservation]>) -> Result<()> {
        let rows = official.map_or_else(Vec::new, |official| {
            let coverage = AggregationLevel::ALL
                .iter()
                .flat_map(|level| compute_coverage(panel, official, level.dimensions()))
                .collect();
            compute_cell_reliability(coverage, &self.config.reliability)
        });
        self.write("coverage", &rows)
    }

    fn composition(
        &mut self,
        panel: &[PanelRow],
        official: Option<&[OfficialObservation]>,
    ) -> Result<()> {
        let shares: Vec<ShareRow> = official.map_or_else(Vec::new, |official| {
            Dimension::ALL
                .iter()
                .flat_map(|&dimension| compute_share_comparison(panel, official, dimension))
                .collect()
        });
        self.write("share_comparison", &shares)?;

        let csi: Vec<_> = Dimension::ALL
            .iter()
            .flat_map(|&dimension| compute_composition_shift_index(panel, dimension))
            .collect();
        self.write("composition_shift_index", &csi)
    }

    fn growth(&mut self, panel: &[PanelRow], official: Option<&[OfficialObservation]>) -> Result<()> {
        let official = official.unwrap_or_default();
        let mut payroll_growth = Vec::new();
        let mut official_growth = Vec::new();
        let mut comparison = Vec::new();
        let mut national: (Vec<GrowthRow>, Vec<GrowthRow>) = (Vec::new(), Vec::new());

        for level in GROWTH_LEVELS {
            let dims = level.dimensions();
            let payroll = compute_growth_rates(&SeriesPoint::from_panel(panel, level), dims);
            let benchmark = compute_growth_rates(&SeriesPoint::from_official(official, dims), dims);
            comparison.extend(compare_growth(&payroll, &benchmark));
            if level == AggregationLevel::National {
                national = (payroll.clone(), benchmark.clone());
            }
            payroll_growth.extend(payroll);
            official_growth.extend(benchmark);
        }

        self.write("payroll_growth", &payroll_growth)?;
        self.write("official_growth", &official_growth)?;
        self.write("growth_comparison", &comparison)?;
        self.write("turning_points", &analyze_turning_points(&national.0, &national.1))
    }

    fn divergence(
        &mut self,
        panel: &[PanelRow],
        official: Option<&[OfficialObservation]>,
    ) -> Result<()> {
        let official = official.unwrap_or_default();
        let national = AggregationLevel::National;
        let mut rows = decompose_growth_divergence(
            &SeriesPoint::from_panel(panel, national),
            &SeriesPoint::from_official(official, national.dimensions()),
            None,
        );
        for dimension in Dimension::ALL {
            let Some(level) = AggregationLevel::for_dimensions(&[dimension]) else {
                continue;
            };
            rows.extend(decompose_growth_divergence(
                &SeriesPoint::from_panel(panel, level),
                &SeriesPoint::from_official(official, level.dimensions()),
                Some(dimension),
            ));
        }
        self.write("growth_divergence", &rows)
    }

    fn client_dynamics(&mut self, table: &ClientMonthTable) -> Result<()> {
        let records = table.records();
        self.write("client_tenure", &compute_client_tenure(records))?;
        self.write(
            "tenure_summary",
            &summarize_tenure(records, Dimension::Supersector),
        )?;
        let mut entry_exit = compute_client_entry_exit(records, &[]);
        entry_exit.extend(compute_client_entry_exit(records, &[Dimension::Supersector]));
        self.write("client_entry_exit", &entry_exit)
    }

    fn raking(
        &mut self,
        table: &ClientMonthTable,
        official: Option<&[OfficialObservation]>,
    ) -> Result<()> {
        let records = table.records();
        let dimensions = self.config.rake_dimensions.clone();
        let outcome = rake_to_official(
            records,
            official.unwrap_or_default(),
            &dimensions,
            &self.config.rake,
        );
        self.summary.rake = RakeSummary {
            dimensions,
            iterations: outcome.iterations,
            converged: outcome.converged,
            max_change: outcome.max_change,
        };
        self.write("rake_weights", &weight_rows(records, &outcome))?;
        self.write("raked_growth", &compute_raked_growth(records, &outcome))
    }

    fn births(
        &mut self,
        panel: &[PanelRow],
        table: &ClientMonthTable,
        bed: Option<&[BedObservation]>,
    ) -> Result<()> {
        let mut rates = Vec::new();
        let mut comparison = Vec::new();
        for level in GROWTH_LEVELS {
            let level_rates = compute_payroll_birth_rates(panel, level);
            if let Some(bed) = bed {
                comparison.extend(compare_birth_rates(&level_rates, bed, level.dimensions()));
            }
            rates.extend(level_rates);
        }
        self.write("payroll_birth_rates", &rates)?;
        self.write("birth_rate_comparison", &comparison)?;
        self.write(
            "birth_composition_gap",
            &compare_birth_determinable_composition(table.records()),
        )
    }

    /// Write one table and record its row count
    fn write<T: ArrowTable>(&mut self, name: &str, rows: &[T]) -> Result<()> {
        let batch = T::to_record_batch(rows)?;
        let path = self.table_path(name);
        write_parquet(&path, &batch)?;
        log_table_written(name, &path, rows.len());
        self.summary.tables.insert(name.to_string(), rows.len());
        Ok(())
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.analysis_dir.join(format!("{name}.parquet"))
    }

    fn write_summary(&self) -> Result<()> {
        let path = self.analysis_dir.join("run_summary.json");
        write_json(&path, &self.summary)
    }
}

fn advance(pb: &ProgressBar, message: &'static str) {
    pb.inc(1);
    pb.set_message(message);
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(|e| {
        PanelError::io_with_source("Failed to write run summary", e).with_path(path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::arrow::extract_f64_column;
    use crate::utils::io::read_parquet_path;
    use crate::utils::test::{
        official_from_records, synthetic_panel, write_client_months, write_official,
    };

    #[test]
    fn run_without_benchmarks_writes_empty_comparisons() {
        let dir = tempfile::tempdir().unwrap();
        let payroll = dir.path().join("payroll.parquet");
        let table = synthetic_panel(5, 40, 14);
        write_client_months(&payroll, table.records()).unwrap();

        let config = PipelineConfig::new(&payroll, dir.path().join("out")).with_threads(2);
        let summary = Pipeline::new(config).run().unwrap();

        assert_eq!(summary.client_months, table.len());
        assert!(summary.rows("panel").unwrap() > 0);
        assert_eq!(summary.rows("coverage"), Some(0));
        assert_eq!(summary.rows("birth_rate_comparison"), Some(0));
        assert_eq!(summary.rake.iterations, 0);
        assert!(summary.rake.converged);
        assert!(dir.path().join("out/analysis/panel.parquet").exists());
        assert!(dir.path().join("out/analysis/run_summary.json").exists());
    }

    #[test]
    fn run_with_official_series_rakes_and_compares() {
        let dir = tempfile::tempdir().unwrap();
        let payroll = dir.path().join("payroll.parquet");
        let qcew = dir.path().join("qcew.parquet");
        let table = synthetic_panel(9, 60, 14);
        write_client_months(&payroll, table.records()).unwrap();
        let mut official = official_from_records(table.records(), &[], 3.0);
        official.extend(official_from_records(
            table.records(),
            &[Dimension::Supersector],
            3.0,
        ));
        write_official(&qcew, &official).unwrap();

        let config = PipelineConfig::new(&payroll, dir.path().join("out"))
            .with_qcew_path(&qcew)
            .with_threads(1);
        let summary = Pipeline::new(config).run().unwrap();

        assert!(summary.rows("coverage").unwrap() > 0);
        assert!(summary.rows("growth_comparison").unwrap() > 0);
        assert!(summary.rake.iterations >= 1);
        assert!(summary.rake.converged);
        assert_eq!(summary.rows("rake_weights"), Some(table.len()));
    }

    #[test]
    fn growth_uses_ces_and_levels_use_qcew() {
        let dir = tempfile::tempdir().unwrap();
        let payroll = dir.path().join("payroll.parquet");
        let qcew = dir.path().join("qcew.parquet");
        let ces = dir.path().join("ces.parquet");
        let table = synthetic_panel(11, 60, 14);
        write_client_months(&payroll, table.records()).unwrap();

        let mut levels = official_from_records(table.records(), &[], 3.0);
        levels.extend(official_from_records(
            table.records(),
            &[Dimension::Supersector],
            3.0,
        ));
        write_official(&qcew, &levels).unwrap();
        let growth = official_from_records(table.records(), &[Dimension::Supersector], 2.0);
        write_official(&ces, &growth).unwrap();

        let config = PipelineConfig::new(&payroll, dir.path().join("out"))
            .with_qcew_path(&qcew)
            .with_ces_path(&ces)
            .with_threads(1);
        let summary = Pipeline::new(config).run().unwrap();

        assert_eq!(summary.rows("official_growth"), Some(growth.len()));
        assert!(summary.rows("growth_comparison").unwrap() > 0);
        assert!(summary.rake.converged);

        let weights_path = dir.path().join("out/analysis/rake_weights.parquet");
        let batches = read_parquet_path(&weights_path).unwrap();
        let weights: Vec<f64> = batches
            .iter()
            .flat_map(|b| extract_f64_column(b, "rake_weight", true).unwrap().unwrap())
            .flatten()
            .collect();
        assert_eq!(weights.len(), table.len());
        assert!(weights.iter().any(|w| (w - 3.0).abs() < 1e-9));
        assert!(weights.iter().all(|w| (w - 3.0).abs() < 1e-9 || (w - 1.0).abs() < 1e-9));
    }
}
