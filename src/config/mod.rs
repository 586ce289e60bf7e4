//! Configuration for a pipeline run
//!
//! Loaded from a JSON file; every field except `payroll_path` has a default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::util::safe_read_to_string;
use crate::error::{PanelError, Result};
use crate::models::cell::Dimension;

/// Stopping rules for raking
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RakeConfig {
    /// Upper bound on iterations, reached or not
    pub max_iterations: usize,
    /// Stop once the largest weight change in an iteration is below this
    pub tolerance: f64,
    /// Rake each period separately when both sides carry periods
    pub split_by_period: bool,
}

impl Default for RakeConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            split_by_period: true,
        }
    }
}

impl RakeConfig {
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[must_use]
    pub const fn with_split_by_period(mut self, split_by_period: bool) -> Self {
        self.split_by_period = split_by_period;
        self
    }
}

/// Thresholds for labelling cells as reliable, marginal or insufficient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityThresholds {
    /// Minimum number of active clients in a cell
    pub min_clients: i64,
    /// Minimum employment coverage ratio
    pub min_coverage: f64,
}

impl Default for ReliabilityThresholds {
    fn default() -> Self {
        Self {
            min_clients: 30,
            min_coverage: 0.005,
        }
    }
}

/// Configuration for a full pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Client-month Parquet file or directory of files
    pub payroll_path: PathBuf,
    /// QCEW-style official employment series
    pub qcew_path: Option<PathBuf>,
    /// CES-style official employment series
    pub ces_path: Option<PathBuf>,
    /// BED-style establishment births
    pub bed_path: Option<PathBuf>,
    /// Root directory for outputs; tables go to `<output_dir>/analysis`
    pub output_dir: PathBuf,
    pub rake: RakeConfig,
    /// Dimensions raked in order within each iteration
    pub rake_dimensions: Vec<Dimension>,
    pub reliability: ReliabilityThresholds,
    /// Minimum tenure for the stable panel
    pub min_tenure_months: i64,
    /// Share of the latest vintage above which a period is flagged
    pub contamination_share: f64,
    /// Day of month official monthly dates are aligned to
    pub day_of_month: u32,
    /// Size of the rayon pool; defaults to the number of CPUs
    pub threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            payroll_path: PathBuf::from("data/payroll"),
            qcew_path: None,
            ces_path: None,
            bed_path: None,
            output_dir: PathBuf::from("output"),
            rake: RakeConfig::default(),
            rake_dimensions: vec![Dimension::Supersector],
            reliability: ReliabilityThresholds::default(),
            min_tenure_months: 12,
            contamination_share: 0.3,
            day_of_month: 12,
            threads: None,
        }
    }
}

impl PipelineConfig {
    /// Create a configuration for a payroll input with default settings
    #[must_use]
    pub fn new(payroll_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            payroll_path: payroll_path.into(),
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = safe_read_to_string(path, "reading pipeline configuration")?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.rake.max_iterations == 0 {
            return Err(PanelError::Config(
                "rake.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.rake.tolerance.is_nan() || self.rake.tolerance <= 0.0 {
            return Err(PanelError::Config(
                "rake.tolerance must be positive".to_string(),
            ));
        }
        if !(1..=28).contains(&self.day_of_month) {
            return Err(PanelError::Config(format!(
                "day_of_month must be between 1 and 28, got {}",
                self.day_of_month
            )));
        }
        if !(0.0..=1.0).contains(&self.contamination_share) {
            return Err(PanelError::Config(format!(
                "contamination_share must be within [0, 1], got {}",
                self.contamination_share
            )));
        }
        if self.threads == Some(0) {
            return Err(PanelError::Config("threads must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Directory analysis tables are written to
    #[must_use]
    pub fn analysis_dir(&self) -> PathBuf {
        self.output_dir.join("analysis")
    }

    #[must_use]
    pub fn with_qcew_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.qcew_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_ces_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ces_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_bed_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bed_path = Some(path.into());
        self
    }

    #[must_use]
    pub const fn with_rake(mut self, rake: RakeConfig) -> Self {
        self.rake = rake;
        self
    }

    #[must_use]
    pub fn with_rake_dimensions(mut self, dimensions: Vec<Dimension>) -> Self {
        self.rake_dimensions = dimensions;
        self
    }

    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipeline Configuration:")?;
        writeln!(f, "  Payroll: {}", self.payroll_path.display())?;
        if let Some(path) = &self.qcew_path {
            writeln!(f, "  QCEW: {}", path.display())?;
        }
        if let Some(path) = &self.ces_path {
            writeln!(f, "  CES: {}", path.display())?;
        }
        if let Some(path) = &self.bed_path {
            writeln!(f, "  BED: {}", path.display())?;
        }
        writeln!(f, "  Output: {}", self.output_dir.display())?;
        let dims: Vec<&str> = self.rake_dimensions.iter().map(Dimension::column).collect();
        writeln!(
            f,
            "  Raking: {:?}, max {} iterations, tolerance {:e}",
            dims, self.rake.max_iterations, self.rake.tolerance
        )?;
        writeln!(
            f,
            "  Reliability: >= {} clients, coverage >= {}",
            self.reliability.min_clients, self.reliability.min_coverage
        )?;
        writeln!(f, "  Stable panel tenure: {} months", self.min_tenure_months)?;
        if let Some(threads) = self.threads {
            writeln!(f, "  Threads: {threads}")?;
        }
        Ok(())
    }
}
