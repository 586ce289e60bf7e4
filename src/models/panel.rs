//! The stacked multi-level panel

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::PanelError;
use crate::models::cell::{CellKey, Dimension};
use crate::utils::arrow::table::{self, ArrowTable};

/// Grouping level of a panel row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AggregationLevel {
    National,
    Supersector,
    State,
    SizeClass,
    SupersectorState,
    SupersectorSizeClass,
}

impl AggregationLevel {
    /// All levels in output order
    pub const ALL: [Self; 6] = [
        Self::National,
        Self::Supersector,
        Self::State,
        Self::SizeClass,
        Self::SupersectorState,
        Self::SupersectorSizeClass,
    ];

    /// Level tag written to the `grouping_level` column
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::National => "national",
            Self::Supersector => "supersector",
            Self::State => "state",
            Self::SizeClass => "size_class",
            Self::SupersectorState => "supersector_state",
            Self::SupersectorSizeClass => "supersector_size_class",
        }
    }

    /// Grouping keys of the level
    #[must_use]
    pub const fn dimensions(&self) -> &'static [Dimension] {
        match self {
            Self::National => &[],
            Self::Supersector => &[Dimension::Supersector],
            Self::State => &[Dimension::Geography],
            Self::SizeClass => &[Dimension::SizeClass],
            Self::SupersectorState => &[Dimension::Supersector, Dimension::Geography],
            Self::SupersectorSizeClass => &[Dimension::Supersector, Dimension::SizeClass],
        }
    }

    /// The level grouped by exactly the given dimensions, in any order
    #[must_use]
    pub fn for_dimensions(dimensions: &[Dimension]) -> Option<Self> {
        Self::ALL.into_iter().find(|level| {
            level.dimensions().len() == dimensions.len()
                && dimensions.iter().all(|d| level.dimensions().contains(d))
        })
    }
}

impl fmt::Display for AggregationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregationLevel {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.name() == s.trim())
            .ok_or_else(|| PanelError::Config(format!("unknown aggregation level '{s}'")))
    }
}

/// Aggregated measures for one (level, reference date, cell)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelRow {
    pub grouping_level: String,
    pub ref_date: NaiveDate,
    pub quarter: String,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub payroll_employment: i64,
    pub client_count: i64,
    pub birth_count: i64,
    pub birth_determinable_count: i64,
    pub entry_count: i64,
    pub exit_count: i64,
    pub continuing_employment: i64,
}

impl PanelRow {
    /// Classification keys of the row
    #[must_use]
    pub fn cell(&self) -> CellKey {
        CellKey {
            supersector: self.supersector.clone(),
            state_fips: self.state_fips.clone(),
            size_class: self.size_class.clone(),
        }
    }

    #[must_use]
    pub fn is_level(&self, level: AggregationLevel) -> bool {
        self.grouping_level == level.name()
    }
}

impl ArrowTable for PanelRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![
            table::utf8("grouping_level", false),
            table::date("ref_date", false),
            table::utf8("quarter", false),
        ];
        fields.extend(table::cell_fields());
        fields.extend([
            table::int64("payroll_employment", false),
            table::int64("client_count", false),
            table::int64("birth_count", false),
            table::int64("birth_determinable_count", false),
            table::int64("entry_count", false),
            table::int64("exit_count", false),
            table::int64("continuing_employment", false),
        ]);
        fields
    }
}

/// Rows of one level, in panel order
#[must_use]
pub fn level_rows(panel: &[PanelRow], level: AggregationLevel) -> Vec<&PanelRow> {
    panel.iter().filter(|row| row.is_level(level)).collect()
}
