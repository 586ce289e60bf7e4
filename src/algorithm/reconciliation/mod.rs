//! Reconciliation of the panel against official benchmark series
//!
//! Coverage, composition, growth, divergence and birth-rate comparisons. The
//! inputs are assumed to be normalised to the same (date or quarter, cell)
//! surface by the loaders.

pub mod births;
pub mod composition;
pub mod coverage;
pub mod divergence;
pub mod growth;

pub use births::{
    BirthComparisonRow, BirthRateRow, CompositionGapRow, compare_birth_determinable_composition,
    compare_birth_rates, compute_payroll_birth_rates,
};
pub use composition::{CsiRow, ShareRow, compute_composition_shift_index, compute_share_comparison};
pub use coverage::{
    CoverageRow, Reliability, classify_reliability, compute_cell_reliability, compute_coverage,
};
pub use divergence::{
    DivergenceRow, EmploymentChangeRow, decompose_employment_change, decompose_growth_divergence,
};
pub use growth::{
    GrowthComparisonRow, GrowthRow, SeriesPoint, TurningPointRow, analyze_turning_points,
    compare_growth, compute_growth_rates,
};

use crate::models::cell::{CellKey, Dimension};
use crate::models::official::OfficialObservation;

/// Whether a cell is keyed on exactly the given dimensions
pub(crate) fn keyed_exactly(cell: &CellKey, dimensions: &[Dimension]) -> bool {
    cell.has_all(dimensions) && cell.dimensions().len() == dimensions.len()
}

/// Official observations keyed on exactly the given dimensions
pub(crate) fn official_at<'a>(
    official: &'a [OfficialObservation],
    dimensions: &'a [Dimension],
) -> impl Iterator<Item = &'a OfficialObservation> + 'a {
    official
        .iter()
        .filter(move |obs| keyed_exactly(&obs.cell, dimensions))
}
