//! Panel construction
//!
//! Aggregates client-month records into the stacked six-level panel and
//! selects the long-tenure stable panel.

pub mod builder;
pub mod stable;

pub use builder::{build_panel, build_panel_levels};
pub use stable::filter_stable_panel;
