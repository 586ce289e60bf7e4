//! Domain models for the payroll panel
//!
//! Client-month inputs, official benchmark observations, classification
//! cells and the stacked panel.

pub mod cell;
pub mod classification;
pub mod client_month;
pub mod official;
pub mod panel;
pub mod period;

// Re-export commonly used types
pub use cell::{CellKey, Dimension, Dimensions};
pub use classification::SizeClass;
pub use client_month::{BirthStatus, Capabilities, ClientMonth, ClientMonthTable};
pub use official::{BedObservation, BedRecord, CesRecord, OfficialObservation, QcewQuarterRecord};
pub use panel::{AggregationLevel, PanelRow};
pub use period::Quarter;
