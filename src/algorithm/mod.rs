//! Analyses over the client-month panel
//!
//! Panel construction, reconciliation against official series, raking to
//! official margins and client/worker dynamics.

pub mod dynamics;
pub mod panel;
pub mod raking;
pub mod reconciliation;
