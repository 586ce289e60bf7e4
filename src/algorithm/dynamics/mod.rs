//! Client and worker dynamics of the payroll panel
//!
//! Job flows, client tenure, client entry and exit, vintage composition and
//! earnings distributions. The functions that depend on optional input data
//! take the table's [`Capabilities`](crate::models::Capabilities) into account
//! and return an empty table when their data is absent.

pub mod earnings;
pub mod flows;
pub mod tenure;
pub mod vintage;

pub use earnings::{
    EarningsGrowthRow, EarningsRow, compute_earnings_distribution, compute_earnings_growth,
};
pub use flows::{FlowSource, JobFlowRow, compute_job_flows};
pub use tenure::{
    ClientTenureRow, EntryExitRow, TenureSummaryRow, compute_client_entry_exit,
    compute_client_tenure, summarize_tenure,
};
pub use vintage::{VintageRow, VintageShareRow, compute_vintage_analysis, compute_vintage_shares};
