//! Client-month records
//!
//! One record per (client, reference month), with the classification fields
//! derived once at construction.

use chrono::NaiveDate;

use crate::models::cell::{CellKey, Dimension};
use crate::models::classification::{self, SizeClass};
use crate::models::period::{Quarter, same_month};

/// Whether a client's first appearance is a new establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BirthStatus {
    /// Confirmed new establishment
    Confirmed,
    /// Confirmed not new (acquisition, switch of provider, ...)
    Disconfirmed,
    /// Birth status could not be determined
    #[default]
    Undeterminable,
}

impl BirthStatus {
    /// Map a nullable birth flag
    #[must_use]
    pub const fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::Confirmed,
            Some(false) => Self::Disconfirmed,
            None => Self::Undeterminable,
        }
    }

    /// Nullable flag form
    #[must_use]
    pub const fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Confirmed => Some(true),
            Self::Disconfirmed => Some(false),
            Self::Undeterminable => None,
        }
    }

    #[must_use]
    pub const fn is_birth(&self) -> bool {
        matches!(self, Self::Confirmed)
    }

    #[must_use]
    pub const fn is_determinable(&self) -> bool {
        !matches!(self, Self::Undeterminable)
    }
}

/// Optional data available in a loaded client-month table
///
/// Computed once at load time and passed to the analyses that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub has_employee_id: bool,
    pub has_earnings: bool,
    pub has_flow_columns: bool,
    pub has_filing_date: bool,
}

impl Capabilities {
    /// Capabilities implied by the optional fields actually set on the records
    #[must_use]
    pub fn detect(records: &[ClientMonth]) -> Self {
        Self {
            has_employee_id: records.iter().any(|r| r.employee_id.is_some()),
            has_earnings: records.iter().any(|r| r.gross_pay.is_some()),
            has_flow_columns: records
                .iter()
                .any(|r| r.hires.is_some() && r.separations.is_some()),
            has_filing_date: records.iter().any(|r| r.filing_date.is_some()),
        }
    }
}

/// One client in one reference month
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMonth {
    pub client_id: String,
    pub ref_date: NaiveDate,
    pub entry_month: NaiveDate,
    pub exit_month: Option<NaiveDate>,
    pub birth: BirthStatus,
    /// Six-digit NAICS code
    pub naics_code: String,
    pub naics2: String,
    pub naics3: String,
    pub supersector: String,
    pub state_fips: String,
    pub employment: i64,
    pub size_class: SizeClass,
    pub quarter: Quarter,
    pub employee_id: Option<String>,
    pub gross_pay: Option<f64>,
    pub filing_date: Option<NaiveDate>,
    pub hires: Option<i64>,
    pub separations: Option<i64>,
}

impl ClientMonth {
    /// Create a record and derive its classification fields
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        ref_date: NaiveDate,
        entry_month: NaiveDate,
        exit_month: Option<NaiveDate>,
        birth: BirthStatus,
        naics_code: &str,
        state_fips: impl Into<String>,
        employment: i64,
    ) -> Self {
        let naics_code = classification::normalize_naics(naics_code);
        let naics2 = classification::naics2(&naics_code);
        Self {
            client_id: client_id.into(),
            ref_date,
            entry_month,
            exit_month,
            birth,
            naics3: classification::naics3(&naics_code),
            supersector: classification::supersector_for(&naics2).to_string(),
            naics2,
            naics_code,
            state_fips: state_fips.into(),
            employment,
            size_class: SizeClass::from_employment(employment),
            quarter: Quarter::from_date(ref_date),
            employee_id: None,
            gross_pay: None,
            filing_date: None,
            hires: None,
            separations: None,
        }
    }

    #[must_use]
    pub fn with_employee_id(mut self, employee_id: impl Into<String>) -> Self {
        self.employee_id = Some(employee_id.into());
        self
    }

    #[must_use]
    pub const fn with_gross_pay(mut self, gross_pay: f64) -> Self {
        self.gross_pay = Some(gross_pay);
        self
    }

    #[must_use]
    pub const fn with_filing_date(mut self, filing_date: NaiveDate) -> Self {
        self.filing_date = Some(filing_date);
        self
    }

    #[must_use]
    pub const fn with_flows(mut self, hires: i64, separations: i64) -> Self {
        self.hires = Some(hires);
        self.separations = Some(separations);
        self
    }

    /// The client enters in this record's reference month
    #[must_use]
    pub fn is_entry(&self) -> bool {
        same_month(self.entry_month, self.ref_date)
    }

    /// The client exits in this record's reference month; a missing exit month never matches
    #[must_use]
    pub fn is_exit(&self) -> bool {
        self.exit_month
            .is_some_and(|exit| same_month(exit, self.ref_date))
    }

    /// Neither entering nor exiting this month
    #[must_use]
    pub fn is_continuing(&self) -> bool {
        !self.is_entry() && !self.is_exit()
    }

    /// Value of one classification dimension
    #[must_use]
    pub fn key(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Supersector => &self.supersector,
            Dimension::Geography => &self.state_fips,
            Dimension::SizeClass => self.size_class.label(),
        }
    }

    /// Cell of this record restricted to the given dimensions
    #[must_use]
    pub fn cell(&self, dimensions: &[Dimension]) -> CellKey {
        let mut cell = CellKey::national();
        for &dimension in dimensions {
            cell.set(dimension, Some(self.key(dimension).to_string()));
        }
        cell
    }
}

/// A validated client-month table and the optional data it carries
#[derive(Debug, Clone, Default)]
pub struct ClientMonthTable {
    records: Vec<ClientMonth>,
    capabilities: Capabilities,
}

impl ClientMonthTable {
    /// Create a table, detecting capabilities from the records
    #[must_use]
    pub fn new(records: Vec<ClientMonth>) -> Self {
        let capabilities = Capabilities::detect(&records);
        Self {
            records,
            capabilities,
        }
    }

    /// Create a table with capabilities taken from the input schema
    #[must_use]
    pub const fn with_capabilities(records: Vec<ClientMonth>, capabilities: Capabilities) -> Self {
        Self {
            records,
            capabilities,
        }
    }

    #[must_use]
    pub fn records(&self) -> &[ClientMonth] {
        &self.records
    }

    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keep only the records of the given predicate, preserving capabilities
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&ClientMonth) -> bool) -> Self {
        Self {
            records: self.records.iter().filter(|r| predicate(r)).cloned().collect(),
            capabilities: self.capabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn derives_classification_fields() {
        let record = ClientMonth::new(
            "c1",
            date(2020, 5, 12),
            date(2019, 1, 12),
            None,
            BirthStatus::Confirmed,
            "236220",
            "06",
            12,
        );
        assert_eq!(record.naics2, "23");
        assert_eq!(record.naics3, "236");
        assert_eq!(record.supersector, "Construction");
        assert_eq!(record.size_class, SizeClass::From10To19);
        assert_eq!(record.quarter.to_string(), "2020Q2");
    }

    #[test]
    fn null_exit_is_not_an_exit() {
        let record = ClientMonth::new(
            "c1",
            date(2020, 5, 12),
            date(2020, 5, 1),
            None,
            BirthStatus::Undeterminable,
            "441110",
            "06",
            3,
        );
        assert!(record.is_entry());
        assert!(!record.is_exit());
        assert!(!record.is_continuing());
    }

    #[test]
    fn birth_status_tri_state() {
        assert!(BirthStatus::from_flag(Some(true)).is_birth());
        assert!(BirthStatus::from_flag(Some(false)).is_determinable());
        assert!(!BirthStatus::from_flag(Some(false)).is_birth());
        assert!(!BirthStatus::from_flag(None).is_determinable());
        assert_eq!(BirthStatus::Undeterminable.as_flag(), None);
    }

    #[test]
    fn capabilities_follow_optional_fields() {
        let base = ClientMonth::new(
            "c1",
            date(2020, 5, 12),
            date(2020, 1, 12),
            None,
            BirthStatus::Undeterminable,
            "441110",
            "06",
            3,
        );
        let table = ClientMonthTable::new(vec![base.clone().with_gross_pay(1000.0), base]);
        let caps = table.capabilities();
        assert!(caps.has_earnings);
        assert!(!caps.has_employee_id);
        assert!(!caps.has_flow_columns);
    }
}
