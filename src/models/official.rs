//! Official benchmark series
//!
//! QCEW-, CES- and BED-style tables arrive in their own shapes. They are
//! normalised here to [`OfficialObservation`] (employment and establishments)
//! and [`BedObservation`] (establishment births), keyed like panel rows.

use chrono::NaiveDate;

use crate::models::cell::CellKey;
use crate::models::classification::{self, SizeClass};
use crate::models::period::{Quarter, align_day_of_month};

/// One official value for a (period, cell)
///
/// Monthly series set `ref_date` (and the derived quarter); quarterly-only
/// series set just `quarter`.
#[derive(Debug, Clone, PartialEq)]
pub struct OfficialObservation {
    pub ref_date: Option<NaiveDate>,
    pub quarter: Option<Quarter>,
    pub cell: CellKey,
    pub employment: Option<f64>,
    pub establishments: Option<f64>,
}

impl OfficialObservation {
    /// A monthly employment observation
    #[must_use]
    pub fn monthly(ref_date: NaiveDate, cell: CellKey, employment: f64) -> Self {
        Self {
            ref_date: Some(ref_date),
            quarter: Some(Quarter::from_date(ref_date)),
            cell,
            employment: Some(employment),
            establishments: None,
        }
    }

    /// A quarterly observation with no monthly date
    #[must_use]
    pub const fn quarterly(quarter: Quarter, cell: CellKey, employment: Option<f64>) -> Self {
        Self {
            ref_date: None,
            quarter: Some(quarter),
            cell,
            employment,
            establishments: None,
        }
    }

    #[must_use]
    pub const fn with_establishments(mut self, establishments: f64) -> Self {
        self.establishments = Some(establishments);
        self
    }
}

/// A QCEW quarter row with one employment level per month of the quarter
#[derive(Debug, Clone, PartialEq)]
pub struct QcewQuarterRecord {
    pub year: i32,
    pub qtr: u32,
    pub cell: CellKey,
    pub month1_emplvl: Option<f64>,
    pub month2_emplvl: Option<f64>,
    pub month3_emplvl: Option<f64>,
    pub qtrly_estabs_count: Option<f64>,
}

impl QcewQuarterRecord {
    /// Unpivot into one observation per month of the quarter
    ///
    /// Month `m` of quarter `q` becomes `(year, (q - 1) * 3 + m, day_of_month)`.
    /// Months with a missing level are dropped; the quarterly establishment
    /// count is repeated on every month.
    #[must_use]
    pub fn unpivot(&self, day_of_month: u32) -> Vec<OfficialObservation> {
        let Some(quarter) = Quarter::new(self.year, self.qtr) else {
            return Vec::new();
        };

        [self.month1_emplvl, self.month2_emplvl, self.month3_emplvl]
            .into_iter()
            .zip(1..=3)
            .filter_map(|(level, offset)| {
                let level = level?;
                let ref_date = quarter.month_date(offset, 1)?;
                let mut observation = OfficialObservation::monthly(
                    align_day_of_month(ref_date, day_of_month),
                    self.cell.clone(),
                    level,
                );
                observation.establishments = self.qtrly_estabs_count;
                Some(observation)
            })
            .collect()
    }
}

/// A CES supersector employment value
#[derive(Debug, Clone, PartialEq)]
pub struct CesRecord {
    pub date: NaiveDate,
    pub supersector: String,
    pub employment: f64,
}

impl CesRecord {
    /// Normalise to the panel's day-of-month convention
    #[must_use]
    pub fn to_observation(&self, day_of_month: u32) -> OfficialObservation {
        OfficialObservation::monthly(
            align_day_of_month(self.date, day_of_month),
            CellKey {
                supersector: Some(self.supersector.clone()),
                ..CellKey::default()
            },
            self.employment,
        )
    }
}

/// A BED row in its native coding
///
/// Totals are coded `000000` (industry), `0` (size class) and `00` (state).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BedRecord {
    pub year: i32,
    pub quarter: u32,
    pub naics_code: Option<String>,
    pub supersector: Option<String>,
    pub size_class: Option<String>,
    pub state_fips: Option<String>,
    pub births: Option<f64>,
    pub deaths: Option<f64>,
    pub total_establishments: Option<f64>,
    pub birth_rate: Option<f64>,
}

/// Establishment births for a (quarter, cell)
#[derive(Debug, Clone, PartialEq)]
pub struct BedObservation {
    pub quarter: Quarter,
    pub cell: CellKey,
    pub births: Option<f64>,
    pub deaths: Option<f64>,
    pub total_establishments: Option<f64>,
    pub birth_rate: Option<f64>,
}

impl BedRecord {
    /// Normalise to the panel's keys
    ///
    /// Returns `None` for an invalid quarter. A missing birth rate is derived
    /// as births / establishments when both are present and establishments > 0.
    #[must_use]
    pub fn normalize(&self) -> Option<BedObservation> {
        let quarter = Quarter::new(self.year, self.quarter)?;

        let supersector = self.supersector.clone().or_else(|| {
            self.naics_code
                .as_deref()
                .filter(|code| code.trim().trim_start_matches('0') != "")
                .map(|code| classification::supersector_for(&classification::naics2(code)).to_string())
        });
        let size_class = self
            .size_class
            .as_deref()
            .filter(|code| code.parse::<SizeClass>().is_ok())
            .map(str::to_string);
        let state_fips = self
            .state_fips
            .as_deref()
            .filter(|code| code.trim().trim_start_matches('0') != "")
            .map(str::to_string);

        let birth_rate = self.birth_rate.or_else(|| match (self.births, self.total_establishments) {
            (Some(births), Some(estabs)) if estabs > 0.0 => Some(births / estabs),
            _ => None,
        });

        Some(BedObservation {
            quarter,
            cell: CellKey {
                supersector,
                state_fips,
                size_class,
            },
            births: self.births,
            deaths: self.deaths,
            total_establishments: self.total_establishments,
            birth_rate,
        })
    }
}
