//! Industry and establishment-size classification
//!
//! Raw NAICS codes are collapsed to 2- and 3-digit prefixes and mapped to the
//! supersector names used by the official employment statistics. Employment
//! counts are binned into the QCEW size classes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PanelError;

/// Supersector used for codes missing from [`SUPERSECTOR_MAP`]
pub const DEFAULT_SUPERSECTOR: &str = "Other services";

/// Supersector names by 2-digit NAICS sector
pub const SUPERSECTOR_MAP: &[(&str, &str)] = &[
    ("11", "Mining and logging"),
    ("21", "Mining and logging"),
    ("22", "Utilities"),
    ("23", "Construction"),
    ("31", "Manufacturing"),
    ("32", "Manufacturing"),
    ("33", "Manufacturing"),
    ("42", "Wholesale trade"),
    ("44", "Retail trade"),
    ("45", "Retail trade"),
    ("48", "Transportation and warehousing"),
    ("49", "Transportation and warehousing"),
    ("51", "Information"),
    ("52", "Financial activities"),
    ("53", "Financial activities"),
    ("54", "Professional and business services"),
    ("55", "Professional and business services"),
    ("56", "Professional and business services"),
    ("61", "Education and health services"),
    ("62", "Education and health services"),
    ("71", "Leisure and hospitality"),
    ("72", "Leisure and hospitality"),
    ("81", "Other services"),
];

/// Normalise a NAICS code to six characters, left-padding with zeros
#[must_use]
pub fn normalize_naics(code: &str) -> String {
    format!("{:0>6}", code.trim())
}

/// First two digits of a NAICS code
#[must_use]
pub fn naics2(code: &str) -> String {
    normalize_naics(code).chars().take(2).collect()
}

/// First three digits of a NAICS code
#[must_use]
pub fn naics3(code: &str) -> String {
    normalize_naics(code).chars().take(3).collect()
}

/// Supersector name for a 2-digit NAICS sector
///
/// Longer codes are truncated to their sector, shorter ones zero-padded.
#[must_use]
pub fn supersector_for(code: &str) -> &'static str {
    let trimmed = code.trim();
    let key: String = if trimmed.len() <= 2 {
        format!("{trimmed:0>2}")
    } else {
        trimmed.chars().take(2).collect()
    };

    SUPERSECTOR_MAP
        .iter()
        .find(|(sector, _)| *sector == key)
        .map_or(DEFAULT_SUPERSECTOR, |(_, name)| name)
}

/// Establishment size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SizeClass {
    /// 1-4 employees (also used for zero or negative counts)
    Under5,
    /// 5-9 employees
    From5To9,
    /// 10-19 employees
    From10To19,
    /// 20-49 employees
    From20To49,
    /// 50-99 employees
    From50To99,
    /// 100-249 employees
    From100To249,
    /// 250-499 employees
    From250To499,
    /// 500 or more employees
    Over500,
}

/// Inclusive upper bounds for every bin except the open-ended top class
const SIZE_CLASS_UPPERS: [(i64, SizeClass); 7] = [
    (4, SizeClass::Under5),
    (9, SizeClass::From5To9),
    (19, SizeClass::From10To19),
    (49, SizeClass::From20To49),
    (99, SizeClass::From50To99),
    (249, SizeClass::From100To249),
    (499, SizeClass::From250To499),
];

impl SizeClass {
    /// All size classes in ascending order
    pub const ALL: [Self; 8] = [
        Self::Under5,
        Self::From5To9,
        Self::From10To19,
        Self::From20To49,
        Self::From50To99,
        Self::From100To249,
        Self::From250To499,
        Self::Over500,
    ];

    /// Assign a size class from an employment count
    #[must_use]
    pub fn from_employment(employment: i64) -> Self {
        SIZE_CLASS_UPPERS
            .iter()
            .find(|(upper, _)| employment <= *upper)
            .map_or(Self::Over500, |(_, class)| *class)
    }

    /// Label used in tables, e.g. `"10-19"`
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Under5 => "1-4",
            Self::From5To9 => "5-9",
            Self::From10To19 => "10-19",
            Self::From20To49 => "20-49",
            Self::From50To99 => "50-99",
            Self::From100To249 => "100-249",
            Self::From250To499 => "250-499",
            Self::Over500 => "500+",
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SizeClass {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|class| class.label() == s.trim())
            .copied()
            .ok_or_else(|| PanelError::InvalidValue {
                column: "size_class".to_string(),
                row: 0,
                message: format!("unknown size class '{s}'"),
            })
    }
}

impl Serialize for SizeClass {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for SizeClass {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
