//! Classification cells
//!
//! A cell is a combination of classification keys. Every table in the crate
//! uses the same three nullable key columns so levels can be stacked and joined.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

use crate::error::PanelError;

/// A classification dimension that tables can be grouped or raked on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    /// Industry supersector
    Supersector,
    /// State FIPS code
    Geography,
    /// Establishment size class
    SizeClass,
}

/// Up to three dimensions, kept inline
pub type Dimensions = SmallVec<[Dimension; 3]>;

impl Dimension {
    /// All dimensions in column order
    pub const ALL: [Self; 3] = [Self::Supersector, Self::Geography, Self::SizeClass];

    /// Name of the key column holding this dimension
    #[must_use]
    pub const fn column(&self) -> &'static str {
        match self {
            Self::Supersector => "supersector",
            Self::Geography => "state_fips",
            Self::SizeClass => "size_class",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Dimension {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "supersector" => Ok(Self::Supersector),
            "state_fips" | "state" | "geography" => Ok(Self::Geography),
            "size_class" => Ok(Self::SizeClass),
            other => Err(PanelError::Config(format!(
                "unknown classification dimension '{other}'"
            ))),
        }
    }
}

impl Serialize for Dimension {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.column())
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Values of the classification keys for one cell; `None` means "all"
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
}

impl CellKey {
    /// The national cell (no keys set)
    #[must_use]
    pub fn national() -> Self {
        Self::default()
    }

    /// Value of one dimension
    #[must_use]
    pub fn get(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Supersector => self.supersector.as_deref(),
            Dimension::Geography => self.state_fips.as_deref(),
            Dimension::SizeClass => self.size_class.as_deref(),
        }
    }

    /// Set one dimension
    pub fn set(&mut self, dimension: Dimension, value: Option<String>) {
        match dimension {
            Dimension::Supersector => self.supersector = value,
            Dimension::Geography => self.state_fips = value,
            Dimension::SizeClass => self.size_class = value,
        }
    }

    /// Builder-style variant of [`CellKey::set`]
    #[must_use]
    pub fn with(mut self, dimension: Dimension, value: impl Into<String>) -> Self {
        self.set(dimension, Some(value.into()));
        self
    }

    /// Keep only the given dimensions, clearing the rest
    #[must_use]
    pub fn project(&self, dimensions: &[Dimension]) -> Self {
        let mut projected = Self::default();
        for &dimension in dimensions {
            projected.set(dimension, self.get(dimension).map(str::to_string));
        }
        projected
    }

    /// Dimensions that carry a value in this cell
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimension::ALL
            .iter()
            .copied()
            .filter(|d| self.get(*d).is_some())
            .collect()
    }

    /// Whether every given dimension carries a value
    #[must_use]
    pub fn has_all(&self, dimensions: &[Dimension]) -> bool {
        dimensions.iter().all(|d| self.get(*d).is_some())
    }
}
