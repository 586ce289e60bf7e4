//! Calendar periods used to align panel and official series
//!
//! Panel rows carry both a monthly reference date and a quarter label. The
//! quarter is derived from the reference date and renders as `2020Q1`.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::PanelError;

/// A calendar quarter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quarter {
    /// Calendar year
    pub year: i32,
    /// Quarter within the year (1-4)
    pub quarter: u32,
}

impl Quarter {
    /// Create a quarter, returning `None` when `quarter` is outside 1-4
    #[must_use]
    pub fn new(year: i32, quarter: u32) -> Option<Self> {
        (1..=4).contains(&quarter).then_some(Self { year, quarter })
    }

    /// The quarter containing a date
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: (date.month() - 1) / 3 + 1,
        }
    }

    /// First calendar month of the quarter
    #[must_use]
    pub const fn first_month(&self) -> u32 {
        (self.quarter - 1) * 3 + 1
    }

    /// Date in the `offset`-th month of the quarter (1-3) on a fixed day of month
    #[must_use]
    pub fn month_date(&self, offset: u32, day_of_month: u32) -> Option<NaiveDate> {
        if !(1..=3).contains(&offset) {
            return None;
        }
        NaiveDate::from_ymd_opt(self.year, self.first_month() + offset - 1, day_of_month)
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

impl FromStr for Quarter {
    type Err = PanelError;

    /// Parse a quarter label
    ///
    /// Supported formats:
    /// - "2020Q1"
    /// - "2020-Q1"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PanelError::InvalidPeriod(s.to_string());
        let trimmed = s.trim();
        let (year_part, quarter_part) = trimmed.split_once('Q').ok_or_else(invalid)?;
        let year_part = year_part.strip_suffix('-').unwrap_or(year_part);

        if year_part.len() != 4 || quarter_part.len() != 1 {
            return Err(invalid());
        }

        let year = year_part.parse::<i32>().map_err(|_| invalid())?;
        let quarter = quarter_part.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, quarter).ok_or_else(invalid)
    }
}

impl Serialize for Quarter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quarter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether two dates fall in the same calendar month
#[must_use]
pub fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

/// Move a date to a fixed day of its month, clamping to the month's last day
#[must_use]
pub fn align_day_of_month(date: NaiveDate, day_of_month: u32) -> NaiveDate {
    (1..=day_of_month.max(1))
        .rev()
        .find_map(|day| NaiveDate::from_ymd_opt(date.year(), date.month(), day))
        .unwrap_or(date)
}

/// Whole days from `earlier` to `later`
#[must_use]
pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn quarter_from_date() {
        assert_eq!(Quarter::from_date(date(2019, 1, 12)).to_string(), "2019Q1");
        assert_eq!(Quarter::from_date(date(2019, 6, 12)).to_string(), "2019Q2");
        assert_eq!(Quarter::from_date(date(2019, 12, 12)).to_string(), "2019Q4");
    }

    #[test]
    fn parses_both_label_styles() {
        let q: Quarter = "2020Q3".parse().unwrap();
        assert_eq!(q, Quarter { year: 2020, quarter: 3 });
        let q: Quarter = "2020-Q3".parse().unwrap();
        assert_eq!(q, Quarter { year: 2020, quarter: 3 });
        assert!("2020Q5".parse::<Quarter>().is_err());
        assert!("20Q1".parse::<Quarter>().is_err());
        assert!("2020".parse::<Quarter>().is_err());
    }

    #[test]
    fn month_dates_inside_quarter() {
        let q = Quarter::new(2021, 2).unwrap();
        assert_eq!(q.month_date(1, 12), Some(date(2021, 4, 12)));
        assert_eq!(q.month_date(3, 12), Some(date(2021, 6, 12)));
        assert_eq!(q.month_date(4, 12), None);
    }

    #[test]
    fn aligns_to_day_of_month() {
        assert_eq!(align_day_of_month(date(2020, 2, 1), 12), date(2020, 2, 12));
        assert_eq!(align_day_of_month(date(2021, 2, 1), 31), date(2021, 2, 28));
        assert!(same_month(date(2020, 2, 1), date(2020, 2, 29)));
        assert!(!same_month(date(2020, 2, 1), date(2021, 2, 1)));
    }
}
