//! Calendar helpers
//!
//! Events carry naive local instants; persistence is keyed by calendar day
//! and partitioned by calendar month.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

/// A calendar month, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Create a month, returning None if `month` is not in 1..=12
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// The month a calendar day falls in
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        // year/month are validated on construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    /// The following month
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Check if a calendar day falls within this month
    pub fn contains(&self, date: NaiveDate) -> bool {
        Self::containing(date) == *self
    }

    /// Every month from the one containing `start` to the one containing
    /// `end`, inclusive. Empty if `end` precedes `start`.
    pub fn range(start: NaiveDate, end: NaiveDate) -> Vec<Month> {
        let mut months = Vec::new();
        if end < start {
            return months;
        }
        let last = Self::containing(end);
        let mut current = Self::containing(start);
        while current <= last {
            months.push(current);
            current = current.next();
        }
        months
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = String;

    /// Parse the `yyyy-MM` token used in partition file names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("expected yyyy-MM, got {:?}", s))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(format!("expected yyyy-MM, got {:?}", s));
        }
        let year: i32 = year.parse().map_err(|_| format!("bad year in {:?}", s))?;
        let month: u32 = month.parse().map_err(|_| format!("bad month in {:?}", s))?;
        Month::new(year, month).ok_or_else(|| format!("month out of range in {:?}", s))
    }
}

/// Calendar day of an instant
pub fn day_of(instant: NaiveDateTime) -> NaiveDate {
    instant.date()
}

/// Whole milliseconds between two instants, None if `end` precedes `start`
pub fn duration_millis(start: NaiveDateTime, end: NaiveDateTime) -> Option<i64> {
    let millis = (end - start).num_milliseconds();
    if millis < 0 {
        None
    } else {
        Some(millis)
    }
}

/// Source of "today" for components that react to wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    fn current_month(&self) -> Month {
        Month::containing(self.today())
    }
}

/// Local wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock frozen at a given instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_bounds() {
        let feb = Month::new(2024, 2).unwrap();
        assert_eq!(feb.first_day(), date(2024, 2, 1));
        assert_eq!(feb.last_day(), date(2024, 2, 29));
        assert!(feb.contains(date(2024, 2, 29)));
        assert!(!feb.contains(date(2024, 3, 1)));

        let dec = Month::new(2023, 12).unwrap();
        assert_eq!(dec.next(), Month::new(2024, 1).unwrap());
        assert_eq!(dec.last_day(), date(2023, 12, 31));
    }

    #[test]
    fn test_month_validation() {
        assert!(Month::new(2024, 0).is_none());
        assert!(Month::new(2024, 13).is_none());
    }

    #[test]
    fn test_month_range_spans_year() {
        let months = Month::range(date(2023, 11, 20), date(2024, 2, 3));
        let names: Vec<String> = months.iter().map(|m| m.to_string()).collect();
        assert_eq!(names, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);

        assert_eq!(Month::range(date(2024, 3, 5), date(2024, 3, 5)).len(), 1);
        assert!(Month::range(date(2024, 3, 5), date(2024, 3, 4)).is_empty());
    }

    #[test]
    fn test_month_parse() {
        assert_eq!("2024-03".parse::<Month>(), Ok(Month::new(2024, 3).unwrap()));
        assert!("2024-3".parse::<Month>().is_err());
        assert!("2024-13".parse::<Month>().is_err());
        assert!("garbage".parse::<Month>().is_err());
    }

    #[test]
    fn test_duration_millis() {
        let start = date(2024, 3, 5).and_hms_opt(10, 0, 0).unwrap();
        let end = date(2024, 3, 5).and_hms_milli_opt(10, 0, 1, 500).unwrap();
        assert_eq!(duration_millis(start, end), Some(1500));
        assert_eq!(duration_millis(end, start), None);
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock(date(2024, 3, 5).and_hms_opt(8, 0, 0).unwrap());
        assert_eq!(clock.today(), date(2024, 3, 5));
        assert_eq!(clock.current_month(), Month::new(2024, 3).unwrap());
    }
}
