//! Calendar month keys and the free-text SOP dates that resolve to them.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static FILENAME_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}-\d{2})").expect("Invalid filename month regex"));

/// Full-date layouts accepted for SOP text, tried in order.
const SOP_DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%Y-%m-%d"];

/// Month-only SOP layouts: (prefix, suffix, full-date format after padding with day 01).
const SOP_MONTH_FORMATS: &[(&str, &str, &str)] = &[
    ("01/", "", "%d/%m/%Y"),
    ("", "-01", "%Y-%m-%d"),
    ("01.", "", "%d.%m.%Y"),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid month '{input}': expected YYYY-MM")]
pub struct MonthParseError {
    pub input: String,
}

/// A calendar month, ordered chronologically and rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (0..=9999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn next(self) -> Self {
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

    /// Signed number of months from `self` to `later` (negative when `later` is earlier).
    pub fn months_until(self, later: MonthKey) -> i64 {
        (i64::from(later.year) - i64::from(self.year)) * 12
            + (i64::from(later.month) - i64::from(self.month))
    }

    fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = MonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || MonthParseError {
            input: s.to_string(),
        };
        let (year, month) = s.split_once('-').ok_or_else(err)?;
        if year.len() != 4 || !(1..=2).contains(&month.len()) {
            return Err(err());
        }
        if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let year: i32 = year.parse().map_err(|_| err())?;
        let month: u32 = month.parse().map_err(|_| err())?;
        MonthKey::new(year, month).ok_or_else(err)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Every month from `from` to `to`, both inclusive. Empty when `to < from`.
pub fn months_inclusive(from: MonthKey, to: MonthKey) -> Vec<MonthKey> {
    let mut months = Vec::new();
    let mut cur = from;
    while cur <= to {
        months.push(cur);
        cur = cur.next();
    }
    months
}

/// Resolve SOP text to the month it falls in.
///
/// Accepts `DD.MM.YYYY`, `YYYY-MM-DD`, `MM/YYYY`, `YYYY-MM` and `MM.YYYY`.
/// Anything else, including blank text, means no SOP month is known.
pub fn parse_sop_month(text: &str) -> Option<MonthKey> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    for fmt in SOP_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(MonthKey::from_date(date));
        }
    }
    for (prefix, suffix, fmt) in SOP_MONTH_FORMATS {
        let padded = format!("{prefix}{text}{suffix}");
        if let Ok(date) = NaiveDate::parse_from_str(&padded, fmt) {
            return Some(MonthKey::from_date(date));
        }
    }
    None
}

/// First `YYYY-MM` found in an upload's file name.
pub fn month_from_filename(name: &str) -> Option<MonthKey> {
    FILENAME_MONTH
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
