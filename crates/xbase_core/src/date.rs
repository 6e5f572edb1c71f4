//! Calendar dates in the `CCYYMMDD` wire format.
//!
//! Index keys store dates as Julian day numbers so that ordering and
//! differences are plain double arithmetic.

use crate::error::{XbError, XbResult};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Julian day number of 1970-01-01.
const UNIX_EPOCH_JULIAN: i64 = 2_440_588;

/// A proleptic Gregorian calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    year: i32,
    month: u32,
    day: u32,
}

impl Date {
    /// Builds a date, validating month and day.
    ///
    /// # Errors
    ///
    /// Returns [`XbError::InvalidDate`] if the components do not form a date.
    pub fn new(year: i32, month: u32, day: u32) -> XbResult<Self> {
        if !(1..=9999).contains(&year)
            || !(1..=12).contains(&month)
            || day == 0
            || day > days_in_month(year, month)
        {
            return Err(XbError::InvalidDate(format!(
                "{year:04}{month:02}{day:02}"
            )));
        }
        Ok(Self { year, month, day })
    }

    /// Parses an eight-character `CCYYMMDD` string.
    ///
    /// # Errors
    ///
    /// Returns [`XbError::InvalidDate`] for anything else.
    pub fn parse(text: &str) -> XbResult<Self> {
        let bytes = text.as_bytes();
        if bytes.len() != 8 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(XbError::InvalidDate(text.to_string()));
        }
        let num = |range: std::ops::Range<usize>| -> u32 {
            bytes[range]
                .iter()
                .fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
        };
        Self::new(num(0..4) as i32, num(4..6), num(6..8))
    }

    /// Today's date in UTC.
    #[must_use]
    pub fn today() -> Self {
        let days = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() / 86_400)
            .unwrap_or(0);
        Self::from_julian(UNIX_EPOCH_JULIAN + days as i64)
    }

    /// Converts a Julian day number back to a calendar date.
    #[must_use]
    pub fn from_julian(julian: i64) -> Self {
        let a = julian + 32_044;
        let b = (4 * a + 3) / 146_097;
        let c = a - 146_097 * b / 4;
        let d = (4 * c + 3) / 1461;
        let e = c - 1461 * d / 4;
        let m = (5 * e + 2) / 153;
        let day = (e - (153 * m + 2) / 5 + 1) as u32;
        let month = (m + 3 - 12 * (m / 10)) as u32;
        let year = (100 * b + d - 4800 + m / 10) as i32;
        Self { year, month, day }
    }

    /// Julian day number of this date.
    #[must_use]
    pub fn julian(&self) -> i64 {
        let a = (14 - i64::from(self.month)) / 12;
        let y = i64::from(self.year) + 4800 - a;
        let m = i64::from(self.month) + 12 * a - 3;
        i64::from(self.day) + (153 * m + 2) / 5 + 365 * y + y / 4 - y / 100 + y / 400 - 32_045
    }

    /// Year component.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Month component, 1-based.
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }

    /// Day component, 1-based.
    #[must_use]
    pub const fn day(&self) -> u32 {
        self.day
    }

    /// `CCYYMMDD` form.
    #[must_use]
    pub fn to_date8(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}

/// Julian day number for a stored date field; blank dates map to zero.
///
/// # Errors
///
/// Returns [`XbError::InvalidDate`] for a non-blank value that is not a date.
pub fn julian_of_field(raw: &[u8]) -> XbResult<f64> {
    if raw.iter().all(|&b| b == b' ' || b == 0) {
        return Ok(0.0);
    }
    let text = String::from_utf8_lossy(raw);
    Ok(Date::parse(text.trim())?.julian() as f64)
}

fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if is_leap(year) => 29,
        2 => 28,
        _ => 31,
    }
}
