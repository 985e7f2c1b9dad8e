//! Calendar timestamps and nanosecond-since-epoch ordering.

use std::fmt;

use thiserror::Error;

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_DAY: i64 = 86_400;

const DAYS_IN_MONTH: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Errors produced while parsing the `YYYY-MM-DD HH:MM:SS.nnnnnnnnn` wire format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimestampParseError {
    #[error("timestamp '{0}' does not match YYYY-MM-DD HH:MM:SS.nnnnnnnnn")]
    MalformedFormat(String),
    #[error("timestamp field '{field}' is not a valid integer in '{value}'")]
    InvalidField { field: &'static str, value: String },
}

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i64, month: u32) -> i64 {
    if month == 2 && is_leap_year(year) {
        29
    } else {
        DAYS_IN_MONTH[(month - 1) as usize]
    }
}

/// A calendar timestamp, convertible to a signed nanosecond count since the
/// Unix epoch for ordering and arithmetic.
///
/// Unlike the backtester this type was modeled on, day counting here uses a
/// correct proleptic-Gregorian calendar (each month's real length, leap years
/// included) rather than assuming every month has 30 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub year: i64,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub nanosecond: u32,
}

impl Timestamp {
    pub fn new(
        year: i64,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        nanosecond: u32,
    ) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            nanosecond,
        }
    }

    /// Days elapsed from the epoch (1970-01-01) to this timestamp's date,
    /// counting real month lengths and leap years.
    fn days_since_epoch(&self) -> i64 {
        let mut days: i64 = 0;
        if self.year >= 1970 {
            for y in 1970..self.year {
                days += if is_leap_year(y) { 366 } else { 365 };
            }
        } else {
            for y in self.year..1970 {
                days -= if is_leap_year(y) { 366 } else { 365 };
            }
        }
        for m in 1..self.month {
            days += days_in_month(self.year, m);
        }
        days += (self.day - 1) as i64;
        days
    }

    /// Convert to nanoseconds since the Unix epoch, used as the total order
    /// for all comparisons and latency arithmetic.
    pub fn to_nanos_since_epoch(&self) -> i64 {
        let days = self.days_since_epoch();
        let seconds = days * SECONDS_PER_DAY
            + self.hour as i64 * SECONDS_PER_HOUR
            + self.minute as i64 * SECONDS_PER_MINUTE
            + self.second as i64;
        seconds * NANOS_PER_SECOND + self.nanosecond as i64
    }

    /// Parse `YYYY-MM-DD HH:MM:SS.nnnnnnnnn`.
    pub fn parse(text: &str) -> Result<Self, TimestampParseError> {
        let (date_part, time_part) = text
            .split_once(' ')
            .ok_or_else(|| TimestampParseError::MalformedFormat(text.to_string()))?;

        let mut date_fields = date_part.split('-');
        let year = parse_field(date_fields.next(), "year", text)?;
        let month = parse_field(date_fields.next(), "month", text)?;
        let day = parse_field(date_fields.next(), "day", text)?;
        if date_fields.next().is_some() {
            return Err(TimestampParseError::MalformedFormat(text.to_string()));
        }

        let (hms_part, nanos_part) = time_part
            .split_once('.')
            .ok_or_else(|| TimestampParseError::MalformedFormat(text.to_string()))?;
        let mut time_fields = hms_part.split(':');
        let hour = parse_field(time_fields.next(), "hour", text)?;
        let minute = parse_field(time_fields.next(), "minute", text)?;
        let second = parse_field(time_fields.next(), "second", text)?;
        if time_fields.next().is_some() {
            return Err(TimestampParseError::MalformedFormat(text.to_string()));
        }
        let nanosecond: u32 =
            nanos_part
                .parse()
                .map_err(|_| TimestampParseError::InvalidField {
                    field: "nanosecond",
                    value: nanos_part.to_string(),
                })?;

        Ok(Self::new(year, month, day, hour, minute, second, nanosecond))
    }
}

fn parse_field<T: std::str::FromStr>(
    value: Option<&str>,
    field: &'static str,
    original: &str,
) -> Result<T, TimestampParseError> {
    let raw = value.ok_or_else(|| TimestampParseError::MalformedFormat(original.to_string()))?;
    raw.parse()
        .map_err(|_| TimestampParseError::InvalidField {
            field,
            value: raw.to_string(),
        })
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:09}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.nanosecond
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_format() {
        let ts = Timestamp::parse("2024-03-15 12:30:00.000000001").unwrap();
        assert_eq!(ts.year, 2024);
        assert_eq!(ts.month, 3);
        assert_eq!(ts.day, 15);
        assert_eq!(ts.nanosecond, 1);
    }

    #[test]
    fn malformed_format_is_rejected() {
        assert!(Timestamp::parse("not-a-timestamp").is_err());
    }

    #[test]
    fn ordering_is_total_and_calendar_consistent() {
        let a = Timestamp::new(2024, 1, 31, 23, 59, 59, 999_999_999);
        let b = Timestamp::new(2024, 2, 1, 0, 0, 0, 0);
        assert!(a < b);
        assert_eq!(b.to_nanos_since_epoch() - a.to_nanos_since_epoch(), 1);
    }

    #[test]
    fn month_lengths_are_not_assumed_to_be_30_days() {
        // January has 31 days; a naive 30-day-month model would place
        // Feb 1st one day earlier than the correct calendar does.
        let jan_1 = Timestamp::new(2023, 1, 1, 0, 0, 0, 0);
        let feb_1 = Timestamp::new(2023, 2, 1, 0, 0, 0, 0);
        let delta_days =
            (feb_1.to_nanos_since_epoch() - jan_1.to_nanos_since_epoch()) / NANOS_PER_SECOND
                / SECONDS_PER_DAY;
        assert_eq!(delta_days, 31);
    }

    #[test]
    fn leap_year_february_has_29_days() {
        let feb_1 = Timestamp::new(2024, 2, 1, 0, 0, 0, 0);
        let mar_1 = Timestamp::new(2024, 3, 1, 0, 0, 0, 0);
        let delta_days =
            (mar_1.to_nanos_since_epoch() - feb_1.to_nanos_since_epoch()) / NANOS_PER_SECOND
                / SECONDS_PER_DAY;
        assert_eq!(delta_days, 29);
    }

    #[test]
    fn epoch_round_trips_to_zero() {
        let epoch = Timestamp::new(1970, 1, 1, 0, 0, 0, 0);
        assert_eq!(epoch.to_nanos_since_epoch(), 0);
    }
}
