//! Gregorian calendar arithmetic for the locally extrapolated clock.
//!
//! A [CalendarMoment] only ever moves forward one minute (or, for long
//! gaps, one day) at a time, so the rollover rules here are the whole
//! story: minute into hour, hour into day, day into month, month into year.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

pub const MINUTES_PER_HOUR: u32 = 60;
pub const HOURS_PER_DAY: u32 = 24;
pub const MINUTES_PER_DAY: u64 = (MINUTES_PER_HOUR * HOURS_PER_DAY) as u64;

const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Number of days in `month` (1-12) of `year`. Returns 0 for a month
/// outside that range.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        2 if is_leap_year(year) => 29,
        1..=12 => DAYS_IN_MONTH[month as usize - 1],
        _ => 0,
    }
}

/// Weekday index for a date, 0 being Monday.
pub fn weekday_for(year: i32, month: u32, day: u32) -> Option<u32> {
    NaiveDate::from_ymd_opt(year, month, day).map(|date| date.weekday().num_days_from_monday())
}

/// The authoritative time payload as handed over by a time source. Every
/// field is kept as the raw text the source returned; turning it into a
/// [CalendarMoment] is the core's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePayload {
    pub hour: String,
    pub minute: String,
    pub day: String,
    pub month: String,
    pub year: String,
    pub weekday: String,
}

/// A wall-clock date and time at minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarMoment {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    weekday: u32,
}

fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<i64, PayloadError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(PayloadError::OutOfRange { field, value })
    }
}

fn parse_number(field: &'static str, value: &str) -> Result<i64, PayloadError> {
    value
        .trim()
        .parse()
        .map_err(|_| PayloadError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

fn parse_weekday(value: &str) -> Result<u32, PayloadError> {
    Weekday::from_str(value.trim())
        .map(|weekday| weekday.num_days_from_monday())
        .map_err(|_| PayloadError::UnknownWeekday(value.to_string()))
}

impl CalendarMoment {
    pub fn new(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        weekday: u32,
    ) -> Result<Self, PayloadError> {
        check_range("year", year.into(), 1, 9999)?;
        check_range("month", month.into(), 1, 12)?;
        check_range("day", day.into(), 1, days_in_month(year, month).into())?;
        check_range("hour", hour.into(), 0, (HOURS_PER_DAY - 1).into())?;
        check_range("minute", minute.into(), 0, (MINUTES_PER_HOUR - 1).into())?;
        check_range("weekday", weekday.into(), 0, 6)?;
        Ok(CalendarMoment {
            year,
            month,
            day,
            hour,
            minute,
            weekday,
        })
    }

    pub fn from_payload(payload: &TimePayload) -> Result<Self, PayloadError> {
        let year = check_range("year", parse_number("year", &payload.year)?, 1, 9999)?;
        let month = check_range("month", parse_number("month", &payload.month)?, 1, 12)?;
        let day = parse_number("day", &payload.day)?;
        let hour = parse_number("hour", &payload.hour)?;
        let minute = parse_number("minute", &payload.minute)?;
        let weekday = parse_weekday(&payload.weekday)?;
        // the range checks above make these conversions lossless
        let month = month as u32;
        let day = check_range("day", day, 1, days_in_month(year as i32, month).into())?;
        let hour = check_range("hour", hour, 0, (HOURS_PER_DAY - 1).into())?;
        let minute = check_range("minute", minute, 0, (MINUTES_PER_HOUR - 1).into())?;
        CalendarMoment::new(
            year as i32,
            month,
            day as u32,
            hour as u32,
            minute as u32,
            weekday,
        )
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// Weekday index, 0 being Monday.
    pub fn weekday(&self) -> u32 {
        self.weekday
    }

    /// The weekday the calendar says this date falls on.
    pub fn calendar_weekday(&self) -> u32 {
        weekday_for(self.year, self.month, self.day).unwrap_or(self.weekday)
    }

    pub(crate) fn with_calendar_weekday(mut self) -> Self {
        self.weekday = self.calendar_weekday();
        self
    }

    pub fn add_minute(&mut self) {
        self.minute += 1;
        if self.minute == MINUTES_PER_HOUR {
            self.minute = 0;
            self.add_hour();
        }
    }

    fn add_hour(&mut self) {
        self.hour += 1;
        if self.hour == HOURS_PER_DAY {
            self.hour = 0;
            self.add_day();
        }
    }

    fn add_day(&mut self) {
        self.day += 1;
        if self.day > days_in_month(self.year, self.month) {
            self.day = 1;
            self.month += 1;
            if self.month > 12 {
                self.month = 1;
                self.year += 1;
            }
        }
        self.weekday = weekday_for(self.year, self.month, self.day).unwrap_or((self.weekday + 1) % 7);
    }

    /// Applies `minutes` one-minute increments. Whole days are stepped a
    /// day at a time, which lands on exactly the same moment as stepping
    /// minute by minute.
    pub fn add_minutes(&mut self, minutes: u64) {
        let minute_of_day = u64::from(self.hour * MINUTES_PER_HOUR + self.minute);
        let total = minute_of_day + minutes;
        let days = total / MINUTES_PER_DAY;
        let minute_of_day = (total % MINUTES_PER_DAY) as u32;
        for _ in 0..days {
            self.add_day();
        }
        self.hour = minute_of_day / MINUTES_PER_HOUR;
        self.minute = minute_of_day % MINUTES_PER_HOUR;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(year: &str, month: &str, day: &str, hour: &str, minute: &str, weekday: &str) -> TimePayload {
        TimePayload {
            hour: hour.to_string(),
            minute: minute.to_string(),
            day: day.to_string(),
            month: month.to_string(),
            year: year.to_string(),
            weekday: weekday.to_string(),
        }
    }

    #[test]
    fn test_leap_years() {
        assert!(is_leap_year(2024));
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(1900));
        assert!(!is_leap_year(2023));
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2100, 2), 28);
        assert_eq!(days_in_month(2023, 4), 30);
        assert_eq!(days_in_month(2023, 12), 31);
        assert_eq!(days_in_month(2023, 13), 0);
    }

    #[test]
    fn test_weekday_for() {
        // 2023-12-31 was a Sunday
        assert_eq!(weekday_for(2023, 12, 31), Some(6));
        assert_eq!(weekday_for(2024, 1, 1), Some(0));
        assert_eq!(weekday_for(2023, 2, 29), None);
    }

    #[test]
    fn test_from_payload() {
        let moment = CalendarMoment::from_payload(&payload("2023", "12", "31", "9", "5", "Sunday")).unwrap();
        assert_eq!(moment, CalendarMoment::new(2023, 12, 31, 9, 5, 6).unwrap());

        let moment = CalendarMoment::from_payload(&payload(" 2024", "02 ", "29", "00", "59", "thu")).unwrap();
        assert_eq!(moment.day(), 29);
        assert_eq!(moment.weekday(), 3);
    }

    #[test]
    fn test_from_payload_rejects_garbage() {
        assert_eq!(
            CalendarMoment::from_payload(&payload("2023", "12", "31", "nine", "5", "Sunday")),
            Err(PayloadError::InvalidNumber {
                field: "hour",
                value: "nine".to_string()
            })
        );
        assert_eq!(
            CalendarMoment::from_payload(&payload("2023", "2", "29", "9", "5", "Wednesday")),
            Err(PayloadError::OutOfRange {
                field: "day",
                value: 29
            })
        );
        assert_eq!(
            CalendarMoment::from_payload(&payload("2023", "13", "1", "9", "5", "Sunday")),
            Err(PayloadError::OutOfRange {
                field: "month",
                value: 13
            })
        );
        assert_eq!(
            CalendarMoment::from_payload(&payload("2023", "12", "31", "24", "0", "Sunday")),
            Err(PayloadError::OutOfRange {
                field: "hour",
                value: 24
            })
        );
        assert!(matches!(
            CalendarMoment::from_payload(&payload("2023", "12", "31", "9", "5", "")),
            Err(PayloadError::UnknownWeekday(_))
        ));
        assert!(matches!(
            CalendarMoment::from_payload(&TimePayload::default()),
            Err(PayloadError::InvalidNumber { field: "year", .. })
        ));
    }

    #[test]
    fn test_month_end_rollover() {
        for year in [2023, 2024, 1900, 2000] {
            for month in 1..=12 {
                let last = days_in_month(year, month);
                let weekday = weekday_for(year, month, last).unwrap();
                let mut moment = CalendarMoment::new(year, month, last, 23, 59, weekday).unwrap();
                moment.add_minute();
                assert_eq!(moment.day(), 1, "{year}-{month}");
                assert_eq!(moment.hour(), 0);
                assert_eq!(moment.minute(), 0);
                if month == 12 {
                    assert_eq!((moment.year(), moment.month()), (year + 1, 1));
                } else {
                    assert_eq!((moment.year(), moment.month()), (year, month + 1));
                }
                assert_eq!(moment.weekday(), (weekday + 1) % 7);
            }
        }
    }

    #[test]
    fn test_add_minutes_matches_stepping() {
        let start = CalendarMoment::new(2024, 2, 27, 17, 42, 1).unwrap();
        for gap in [0, 1, 17, 60, 379, 1440, 1441, 2 * 1440 + 3, 40 * 1440 + 1234] {
            let mut stepped = start;
            for _ in 0..gap {
                stepped.add_minute();
            }
            let mut jumped = start;
            jumped.add_minutes(gap);
            assert_eq!(stepped, jumped, "gap of {gap} minutes");
        }
    }
}
