//! Capture timestamp rebasing.
//!
//! Two transformations are applied to every record, in order:
//!
//! 1. a date rebase, a `(years, months, days)` delta computed once from the
//!    first record's date and the requested target date;
//! 2. zero or more signed time shifts, each added to the result of the
//!    previous one.

use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use regex::Regex;
use tracing::{debug, info};

use crate::error::ParseError;

/// Requested target date. Components left out keep the first record's value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateTarget {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl DateTarget {
    pub const fn is_empty(&self) -> bool {
        self.year.is_none() && self.month.is_none() && self.day.is_none()
    }

    /// Delta that moves `reference` onto this target date.
    pub fn delta_from(&self, reference: &DateTime<Utc>) -> DateDelta {
        let date = reference.date_naive();
        DateDelta {
            years: self.year.map_or(0, |y| y - date.year()),
            months: self.month.map_or(0, |m| m as i32 - date.month() as i32),
            days: self.day.map_or(0, |d| d as i32 - date.day() as i32),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateDelta {
    pub years: i32,
    pub months: i32,
    pub days: i32,
}

impl DateDelta {
    pub const ZERO: Self = Self {
        years: 0,
        months: 0,
        days: 0,
    };

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Adds the delta to the date part of `ts`, keeping the time of day.
    ///
    /// Years and months are added first, then days; a day past the end of
    /// the resulting month rolls over into the next one (Jan 31 + 1 month is
    /// Mar 2 or 3).
    pub fn apply(&self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_zero() {
            return Some(ts);
        }
        let date = ts.date_naive();
        let months = i64::from(date.year()) * 12
            + i64::from(date.month0())
            + i64::from(self.years) * 12
            + i64::from(self.months);
        let year = i32::try_from(months.div_euclid(12)).ok()?;
        let month = u32::try_from(months.rem_euclid(12)).ok()? + 1;

        let first_of_month = NaiveDate::from_ymd_opt(year, month, 1)?;
        let days = i64::from(date.day0()) + i64::from(self.days);
        let rebased = first_of_month.checked_add_signed(TimeDelta::try_days(days)?)?;
        Some(rebased.and_time(ts.time()).and_utc())
    }
}

/// A signed time-of-day shift such as `+2h`, `-30m` or `1h15m30s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeShift(TimeDelta);

impl TimeShift {
    pub const fn delta(&self) -> TimeDelta {
        self.0
    }

    pub fn apply(&self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
        ts.checked_add_signed(self.0)
    }

    /// Parses a comma-separated list. An empty string is an empty list.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, ParseError> {
        if s.trim().is_empty() {
            return Ok(Vec::new());
        }
        s.split(',').map(str::parse).collect()
    }
}

fn shift_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<sign>[+-])?(?:(?P<h>\d+)h)?(?:(?P<m>\d+)m)?(?:(?P<s>\d+)s)?$")
            .expect("time shift pattern is valid")
    })
}

impl FromStr for TimeShift {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidTimeShift(s.to_string());
        let caps = shift_pattern().captures(s.trim()).ok_or_else(invalid)?;

        let mut seconds: i64 = 0;
        let mut any = false;
        for (name, scale) in [("h", 3600), ("m", 60), ("s", 1)] {
            if let Some(value) = caps.name(name) {
                any = true;
                let value: i64 = value.as_str().parse().map_err(|_| invalid())?;
                seconds = value
                    .checked_mul(scale)
                    .and_then(|v| seconds.checked_add(v))
                    .ok_or_else(invalid)?;
            }
        }
        if !any {
            return Err(invalid());
        }
        if caps.name("sign").is_some_and(|m| m.as_str() == "-") {
            seconds = -seconds;
        }
        TimeDelta::try_seconds(seconds).map(Self).ok_or_else(invalid)
    }
}

#[derive(Debug, Clone, Copy)]
enum DateRebase {
    Disabled,
    /// Waiting for the first record to fix the delta.
    Pending(DateTarget),
    Ready(DateDelta),
}

/// Rebases every record's timestamp for one run.
#[derive(Debug, Clone)]
pub struct Rebaser {
    date: DateRebase,
    shifts: Vec<TimeShift>,
}

impl Rebaser {
    pub fn new(target: DateTarget, shifts: Vec<TimeShift>) -> Self {
        let date = if target.is_empty() {
            DateRebase::Disabled
        } else {
            DateRebase::Pending(target)
        };
        Self { date, shifts }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.date, DateRebase::Disabled) || !self.shifts.is_empty()
    }

    /// The delta in use, once the first record has been seen.
    #[cfg(test)]
    fn date_delta(&self) -> Option<DateDelta> {
        match self.date {
            DateRebase::Ready(delta) => Some(delta),
            _ => None,
        }
    }

    /// Returns `None` when the result cannot be represented.
    pub fn rebase(&mut self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if let DateRebase::Pending(target) = self.date {
            let delta = target.delta_from(&ts);
            info!(
                "Rebasing dates by {} years, {} months, {} days (first record at {})",
                delta.years, delta.months, delta.days, ts
            );
            self.date = DateRebase::Ready(delta);
        }

        let dated = match self.date {
            DateRebase::Ready(delta) => delta.apply(ts)?,
            _ => ts,
        };
        let shifted = self.shifts.iter().try_fold(dated, |ts, shift| shift.apply(ts))?;
        if shifted != ts {
            debug!("timestamp {ts} -> {shifted}");
        }
        Some(shifted)
    }
}
