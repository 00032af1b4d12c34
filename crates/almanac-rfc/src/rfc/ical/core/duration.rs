//! iCalendar DURATION value type (RFC 5545 §3.3.6).

use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};

/// Duration value (RFC 5545 §3.3.6).
///
/// Weeks and days are nominal (calendar days, which may be 23 or 25 hours
/// long across a DST change); hours, minutes and seconds are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Duration {
    pub negative: bool,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl Duration {
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            negative: false,
            weeks: 0,
            days: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }

    #[must_use]
    pub const fn days(days: u32) -> Self {
        Self {
            days,
            ..Self::zero()
        }
    }

    #[must_use]
    pub const fn hours(hours: u32) -> Self {
        Self {
            hours,
            ..Self::zero()
        }
    }

    #[must_use]
    pub const fn minutes(minutes: u32) -> Self {
        Self {
            minutes,
            ..Self::zero()
        }
    }

    #[must_use]
    pub const fn negate(mut self) -> Self {
        self.negative = !self.negative;
        self
    }

    const fn sign(&self) -> i64 {
        if self.negative { -1 } else { 1 }
    }

    /// Signed number of nominal days (weeks count as seven).
    #[must_use]
    pub const fn nominal_days(&self) -> i64 {
        self.sign() * (self.weeks as i64 * 7 + self.days as i64)
    }

    /// Signed exact part (hours, minutes, seconds) in seconds.
    #[must_use]
    pub const fn exact_seconds(&self) -> i64 {
        self.sign()
            * (self.hours as i64 * 3600 + self.minutes as i64 * 60 + self.seconds as i64)
    }

    /// Total length in seconds, treating every day as 86400 seconds.
    #[must_use]
    pub const fn as_seconds(&self) -> i64 {
        self.nominal_days() * 86_400 + self.exact_seconds()
    }

    /// Returns the duration as a fixed-length chrono delta.
    #[must_use]
    pub fn as_delta(&self) -> TimeDelta {
        TimeDelta::seconds(self.as_seconds())
    }

    /// ## Summary
    /// Applies only the nominal (day/week) part to a wall-clock reading.
    ///
    /// The caller adds [`Self::exact_seconds`] after anchoring the result
    /// to an absolute instant.
    #[must_use]
    pub fn add_nominal(&self, local: NaiveDateTime) -> Option<NaiveDateTime> {
        local.checked_add_signed(TimeDelta::try_days(self.nominal_days())?)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "P")?;

        if self.weeks > 0 && self.days == 0 && self.hours == 0 && self.minutes == 0 && self.seconds == 0
        {
            return write!(f, "{}W", self.weeks);
        }

        let days = self.weeks * 7 + self.days;
        if days > 0 {
            write!(f, "{days}D")?;
        }

        if self.hours > 0 || self.minutes > 0 || self.seconds > 0 {
            write!(f, "T")?;
            if self.hours > 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes > 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.seconds > 0 {
                write!(f, "{}S", self.seconds)?;
            }
        } else if days == 0 {
            write!(f, "T0S")?;
        }

        Ok(())
    }
}
