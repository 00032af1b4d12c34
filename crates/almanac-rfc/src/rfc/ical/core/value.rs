//! Typed iCalendar property values (RFC 5545 §3.3).

use chrono::NaiveDate;

use super::{DateTime, DateTimeValue, Duration, RRule, UtcOffset};

/// PERIOD value (RFC 5545 §3.3.9).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Period {
    /// `start/end`
    Explicit { start: DateTime, end: DateTime },
    /// `start/duration`
    Duration { start: DateTime, duration: Duration },
}

impl Period {
    #[must_use]
    pub const fn start(&self) -> &DateTime {
        match self {
            Self::Explicit { start, .. } | Self::Duration { start, .. } => start,
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit { start, end } => write!(f, "{start}/{end}"),
            Self::Duration { start, duration } => write!(f, "{start}/{duration}"),
        }
    }
}

/// A property value, typed by property name and `VALUE` parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Binary(Vec<u8>),
    Boolean(bool),
    CalAddress(String),
    Date(NaiveDate),
    DateList(Vec<NaiveDate>),
    DateTime(DateTime),
    DateTimeList(Vec<DateTime>),
    Duration(Duration),
    Float(f64),
    Integer(i64),
    Period(Period),
    PeriodList(Vec<Period>),
    Recur(Box<RRule>),
    /// Unescaped text.
    Text(String),
    TextList(Vec<String>),
    Uri(String),
    UtcOffset(UtcOffset),
    /// Value kept verbatim (X- and IANA properties without a known type).
    Unknown(String),
}

impl Value {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Uri(s) | Self::CalAddress(s) | Self::Unknown(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_duration(&self) -> Option<&Duration> {
        match self {
            Self::Duration(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_recur(&self) -> Option<&RRule> {
        match self {
            Self::Recur(rule) => Some(rule),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_utc_offset(&self) -> Option<UtcOffset> {
        match self {
            Self::UtcOffset(offset) => Some(*offset),
            _ => None,
        }
    }

    /// Returns a single DATE or DATE-TIME value.
    #[must_use]
    pub fn as_date_time_value(&self) -> Option<DateTimeValue> {
        match self {
            Self::Date(date) => Some(DateTimeValue::Date(*date)),
            Self::DateTime(dt) => Some(DateTimeValue::DateTime(dt.clone())),
            Self::DateList(list) => list.first().copied().map(DateTimeValue::Date),
            Self::DateTimeList(list) => list.first().cloned().map(DateTimeValue::DateTime),
            _ => None,
        }
    }

    /// Returns every DATE or DATE-TIME carried by the value; periods yield their start.
    #[must_use]
    pub fn date_time_values(&self) -> Vec<DateTimeValue> {
        match self {
            Self::Date(date) => vec![DateTimeValue::Date(*date)],
            Self::DateTime(dt) => vec![DateTimeValue::DateTime(dt.clone())],
            Self::DateList(list) => list.iter().copied().map(DateTimeValue::Date).collect(),
            Self::DateTimeList(list) => list.iter().cloned().map(DateTimeValue::DateTime).collect(),
            Self::Period(period) => vec![DateTimeValue::DateTime(period.start().clone())],
            Self::PeriodList(list) => list
                .iter()
                .map(|p| DateTimeValue::DateTime(p.start().clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the periods carried by a PERIOD value or list.
    #[must_use]
    pub fn periods(&self) -> Vec<&Period> {
        match self {
            Self::Period(period) => vec![period],
            Self::PeriodList(list) => list.iter().collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_lists_expand_to_values() {
        let a = NaiveDate::from_ymd_opt(2012, 1, 1).expect("valid date");
        let b = NaiveDate::from_ymd_opt(2012, 1, 2).expect("valid date");
        let value = Value::DateList(vec![a, b]);
        assert_eq!(
            value.date_time_values(),
            vec![DateTimeValue::Date(a), DateTimeValue::Date(b)]
        );
        assert_eq!(value.as_date_time_value(), Some(DateTimeValue::Date(a)));
        assert!(Value::Text("x".into()).date_time_values().is_empty());
    }
}
