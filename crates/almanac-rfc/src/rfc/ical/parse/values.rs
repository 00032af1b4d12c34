//! Value parsers for iCalendar property values (RFC 5545 §3.3).
//!
//! Every parser takes the line and column of the value for error reporting.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::error::{ParseError, ParseErrorKind, ParseResult};
use crate::rfc::ical::core::{
    DateTime, Duration, Frequency, Period, RRule, RRuleUntil, UtcOffset, Weekday, WeekdayNum,
};

fn err(kind: ParseErrorKind, line: usize, col: usize, value: &str) -> ParseError {
    ParseError::new(kind, line, col).with_context(value.to_string())
}

fn digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

/// Parses a DATE value (`YYYYMMDD`).
///
/// ## Errors
/// Returns `InvalidDate` if the format or the calendar date is invalid.
pub fn parse_date(s: &str, line: usize, col: usize) -> ParseResult<NaiveDate> {
    let invalid = || err(ParseErrorKind::InvalidDate, line, col, s);
    if s.len() != 8 || !s.is_ascii() {
        return Err(invalid());
    }
    let year: i32 = digits(&s[0..4]).ok_or_else(invalid)?;
    let month: u32 = digits(&s[4..6]).ok_or_else(invalid)?;
    let day: u32 = digits(&s[6..8]).ok_or_else(invalid)?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    if s.len() != 6 || !s.is_ascii() {
        return None;
    }
    let hour: u32 = digits(&s[0..2])?;
    let minute: u32 = digits(&s[2..4])?;
    let second: u32 = digits(&s[4..6])?;
    // Leap seconds are clamped to :59.
    NaiveTime::from_hms_opt(hour, minute, second.min(59))
}

/// Parses a DATE-TIME value (`YYYYMMDDTHHMMSS[Z]`).
///
/// A trailing `Z` yields a UTC value; otherwise `tzid` selects a zoned or
/// floating value. A `Z` wins over a TZID parameter.
///
/// ## Errors
/// Returns `InvalidDateTime` if the format or the date/time is invalid.
pub fn parse_datetime(
    s: &str,
    tzid: Option<&str>,
    line: usize,
    col: usize,
) -> ParseResult<DateTime> {
    let invalid = || err(ParseErrorKind::InvalidDateTime, line, col, s);
    let (body, is_utc) = match s.strip_suffix(['Z', 'z']) {
        Some(body) => (body, true),
        None => (s, false),
    };
    let (date_part, time_part) = body.split_once(['T', 't']).ok_or_else(invalid)?;
    let date = parse_date(date_part, line, col).map_err(|_e| invalid())?;
    let time = parse_time(time_part).ok_or_else(invalid)?;
    let local = NaiveDateTime::new(date, time);

    Ok(match (is_utc, tzid) {
        (true, _) => DateTime::utc(local),
        (false, Some(tzid)) => DateTime::zoned(local, tzid),
        (false, None) => DateTime::floating(local),
    })
}

/// Parses a UTC-OFFSET value (`+HHMM` or `+HHMMSS`).
///
/// ## Errors
/// Returns `InvalidUtcOffset` on malformed input.
pub fn parse_utc_offset(s: &str, line: usize, col: usize) -> ParseResult<UtcOffset> {
    let invalid = || err(ParseErrorKind::InvalidUtcOffset, line, col, s);
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };
    if (rest.len() != 4 && rest.len() != 6) || !rest.is_ascii() {
        return Err(invalid());
    }
    let hours: i32 = digits(&rest[0..2]).ok_or_else(invalid)?;
    let minutes: i32 = digits(&rest[2..4]).ok_or_else(invalid)?;
    let seconds: i32 = if rest.len() == 6 {
        digits(&rest[4..6]).ok_or_else(invalid)?
    } else {
        0
    };
    if hours > 23 || minutes > 59 || seconds > 59 {
        return Err(invalid());
    }
    Ok(UtcOffset::from_seconds(
        sign * (hours * 3600 + minutes * 60 + seconds),
    ))
}

/// Parses a DURATION value (`[+-]P[nW]` or `[+-]P[nD][T[nH][nM][nS]]`).
///
/// ## Errors
/// Returns `InvalidDuration` on malformed input.
pub fn parse_duration(s: &str, line: usize, col: usize) -> ParseResult<Duration> {
    let invalid = || err(ParseErrorKind::InvalidDuration, line, col, s);
    let mut dur = Duration::zero();

    let rest = if let Some(rest) = s.strip_prefix('-') {
        dur.negative = true;
        rest
    } else {
        s.strip_prefix('+').unwrap_or(s)
    };
    let rest = rest.strip_prefix(['P', 'p']).ok_or_else(invalid)?;
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut in_time = false;
    let mut number = String::new();
    let mut seen_any = false;
    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            '0'..='9' => number.push(c),
            'T' if !in_time && number.is_empty() => in_time = true,
            designator => {
                let n: u32 = number.parse().map_err(|_e| invalid())?;
                number.clear();
                seen_any = true;
                match (designator, in_time) {
                    ('W', false) => dur.weeks = n,
                    ('D', false) => dur.days = n,
                    ('H', true) => dur.hours = n,
                    ('M', true) => dur.minutes = n,
                    ('S', true) => dur.seconds = n,
                    _ => return Err(invalid()),
                }
            }
        }
    }
    if !number.is_empty() || !seen_any {
        return Err(invalid());
    }
    Ok(dur)
}

/// Parses a PERIOD value (`start/end` or `start/duration`).
///
/// ## Errors
/// Returns `InvalidPeriod` on malformed input.
pub fn parse_period(s: &str, tzid: Option<&str>, line: usize, col: usize) -> ParseResult<Period> {
    let invalid = || err(ParseErrorKind::InvalidPeriod, line, col, s);
    let (start, end) = s.split_once('/').ok_or_else(invalid)?;
    let start = parse_datetime(start, tzid, line, col).map_err(|_e| invalid())?;
    if end.starts_with(['P', 'p', '+', '-']) {
        let duration = parse_duration(end, line, col).map_err(|_e| invalid())?;
        Ok(Period::Duration { start, duration })
    } else {
        let end = parse_datetime(end, tzid, line, col).map_err(|_e| invalid())?;
        Ok(Period::Explicit { start, end })
    }
}

/// Parses an RRULE value.
///
/// Unknown `X-` parts are ignored. Rejects a missing or unknown FREQ,
/// COUNT together with UNTIL, out-of-range BY* values, and BY* parts that
/// RFC 5545 forbids for the rule's frequency.
///
/// ## Errors
/// Returns `InvalidRRule`, `InvalidFrequency`, `InvalidWeekday` or
/// `UntilCountConflict`.
pub fn parse_rrule(s: &str, line: usize, col: usize) -> ParseResult<RRule> {
    let invalid = |what: &str| err(ParseErrorKind::InvalidRRule, line, col, what);

    let parts: Vec<(String, &str)> = s
        .split(';')
        .filter(|p| !p.is_empty())
        .map(|part| {
            part.split_once('=')
                .map(|(k, v)| (k.to_ascii_uppercase(), v))
                .ok_or_else(|| invalid(part))
        })
        .collect::<ParseResult<_>>()?;

    let freq = parts
        .iter()
        .find(|(k, _)| k == "FREQ")
        .ok_or_else(|| invalid("missing FREQ"))?
        .1;
    let freq = Frequency::parse(freq)
        .ok_or_else(|| err(ParseErrorKind::InvalidFrequency, line, col, freq))?;
    let mut rule = RRule::new(freq);

    for (key, value) in &parts {
        match key.as_str() {
            "FREQ" => {}
            "INTERVAL" => {
                let interval: u32 = value.parse().map_err(|_e| invalid(value))?;
                if interval == 0 {
                    return Err(invalid("INTERVAL must be positive"));
                }
                rule.interval = Some(interval);
            }
            "COUNT" => {
                let count: u32 = value.parse().map_err(|_e| invalid(value))?;
                if count == 0 {
                    return Err(invalid("COUNT must be positive"));
                }
                rule.count = Some(count);
            }
            "UNTIL" => {
                rule.until = Some(if value.len() == 8 {
                    RRuleUntil::Date(parse_date(value, line, col)?)
                } else {
                    RRuleUntil::DateTime(parse_datetime(value, None, line, col)?)
                });
            }
            "WKST" => {
                rule.wkst = Some(
                    Weekday::parse(value)
                        .ok_or_else(|| err(ParseErrorKind::InvalidWeekday, line, col, value))?,
                );
            }
            "BYSECOND" => rule.by_second = list(value, 0, 60, false).ok_or_else(|| invalid(value))?,
            "BYMINUTE" => rule.by_minute = list(value, 0, 59, false).ok_or_else(|| invalid(value))?,
            "BYHOUR" => rule.by_hour = list(value, 0, 23, false).ok_or_else(|| invalid(value))?,
            "BYMONTHDAY" => {
                rule.by_monthday = list(value, 1, 31, true).ok_or_else(|| invalid(value))?;
            }
            "BYYEARDAY" => {
                rule.by_yearday = list(value, 1, 366, true).ok_or_else(|| invalid(value))?;
            }
            "BYWEEKNO" => rule.by_weekno = list(value, 1, 53, true).ok_or_else(|| invalid(value))?,
            "BYMONTH" => rule.by_month = list(value, 1, 12, false).ok_or_else(|| invalid(value))?,
            "BYSETPOS" => {
                rule.by_setpos = list(value, 1, 366, true).ok_or_else(|| invalid(value))?;
            }
            "BYDAY" => {
                rule.by_day = value
                    .split(',')
                    .map(|d| parse_weekday_num(d, line, col))
                    .collect::<ParseResult<_>>()?;
            }
            other if other.starts_with("X-") => {}
            other => return Err(invalid(other)),
        }
    }

    if rule.count.is_some() && rule.until.is_some() {
        return Err(ParseError::new(ParseErrorKind::UntilCountConflict, line, col));
    }
    check_frequency_constraints(&rule).map_err(invalid)?;
    Ok(rule)
}

/// RFC 5545 §3.3.10 restrictions on BY* parts by frequency.
fn check_frequency_constraints(rule: &RRule) -> Result<(), &'static str> {
    let freq = rule.freq;
    if !rule.by_weekno.is_empty() && freq != Frequency::Yearly {
        return Err("BYWEEKNO is only valid with FREQ=YEARLY");
    }
    if !rule.by_yearday.is_empty()
        && matches!(freq, Frequency::Daily | Frequency::Weekly | Frequency::Monthly)
    {
        return Err("BYYEARDAY is not valid with FREQ=DAILY, WEEKLY or MONTHLY");
    }
    if !rule.by_monthday.is_empty() && freq == Frequency::Weekly {
        return Err("BYMONTHDAY is not valid with FREQ=WEEKLY");
    }
    if rule.by_day.iter().any(|d| d.ordinal.is_some())
        && !matches!(freq, Frequency::Monthly | Frequency::Yearly)
    {
        return Err("numeric BYDAY is only valid with FREQ=MONTHLY or YEARLY");
    }
    if freq == Frequency::Yearly
        && !rule.by_weekno.is_empty()
        && rule.by_day.iter().any(|d| d.ordinal.is_some())
    {
        return Err("numeric BYDAY is not valid together with BYWEEKNO");
    }
    Ok(())
}

/// Parses a comma list of integers in `[min, max]`, or `[-max, -min] ∪ [min, max]` when signed.
fn list<T>(value: &str, min: i32, max: i32, signed: bool) -> Option<Vec<T>>
where
    T: TryFrom<i32>,
{
    value
        .split(',')
        .map(|item| {
            let n: i32 = item.trim_start_matches('+').parse().ok()?;
            let magnitude = if signed { n.checked_abs()? } else { n };
            if magnitude < min || magnitude > max || (!signed && n < 0) {
                return None;
            }
            T::try_from(n).ok()
        })
        .collect()
}

fn parse_weekday_num(s: &str, line: usize, col: usize) -> ParseResult<WeekdayNum> {
    let invalid = || err(ParseErrorKind::InvalidWeekday, line, col, s);
    if s.len() < 2 || !s.is_char_boundary(s.len() - 2) {
        return Err(invalid());
    }
    let (ordinal, day) = s.split_at(s.len() - 2);
    let weekday = Weekday::parse(day).ok_or_else(invalid)?;
    if ordinal.is_empty() {
        return Ok(WeekdayNum::every(weekday));
    }
    let n: i8 = ordinal
        .trim_start_matches('+')
        .parse()
        .map_err(|_e| invalid())?;
    if n == 0 || n.unsigned_abs() > 53 {
        return Err(invalid());
    }
    Ok(WeekdayNum::nth(n, weekday))
}

/// Unescapes a TEXT value (RFC 5545 §3.3.11).
#[must_use]
pub fn unescape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(escaped @ ('\\' | ';' | ',' | ':' | '"')) => out.push(escaped),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Splits a TEXT list on unescaped commas.
#[must_use]
pub fn split_text_list(s: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ',' {
            items.push(unescape_text(&current));
            current.clear();
        } else {
            current.push(c);
        }
    }
    if escaped {
        current.push('\\');
    }
    items.push(unescape_text(&current));
    items
}

/// ## Errors
/// Returns `InvalidBoolean` unless the value is TRUE or FALSE.
pub fn parse_boolean(s: &str, line: usize, col: usize) -> ParseResult<bool> {
    if s.eq_ignore_ascii_case("TRUE") {
        Ok(true)
    } else if s.eq_ignore_ascii_case("FALSE") {
        Ok(false)
    } else {
        Err(err(ParseErrorKind::InvalidBoolean, line, col, s))
    }
}

/// ## Errors
/// Returns `InvalidInteger` on malformed input.
pub fn parse_integer(s: &str, line: usize, col: usize) -> ParseResult<i64> {
    s.trim_start_matches('+')
        .parse()
        .map_err(|_e| err(ParseErrorKind::InvalidInteger, line, col, s))
}

/// ## Errors
/// Returns `InvalidFloat` on malformed input.
pub fn parse_float(s: &str, line: usize, col: usize) -> ParseResult<f64> {
    s.parse()
        .map_err(|_e| err(ParseErrorKind::InvalidFloat, line, col, s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_basic() {
        let date = parse_date("20120103", 1, 1).expect("valid date");
        assert_eq!(date, NaiveDate::from_ymd_opt(2012, 1, 3).expect("valid"));
        assert!(parse_date("20121303", 1, 1).is_err());
        assert!(parse_date("2012-01-03", 1, 1).is_err());
    }

    #[test]
    fn parse_datetime_forms() {
        assert!(parse_datetime("20120207T181500Z", None, 1, 1).expect("utc").is_utc());
        assert!(
            parse_datetime("20120207T181500", None, 1, 1)
                .expect("floating")
                .is_floating()
        );
        let zoned = parse_datetime("20120207T181500", Some("Europe/Berlin"), 1, 1).expect("zoned");
        assert_eq!(zoned.tzid(), Some("Europe/Berlin"));
        assert!(
            parse_datetime("20120207T181500Z", Some("Europe/Berlin"), 1, 1)
                .expect("utc wins")
                .is_utc()
        );
        assert!(parse_datetime("20120207", None, 1, 1).is_err());
        assert!(parse_datetime("20120207T251500", None, 1, 1).is_err());
    }

    #[test]
    fn parse_utc_offsets() {
        assert_eq!(parse_utc_offset("+0100", 1, 1).expect("valid").as_seconds(), 3600);
        assert_eq!(parse_utc_offset("-0530", 1, 1).expect("valid").as_seconds(), -19_800);
        assert_eq!(parse_utc_offset("+001730", 1, 1).expect("valid").as_seconds(), 1050);
        assert!(parse_utc_offset("0100", 1, 1).is_err());
    }

    #[test]
    fn parse_durations() {
        let d = parse_duration("P1DT2H30M", 1, 1).expect("valid");
        assert_eq!((d.days, d.hours, d.minutes), (1, 2, 30));
        let d = parse_duration("-PT15M", 1, 1).expect("valid");
        assert!(d.negative);
        assert_eq!(d.exact_seconds(), -900);
        assert_eq!(parse_duration("P2W", 1, 1).expect("valid").weeks, 2);
        assert!(parse_duration("P", 1, 1).is_err());
        assert!(parse_duration("PT1D", 1, 1).is_err());
        assert!(parse_duration("P1H", 1, 1).is_err());
        assert!(parse_duration("PT5", 1, 1).is_err());
    }

    #[test]
    fn parse_periods() {
        let p = parse_period("19970101T180000Z/PT5H30M", None, 1, 1).expect("valid");
        assert!(matches!(p, Period::Duration { .. }));
        let p = parse_period("19970101T180000Z/19970102T070000Z", None, 1, 1).expect("valid");
        assert!(matches!(p, Period::Explicit { .. }));
        assert!(parse_period("19970101T180000Z", None, 1, 1).is_err());
    }

    #[test]
    fn parse_rrule_weekly_byday() {
        let rule = parse_rrule("FREQ=WEEKLY;INTERVAL=1;BYDAY=TU,TH", 1, 1).expect("valid");
        assert_eq!(rule.freq, Frequency::Weekly);
        assert_eq!(rule.interval, Some(1));
        assert_eq!(
            rule.by_day,
            vec![
                WeekdayNum::every(Weekday::Tuesday),
                WeekdayNum::every(Weekday::Thursday)
            ]
        );
        assert!(rule.is_unbounded());
    }

    #[test]
    fn parse_rrule_until_and_ordinals() {
        let rule =
            parse_rrule("FREQ=MONTHLY;BYDAY=-1SU,+2MO;UNTIL=20261231T000000Z", 1, 1).expect("valid");
        assert_eq!(rule.by_day[0], WeekdayNum::nth(-1, Weekday::Sunday));
        assert_eq!(rule.by_day[1], WeekdayNum::nth(2, Weekday::Monday));
        assert!(matches!(rule.until, Some(RRuleUntil::DateTime(ref dt)) if dt.is_utc()));
    }

    #[test]
    fn parse_rrule_rejects_malformed_rules() {
        let kind = |s: &str| parse_rrule(s, 1, 1).expect_err(s).kind;
        assert_eq!(kind("FREQ=FORTNIGHTLY"), ParseErrorKind::InvalidFrequency);
        assert_eq!(kind("INTERVAL=2"), ParseErrorKind::InvalidRRule);
        assert_eq!(
            kind("FREQ=DAILY;COUNT=3;UNTIL=20260101"),
            ParseErrorKind::UntilCountConflict
        );
        assert_eq!(kind("FREQ=DAILY;BYMONTH=13"), ParseErrorKind::InvalidRRule);
        assert_eq!(kind("FREQ=WEEKLY;BYMONTHDAY=1"), ParseErrorKind::InvalidRRule);
        assert_eq!(kind("FREQ=MONTHLY;BYWEEKNO=1"), ParseErrorKind::InvalidRRule);
        assert_eq!(kind("FREQ=WEEKLY;BYDAY=1MO"), ParseErrorKind::InvalidRRule);
        assert_eq!(kind("FREQ=WEEKLY;BYDAY=XX"), ParseErrorKind::InvalidWeekday);
        assert!(parse_rrule("FREQ=DAILY;X-NAME=foo", 1, 1).is_ok());
    }

    #[test]
    fn text_unescaping() {
        assert_eq!(unescape_text("a\\, b\\; c\\nd\\\\e"), "a, b; c\nd\\e");
        assert_eq!(split_text_list("one,two\\,three"), vec!["one", "two,three"]);
    }

    #[test]
    fn scalar_values() {
        assert!(parse_boolean("true", 1, 1).expect("valid"));
        assert!(parse_boolean("yes", 1, 1).is_err());
        assert_eq!(parse_integer("+5", 1, 1).expect("valid"), 5);
        assert!(parse_float("1.5x", 1, 1).is_err());
    }
}
