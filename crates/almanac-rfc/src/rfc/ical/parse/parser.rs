//! Component tree builder for iCalendar text.

use base64::Engine as _;

use super::error::{ParseError, ParseErrorKind, ParseResult};
use super::lexer::{parse_content_line, split_lines};
use super::values::{
    parse_boolean, parse_date, parse_datetime, parse_duration, parse_float, parse_integer,
    parse_period, parse_rrule, parse_utc_offset, split_text_list, unescape_text,
};
use crate::rfc::ical::core::{Component, ComponentKind, ContentLine, ICalendar, Property, Value};

/// Value type selected by property name or `VALUE` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueType {
    Binary,
    Boolean,
    CalAddress,
    Date,
    DateTime,
    Duration,
    Float,
    Integer,
    Period,
    Recur,
    Text,
    TextList,
    Uri,
    UtcOffset,
    Unknown,
}

impl ValueType {
    fn from_param(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "BINARY" => Self::Binary,
            "BOOLEAN" => Self::Boolean,
            "CAL-ADDRESS" => Self::CalAddress,
            "DATE" => Self::Date,
            "DATE-TIME" => Self::DateTime,
            "DURATION" => Self::Duration,
            "FLOAT" => Self::Float,
            "INTEGER" => Self::Integer,
            "PERIOD" => Self::Period,
            "RECUR" => Self::Recur,
            "TEXT" => Self::Text,
            "URI" => Self::Uri,
            "UTC-OFFSET" => Self::UtcOffset,
            _ => Self::Unknown,
        }
    }
}

/// Looks like a bare DATE (`YYYYMMDD`), as many writers omit `VALUE=DATE`.
fn looks_like_date(raw: &str) -> bool {
    raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit())
}

fn determine_value_type(cl: &ContentLine) -> ValueType {
    if let Some(value_type) = cl.value_type() {
        return ValueType::from_param(value_type);
    }

    let first = cl.raw_value.split(',').next().unwrap_or_default();
    match cl.name.as_str() {
        "DTSTART" | "DTEND" | "DUE" | "RECURRENCE-ID" | "EXDATE" | "RDATE" => {
            if looks_like_date(first) {
                ValueType::Date
            } else if first.contains('/') {
                ValueType::Period
            } else {
                ValueType::DateTime
            }
        }
        "DTSTAMP" | "CREATED" | "LAST-MODIFIED" | "COMPLETED" | "ACKNOWLEDGED" => {
            ValueType::DateTime
        }
        "DURATION" => ValueType::Duration,
        "TRIGGER" => {
            if cl.raw_value.starts_with(['P', '-', '+']) {
                ValueType::Duration
            } else {
                ValueType::DateTime
            }
        }
        "PERCENT-COMPLETE" | "PRIORITY" | "REPEAT" | "SEQUENCE" => ValueType::Integer,
        "RRULE" | "EXRULE" => ValueType::Recur,
        "TZOFFSETFROM" | "TZOFFSETTO" => ValueType::UtcOffset,
        "URL" | "TZURL" | "SOURCE" | "ATTACH" => ValueType::Uri,
        "FREEBUSY" => ValueType::Period,
        "ATTENDEE" | "ORGANIZER" => ValueType::CalAddress,
        "CATEGORIES" | "RESOURCES" => ValueType::TextList,
        _ => ValueType::Text,
    }
}

fn split_list<T>(
    raw: &str,
    mut parse_one: impl FnMut(&str) -> ParseResult<T>,
) -> ParseResult<Vec<T>> {
    raw.split(',').map(|item| parse_one(item.trim())).collect()
}

/// Types one content line into a property.
///
/// `EXDATE`/`RDATE` always produce list values; other temporal properties
/// produce single values.
fn parse_property(cl: ContentLine, line: usize, col: usize) -> ParseResult<Property> {
    let value_type = determine_value_type(&cl);
    let multi = matches!(cl.name.as_str(), "EXDATE" | "RDATE" | "FREEBUSY");
    let raw = cl.raw_value.as_str();
    let tzid = cl.tzid();

    let value = match value_type {
        ValueType::Date if multi => {
            Value::DateList(split_list(raw, |s| parse_date(s, line, col))?)
        }
        ValueType::Date => Value::Date(parse_date(raw, line, col)?),
        ValueType::DateTime if multi => {
            Value::DateTimeList(split_list(raw, |s| parse_datetime(s, tzid, line, col))?)
        }
        ValueType::DateTime => Value::DateTime(parse_datetime(raw, tzid, line, col)?),
        ValueType::Period if multi => {
            Value::PeriodList(split_list(raw, |s| parse_period(s, tzid, line, col))?)
        }
        ValueType::Period => Value::Period(parse_period(raw, tzid, line, col)?),
        ValueType::Duration => Value::Duration(parse_duration(raw, line, col)?),
        ValueType::Recur => Value::Recur(Box::new(parse_rrule(raw, line, col)?)),
        ValueType::UtcOffset => Value::UtcOffset(parse_utc_offset(raw, line, col)?),
        ValueType::Integer => Value::Integer(parse_integer(raw, line, col)?),
        ValueType::Float => Value::Float(parse_float(raw, line, col)?),
        ValueType::Boolean => Value::Boolean(parse_boolean(raw, line, col)?),
        ValueType::Binary => Value::Binary(
            base64::engine::general_purpose::STANDARD
                .decode(raw)
                .map_err(|e| {
                    ParseError::new(ParseErrorKind::InvalidBinary, line, col)
                        .with_context(e.to_string())
                })?,
        ),
        ValueType::CalAddress => Value::CalAddress(raw.to_string()),
        ValueType::Uri => Value::Uri(raw.to_string()),
        ValueType::TextList => Value::TextList(split_text_list(raw)),
        ValueType::Text => Value::Text(unescape_text(raw)),
        ValueType::Unknown => Value::Unknown(raw.to_string()),
    };

    Ok(Property {
        name: cl.name,
        params: cl.params,
        value,
        raw_value: cl.raw_value,
    })
}

/// ## Summary
/// Parses one iCalendar object into a component tree.
///
/// The input must hold exactly one `VCALENDAR`. Folded lines, bare LF
/// line endings and omitted `VALUE=DATE` parameters are accepted.
///
/// ## Errors
/// Returns a positioned `ParseError` for malformed content lines, invalid
/// values, or unbalanced `BEGIN`/`END` lines.
#[tracing::instrument(skip(input), fields(input_len = input.len()))]
pub fn parse(input: &str) -> ParseResult<ICalendar> {
    let lines = split_lines(input);
    let Some((first_line, _)) = lines.first() else {
        return Err(ParseError::new(ParseErrorKind::EmptyInput, 1, 1));
    };
    let first_line = *first_line;

    let mut stack: Vec<(usize, Component)> = Vec::new();
    let mut root: Option<Component> = None;

    for (line_num, text) in lines {
        if root.is_some() {
            return Err(ParseError::new(ParseErrorKind::TrailingContent, line_num, 1));
        }

        let cl = parse_content_line(&text, line_num)?;
        let col = text.len() - cl.raw_value.len() + 1;

        match cl.name.as_str() {
            "BEGIN" => {
                let component = Component::named(cl.raw_value.trim());
                if stack.is_empty() && component.kind != Some(ComponentKind::Calendar) {
                    return Err(ParseError::new(ParseErrorKind::MissingBegin, line_num, 1)
                        .with_context("expected BEGIN:VCALENDAR"));
                }
                stack.push((line_num, component));
            }
            "END" => {
                let Some((_, component)) = stack.pop() else {
                    return Err(ParseError::new(ParseErrorKind::MissingBegin, line_num, 1));
                };
                if !component.is_named(cl.raw_value.trim()) {
                    return Err(
                        ParseError::new(ParseErrorKind::MismatchedComponent, line_num, col)
                            .with_context(format!(
                                "BEGIN:{} closed by END:{}",
                                component.name,
                                cl.raw_value.trim()
                            )),
                    );
                }
                match stack.last_mut() {
                    Some((_, parent)) => parent.add_child(component),
                    None => root = Some(component),
                }
            }
            _ => {
                let Some((_, current)) = stack.last_mut() else {
                    return Err(ParseError::new(ParseErrorKind::MissingBegin, line_num, 1)
                        .with_context(cl.name));
                };
                current.add_property(parse_property(cl, line_num, col)?);
            }
        }
    }

    if let Some((open_line, open)) = stack.last() {
        return Err(ParseError::new(ParseErrorKind::MissingEnd, *open_line, 1)
            .with_context(format!("BEGIN:{} is never closed", open.name)));
    }

    tracing::trace!(first_line, "iCalendar document parsed");
    root.map(|root| ICalendar { root })
        .ok_or_else(|| ParseError::new(ParseErrorKind::MissingBegin, first_line, 1))
}
