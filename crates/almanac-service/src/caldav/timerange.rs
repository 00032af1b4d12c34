//! Time-range matching for calendar components (RFC 4791 §9.9).

use almanac_rfc::rfc::caldav::TimeRange;
use almanac_rfc::rfc::ical::core::{Component, ComponentKind, DateTimeValue, Property, names};
use almanac_rfc::rfc::ical::expand::ZoneResolver;
use chrono::{DateTime, TimeDelta, Utc};

use super::recurrence::{RecurrenceSet, period_bounds};
use crate::error::ServiceResult;

/// Upper bound on `REPEAT` honoured for alarm triggers.
const MAX_ALARM_REPEAT: i64 = 1_000;

/// ## Summary
/// Decides whether `component` occurs within `range`.
///
/// `calendar` is the `VCALENDAR` holding the component (used to find
/// recurrence overrides), `parent` the enclosing component (used for
/// `VALARM`). Recurring components match if any occurrence does.
/// Components without any date never match.
///
/// ## Errors
/// Returns an error if a TZID cannot be resolved or a recurrence rule is
/// rejected.
pub fn occurs_in_range(
    calendar: &Component,
    parent: Option<&Component>,
    component: &Component,
    range: &TimeRange,
    resolver: &ZoneResolver,
) -> ServiceResult<bool> {
    match component.kind {
        Some(ComponentKind::Event | ComponentKind::Journal) => {
            set_in_range(calendar, component, range, resolver)
        }
        Some(ComponentKind::Todo) if component.has_property(names::DTSTART) => {
            set_in_range(calendar, component, range, resolver)
        }
        Some(ComponentKind::Todo) => todo_without_start(component, range, resolver),
        Some(ComponentKind::FreeBusy) => freebusy_in_range(component, range, resolver),
        Some(ComponentKind::Alarm) => alarm_in_range(calendar, parent, component, range, resolver),
        _ => {
            tracing::trace!(component = %component.name, "No time-range semantics");
            Ok(false)
        }
    }
}

fn set_in_range(
    calendar: &Component,
    component: &Component,
    range: &TimeRange,
    resolver: &ZoneResolver,
) -> ServiceResult<bool> {
    match RecurrenceSet::for_component(calendar, component, resolver)? {
        Some(set) => set.any(range),
        None => Ok(false),
    }
}

/// ## Summary
/// Absolute extent of a single DATE or DATE-TIME value.
///
/// A DATE covers its whole day in the default zone; a DATE-TIME is a
/// zero-length instant.
///
/// ## Errors
/// Returns an error if the TZID cannot be resolved.
pub fn value_extent(
    value: &DateTimeValue,
    resolver: &ZoneResolver,
) -> ServiceResult<(DateTime<Utc>, DateTime<Utc>)> {
    let start = resolver.to_utc(value)?;
    let DateTimeValue::Date(date) = value else {
        return Ok((start, start));
    };
    let end = match date.succ_opt() {
        Some(next) => resolver.to_utc(&DateTimeValue::Date(next))?,
        None => start,
    };
    Ok((start, end))
}

fn value_in_range(
    value: &DateTimeValue,
    range: &TimeRange,
    resolver: &ZoneResolver,
) -> ServiceResult<bool> {
    let (start, end) = value_extent(value, resolver)?;
    Ok(range.overlaps(start, end))
}

/// A `VTODO` with no DTSTART: DUE, then CREATED/COMPLETED.
fn todo_without_start(
    todo: &Component,
    range: &TimeRange,
    resolver: &ZoneResolver,
) -> ServiceResult<bool> {
    if let Some(due) = todo.date_time_value(names::DUE) {
        return value_in_range(&due, range, resolver);
    }
    let created = todo
        .date_time_value(names::CREATED)
        .map(|v| resolver.to_utc(&v))
        .transpose()?;
    let completed = todo
        .date_time_value(names::COMPLETED)
        .map(|v| resolver.to_utc(&v))
        .transpose()?;
    Ok(match (created, completed) {
        (Some(created), Some(completed)) => range.overlaps(created, completed),
        (None, Some(completed)) => range.contains(completed),
        (Some(created), None) => range.end.is_none_or(|end| end > created),
        (None, None) => false,
    })
}

fn freebusy_in_range(
    freebusy: &Component,
    range: &TimeRange,
    resolver: &ZoneResolver,
) -> ServiceResult<bool> {
    if let Some(dtstart) = freebusy.date_time_value(names::DTSTART) {
        let start = resolver.to_utc(&dtstart)?;
        let end = freebusy
            .date_time_value(names::DTEND)
            .map(|v| resolver.to_utc(&v))
            .transpose()?
            .unwrap_or(start);
        if range.overlaps(start, end) {
            return Ok(true);
        }
    }
    for prop in freebusy.get_properties(names::FREEBUSY) {
        for period in prop.value.periods() {
            let (start, end) = period_bounds(period, resolver)?;
            if range.overlaps(start, end) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Offsets of every trigger repetition from the first one.
fn repetitions(alarm: &Component) -> Vec<TimeDelta> {
    let repeat = alarm
        .get_property(names::REPEAT)
        .and_then(Property::as_integer)
        .unwrap_or(0)
        .clamp(0, MAX_ALARM_REPEAT);
    let interval = alarm
        .get_property(names::DURATION)
        .and_then(Property::as_duration)
        .map_or_else(TimeDelta::zero, |d| d.as_delta());
    (0..=repeat)
        .filter_map(|n| i32::try_from(n).ok())
        .filter_map(|n| interval.checked_mul(n))
        .collect()
}

/// ## Summary
/// A `VALARM` matches if one of its trigger instants falls in the range.
///
/// Relative triggers are evaluated against every occurrence of the parent
/// (start, or end with `RELATED=END`), repeated `REPEAT` times every
/// `DURATION`.
fn alarm_in_range(
    calendar: &Component,
    parent: Option<&Component>,
    alarm: &Component,
    range: &TimeRange,
    resolver: &ZoneResolver,
) -> ServiceResult<bool> {
    let Some(trigger) = alarm.get_property(names::TRIGGER) else {
        return Ok(false);
    };
    let repeats = repetitions(alarm);

    if let Some(at) = trigger.as_date_time_value() {
        let at = resolver.to_utc(&at)?;
        return Ok(repeats
            .iter()
            .any(|r| at.checked_add_signed(*r).is_some_and(|t| range.contains(t))));
    }

    let Some(offset) = trigger.as_duration().map(|d| d.as_delta()) else {
        return Ok(false);
    };
    let Some(parent) = parent else {
        return Ok(false);
    };
    let Some(set) = RecurrenceSet::for_component(calendar, parent, resolver)? else {
        return Ok(false);
    };
    let related_end = trigger
        .get_param_value(names::params::RELATED)
        .is_some_and(|r| r.eq_ignore_ascii_case("END"));

    let shifts: Vec<TimeDelta> = repeats.iter().map(|r| offset + *r).collect();
    let earliest = shifts.iter().min().copied().unwrap_or(offset);
    let latest = shifts.iter().max().copied().unwrap_or(offset);
    // Occurrences whose base instant can put a trigger inside the range.
    let widened = TimeRange {
        start: range.start.and_then(|s| s.checked_sub_signed(latest)),
        end: range.end.and_then(|e| e.checked_sub_signed(earliest)),
    };

    for occurrence in set.occurrences(&widened) {
        let occurrence = occurrence?;
        // Overridden instances carry their own alarms.
        if !std::ptr::eq(occurrence.component, parent) {
            continue;
        }
        let base = if related_end {
            occurrence.end
        } else {
            occurrence.start
        };
        if shifts
            .iter()
            .any(|s| base.checked_add_signed(*s).is_some_and(|t| range.contains(t)))
        {
            return Ok(true);
        }
    }
    Ok(false)
}
