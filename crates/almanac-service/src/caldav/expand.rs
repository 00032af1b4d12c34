//! Calendar-data shaping for `expand` and `limit-recurrence-set`
//! (RFC 4791 §9.6.5, §9.6.6).

use almanac_rfc::rfc::caldav::TimeRange;
use almanac_rfc::rfc::ical::core::{
    Component, ComponentKind, DateTime as IcalDateTime, DateTimeValue, ICalendar, Property, Value,
    names,
};
use almanac_rfc::rfc::ical::expand::ZoneResolver;
use chrono::{DateTime, Utc};

use super::recurrence::{Occurrence, RecurrenceSet};
use super::timerange::occurs_in_range;
use crate::error::ServiceResult;

/// Properties that describe the recurrence rather than one instance.
const RECURRENCE_PROPERTIES: &[&str] = &[names::RRULE, names::RDATE, names::EXDATE, names::EXRULE];

/// ## Summary
/// Materializes every occurrence intersecting `window` as a standalone
/// component.
///
/// Emitted instances carry UTC DTSTART/DTEND (or DUE) and, for recurring
/// components, a UTC RECURRENCE-ID; the recurrence properties are dropped.
/// All-day instances keep DATE values. `VTIMEZONE` components are omitted
/// and components without recurrence semantics are copied unchanged.
///
/// ## Errors
/// Returns an error if a TZID cannot be resolved, a rule is rejected, or a
/// recurring component with an unbounded rule is expanded over a window
/// without an end.
#[tracing::instrument(skip_all, fields(components = ical.root.children.len()))]
pub fn expand_calendar(
    ical: &ICalendar,
    window: &TimeRange,
    resolver: &ZoneResolver,
    max_instances: usize,
) -> ServiceResult<ICalendar> {
    let calendar = &ical.root;
    let mut root = shell(calendar);

    for component in &calendar.children {
        match component.kind {
            Some(ComponentKind::Timezone) => {}
            Some(kind) if kind.is_recurrable() => {
                if component.recurrence_id().is_some() && has_master(calendar, component) {
                    continue;
                }
                let Some(set) = RecurrenceSet::for_component(calendar, component, resolver)? else {
                    // Date-less to-dos still have time-range semantics.
                    if occurs_in_range(calendar, None, component, window, resolver)? {
                        root.add_child(to_utc_component(component, resolver)?);
                    }
                    continue;
                };
                for occurrence in set.expand(window, max_instances)? {
                    root.add_child(materialize(&occurrence, resolver)?);
                }
            }
            _ => root.add_child(component.clone()),
        }
    }

    tracing::debug!(emitted = root.children.len(), "Expanded calendar");
    Ok(ICalendar { root })
}

/// ## Summary
/// Keeps masters and only the overrides whose instance intersects
/// `window`.
///
/// Generated instances are not materialized; the calendar is otherwise
/// returned unchanged.
///
/// ## Errors
/// Returns an error if an override's instant cannot be resolved.
#[tracing::instrument(skip_all, fields(components = ical.root.children.len()))]
pub fn limit_recurrence_set(
    ical: &ICalendar,
    window: &TimeRange,
    resolver: &ZoneResolver,
) -> ServiceResult<ICalendar> {
    let calendar = &ical.root;
    let mut root = shell(calendar);
    for component in &calendar.children {
        let is_override = component.kind.is_some_and(ComponentKind::is_recurrable)
            && component.recurrence_id().is_some()
            && has_master(calendar, component);
        if is_override {
            let keep = match RecurrenceSet::new(component, [], resolver)? {
                Some(set) => set.any(window)?,
                None => false,
            };
            if !keep {
                tracing::trace!(uid = component.uid().unwrap_or_default(), "Dropped override");
                continue;
            }
        }
        root.add_child(component.clone());
    }
    Ok(ICalendar { root })
}

/// Copy of `calendar` with its properties but no children.
fn shell(calendar: &Component) -> Component {
    Component {
        kind: calendar.kind,
        name: calendar.name.clone(),
        properties: calendar.properties.clone(),
        children: Vec::new(),
    }
}

fn has_master(calendar: &Component, component: &Component) -> bool {
    let Some(uid) = component.uid() else {
        return false;
    };
    calendar.children.iter().any(|sibling| {
        sibling.kind == component.kind
            && sibling.uid() == Some(uid)
            && sibling.recurrence_id().is_none()
    })
}

fn utc_property(name: &str, at: DateTime<Utc>) -> Property {
    Property::datetime(name, IcalDateTime::utc(at.naive_utc()))
}

/// DATE in the default zone for all-day instances, UTC DATE-TIME otherwise.
fn instant_property(
    name: &str,
    at: DateTime<Utc>,
    all_day: bool,
    resolver: &ZoneResolver,
) -> Property {
    if all_day {
        Property::date(name, at.with_timezone(&resolver.default_zone()).date_naive())
    } else {
        utc_property(name, at)
    }
}

/// One instance as a standalone component.
fn materialize(occurrence: &Occurrence<'_>, resolver: &ZoneResolver) -> ServiceResult<Component> {
    let source = occurrence.component;
    let mut component = to_utc_component(source, resolver)?;
    for name in RECURRENCE_PROPERTIES {
        component.remove_properties(name);
    }

    let all_day = occurrence.all_day;
    replace_in_place(
        &mut component,
        instant_property(names::DTSTART, occurrence.start, all_day, resolver),
    );

    let end_name = if source.kind == Some(ComponentKind::Todo) {
        names::DUE
    } else {
        names::DTEND
    };
    let inherits_span = occurrence.is_override
        && occurrence.end != occurrence.start
        && !source.has_property(names::DURATION);
    if source.kind != Some(ComponentKind::Journal)
        && (source.has_property(end_name) || inherits_span)
    {
        replace_in_place(
            &mut component,
            instant_property(end_name, occurrence.end, all_day, resolver),
        );
    }

    if let Some(recurrence_id) = occurrence.recurrence_id {
        replace_in_place(
            &mut component,
            instant_property(names::RECURRENCE_ID, recurrence_id, all_day, resolver),
        );
    }
    Ok(component)
}

/// Replaces the first property of the same name in place, or appends.
fn replace_in_place(component: &mut Component, prop: Property) {
    let position = component
        .properties
        .iter()
        .position(|existing| existing.name.eq_ignore_ascii_case(&prop.name));
    component.remove_properties(&prop.name);
    match position {
        Some(index) => component.properties.insert(index, prop),
        None => component.properties.push(prop),
    }
}

/// ## Summary
/// Clone of `component` with every zoned or floating DATE-TIME converted to
/// UTC, recursively.
///
/// Lists are converted element-wise; DATE values are left alone.
fn to_utc_component(component: &Component, resolver: &ZoneResolver) -> ServiceResult<Component> {
    let mut converted = Component {
        kind: component.kind,
        name: component.name.clone(),
        properties: Vec::with_capacity(component.properties.len()),
        children: Vec::with_capacity(component.children.len()),
    };
    for prop in &component.properties {
        converted.properties.push(to_utc_property(prop, resolver)?);
    }
    for child in &component.children {
        converted.children.push(to_utc_component(child, resolver)?);
    }
    Ok(converted)
}

fn to_utc_property(prop: &Property, resolver: &ZoneResolver) -> ServiceResult<Property> {
    let anchor = |dt: &IcalDateTime| -> ServiceResult<IcalDateTime> {
        if dt.is_utc() {
            return Ok(dt.clone());
        }
        let at = resolver.to_utc(&DateTimeValue::DateTime(dt.clone()))?;
        Ok(IcalDateTime::utc(at.naive_utc()))
    };
    let value = match &prop.value {
        Value::DateTime(dt) if !dt.is_utc() => Value::DateTime(anchor(dt)?),
        Value::DateTimeList(list) if list.iter().any(|dt| !dt.is_utc()) => {
            Value::DateTimeList(list.iter().map(anchor).collect::<ServiceResult<_>>()?)
        }
        _ => return Ok(prop.clone()),
    };

    let raw_value = match &value {
        Value::DateTime(dt) => dt.to_string(),
        Value::DateTimeList(list) => list
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
        _ => prop.raw_value.clone(),
    };
    let mut converted = Property {
        name: prop.name.clone(),
        params: prop.params.clone(),
        value,
        raw_value,
    };
    converted.remove_param(names::params::TZID);
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_rfc::rfc::ical::build::serialize;
    use almanac_rfc::rfc::ical::parse::parse;
    use chrono::TimeZone as _;
    use chrono_tz::Tz;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn calendar(body: &str) -> ICalendar {
        parse(&format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n{body}END:VCALENDAR\r\n"
        ))
        .expect("valid calendar")
    }

    fn raw(component: &Component, name: &str) -> Option<String> {
        component.get_property(name).map(|p| p.raw_value.clone())
    }

    const BERLIN: &str = "BEGIN:VEVENT\r\nUID:foobar\r\n\
DTEND;TZID=Europe/Berlin:20120207T191500\r\n\
RRULE:FREQ=WEEKLY;INTERVAL=1;BYDAY=TU,TH\r\n\
SUMMARY:RecurringEvents on tuesday and thursday\r\n\
DTSTART;TZID=Europe/Berlin:20120207T181500\r\nEND:VEVENT\r\n";

    #[test_log::test]
    fn weekly_berlin_event_in_utc() {
        let ical = calendar(BERLIN);
        let window = TimeRange::new(utc(2012, 2, 10, 23, 0), utc(2012, 2, 17, 22, 59));
        let expanded =
            expand_calendar(&ical, &window, &ZoneResolver::default(), 100).expect("expands");

        let events = expanded.events();
        assert_eq!(events.len(), 2);
        let starts: Vec<_> = events.iter().filter_map(|e| raw(e, names::DTSTART)).collect();
        let ends: Vec<_> = events.iter().filter_map(|e| raw(e, names::DTEND)).collect();
        assert_eq!(starts, ["20120214T171500Z", "20120216T171500Z"]);
        assert_eq!(ends, ["20120214T181500Z", "20120216T181500Z"]);

        for event in events {
            assert!(!event.has_property(names::RRULE));
            assert_eq!(event.get_property(names::DTSTART).and_then(Property::tzid), None);
            assert_eq!(raw(event, names::RECURRENCE_ID), raw(event, names::DTSTART));
            assert_eq!(
                event.summary(),
                Some("RecurringEvents on tuesday and thursday")
            );
        }
        assert!(!serialize(&expanded).contains("TZID"));
    }

    #[test_log::test]
    fn vtimezone_is_omitted() {
        let ical = calendar(
            "BEGIN:VTIMEZONE\r\nTZID:Fixed\r\nBEGIN:STANDARD\r\nDTSTART:19700101T000000\r\n\
TZOFFSETFROM:+0200\r\nTZOFFSETTO:+0200\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n\
BEGIN:VEVENT\r\nUID:fixed\r\nDTSTART;TZID=Fixed:20120103T120000\r\nEND:VEVENT\r\n",
        );
        let expanded = expand_calendar(
            &ical,
            &TimeRange::new(utc(2012, 1, 3, 0, 0), utc(2012, 1, 4, 0, 0)),
            &ZoneResolver::for_calendar(&ical, Tz::UTC).expect("valid zones"),
            100,
        )
        .expect("expands");
        assert!(expanded.timezones().is_empty());
        let event = expanded.events()[0];
        assert_eq!(raw(event, names::DTSTART).as_deref(), Some("20120103T100000Z"));
        assert!(!event.has_property(names::RECURRENCE_ID));
    }

    #[test_log::test]
    fn overrides_replace_their_instance() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:daily\r\nSUMMARY:standup\r\nDTSTART:20120101T090000Z\r\n\
DTEND:20120101T091500Z\r\nRRULE:FREQ=DAILY;COUNT=3\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:daily\r\nSUMMARY:moved standup\r\nRECURRENCE-ID:20120102T090000Z\r\n\
DTSTART:20120102T140000Z\r\nEND:VEVENT\r\n",
        );
        let expanded = expand_calendar(
            &ical,
            &TimeRange::new(utc(2012, 1, 1, 0, 0), utc(2012, 1, 4, 0, 0)),
            &ZoneResolver::default(),
            100,
        )
        .expect("expands");
        let summaries: Vec<_> = expanded.events().iter().filter_map(|e| e.summary()).collect();
        assert_eq!(summaries, ["standup", "moved standup", "standup"]);

        let moved = expanded.events()[1];
        assert_eq!(raw(moved, names::DTSTART).as_deref(), Some("20120102T140000Z"));
        assert_eq!(raw(moved, names::DTEND).as_deref(), Some("20120102T141500Z"));
        assert_eq!(
            raw(moved, names::RECURRENCE_ID).as_deref(),
            Some("20120102T090000Z")
        );
    }

    #[test_log::test]
    fn all_day_instances_keep_dates() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:holiday\r\nDTSTART;VALUE=DATE:20120101\r\n\
DTEND;VALUE=DATE:20120102\r\nRRULE:FREQ=YEARLY\r\nEND:VEVENT\r\n",
        );
        let expanded = expand_calendar(
            &ical,
            &TimeRange::new(utc(2013, 1, 1, 0, 0), utc(2013, 1, 2, 0, 0)),
            &ZoneResolver::default(),
            100,
        )
        .expect("expands");
        let event = expanded.events()[0];
        assert_eq!(raw(event, names::DTSTART).as_deref(), Some("20130101"));
        assert_eq!(raw(event, names::DTEND).as_deref(), Some("20130102"));
        assert_eq!(raw(event, names::RECURRENCE_ID).as_deref(), Some("20130101"));
    }

    #[test_log::test]
    fn unbounded_rule_needs_window_end() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:forever\r\nDTSTART:20120101T090000Z\r\n\
RRULE:FREQ=DAILY\r\nEND:VEVENT\r\n",
        );
        let result = expand_calendar(
            &ical,
            &TimeRange::from(utc(2012, 1, 1, 0, 0)),
            &ZoneResolver::default(),
            100,
        );
        assert!(matches!(
            result,
            Err(crate::error::ServiceError::UnboundedExpansion(_))
        ));
    }

    #[test_log::test]
    fn limit_recurrence_set_keeps_overlapping_overrides() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:daily\r\nDTSTART:20120101T090000Z\r\nRRULE:FREQ=DAILY\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:daily\r\nRECURRENCE-ID:20120102T090000Z\r\nDTSTART:20120102T100000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:daily\r\nRECURRENCE-ID:20120110T090000Z\r\nDTSTART:20120110T100000Z\r\n\
END:VEVENT\r\n",
        );
        let limited = limit_recurrence_set(
            &ical,
            &TimeRange::new(utc(2012, 1, 1, 0, 0), utc(2012, 1, 5, 0, 0)),
            &ZoneResolver::default(),
        )
        .expect("limits");
        let events = limited.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].has_property(names::RRULE));
        assert_eq!(
            raw(events[1], names::RECURRENCE_ID).as_deref(),
            Some("20120102T090000Z")
        );
    }
}
