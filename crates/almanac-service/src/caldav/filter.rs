//! Calendar-query filter evaluation against parsed calendar objects.
//!
//! Implements the component, property and parameter filter semantics of
//! RFC 4791 §9.7 over an in-memory component tree.

use almanac_rfc::rfc::caldav::{CalendarFilter, CompFilter, ParamFilter, PropFilter, TimeRange};
use almanac_rfc::rfc::ical::core::{Component, Property, Value};
use almanac_rfc::rfc::ical::expand::ZoneResolver;

use super::recurrence::period_bounds;
use super::timerange::{occurs_in_range, value_extent};
use crate::error::ServiceResult;

/// ## Summary
/// Evaluates a calendar-query filter against one calendar object.
///
/// `calendar` must be the `VCALENDAR` root of the object.
///
/// ## Errors
/// Returns an error if a time-range test needs a TZID that cannot be
/// resolved or a recurrence rule that cannot be evaluated.
#[tracing::instrument(level = "trace", skip_all)]
pub fn matches(
    calendar: &Component,
    filter: &CalendarFilter,
    resolver: &ZoneResolver,
) -> ServiceResult<bool> {
    let root = filter.root();
    if !calendar.is_named(&root.name) {
        return Ok(false);
    }
    let evaluator = Evaluator { calendar, resolver };
    evaluator.component_matches(None, calendar, root)
}

struct Evaluator<'a> {
    calendar: &'a Component,
    resolver: &'a ZoneResolver,
}

impl Evaluator<'_> {
    /// Tests a component already selected by name against the rest of the filter.
    fn component_matches(
        &self,
        parent: Option<&Component>,
        component: &Component,
        filter: &CompFilter,
    ) -> ServiceResult<bool> {
        for child_filter in &filter.comp_filters {
            if !self.children_match(component, child_filter)? {
                return Ok(false);
            }
        }
        for prop_filter in &filter.prop_filters {
            if !self.prop_filter_matches(component, prop_filter)? {
                return Ok(false);
            }
        }
        // Most expensive test last.
        match &filter.time_range {
            Some(range) => {
                occurs_in_range(self.calendar, parent, component, range, self.resolver)
            }
            None => Ok(true),
        }
    }

    /// A comp-filter nested under `component`: some child of that name matches.
    fn children_match(&self, component: &Component, filter: &CompFilter) -> ServiceResult<bool> {
        let mut candidates = component
            .children
            .iter()
            .filter(|child| child.is_named(&filter.name));
        if filter.is_not_defined {
            return Ok(candidates.next().is_none());
        }
        for child in candidates {
            if self.component_matches(Some(component), child, filter)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn prop_filter_matches(
        &self,
        component: &Component,
        filter: &PropFilter,
    ) -> ServiceResult<bool> {
        let properties = component
            .properties
            .iter()
            .filter(|prop| prop.name.eq_ignore_ascii_case(&filter.name));
        if filter.is_not_defined {
            return Ok(properties.count() == 0);
        }
        for prop in properties {
            if self.property_matches(prop, filter)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn property_matches(&self, prop: &Property, filter: &PropFilter) -> ServiceResult<bool> {
        if let Some(text_match) = &filter.text_match
            && !text_match.matches(&property_text(prop))
        {
            return Ok(false);
        }
        if !filter
            .param_filters
            .iter()
            .all(|param_filter| param_filter_matches(prop, param_filter))
        {
            return Ok(false);
        }
        match &filter.time_range {
            Some(range) => self.value_in_range(&prop.value, range),
            None => Ok(true),
        }
    }

    /// Time-range test on a property value; non-temporal values never match.
    fn value_in_range(&self, value: &Value, range: &TimeRange) -> ServiceResult<bool> {
        let periods = value.periods();
        if !periods.is_empty() {
            for period in periods {
                let (start, end) = period_bounds(period, self.resolver)?;
                if range.overlaps(start, end) {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        for value in value.date_time_values() {
            let (start, end) = value_extent(&value, self.resolver)?;
            if range.overlaps(start, end) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Text a text-match is applied to: the unescaped value where known.
fn property_text(prop: &Property) -> String {
    match &prop.value {
        Value::Text(text) => text.clone(),
        Value::TextList(items) => items.join(","),
        _ => prop.raw_value.clone(),
    }
}

fn param_filter_matches(prop: &Property, filter: &ParamFilter) -> bool {
    let mut params = prop
        .params
        .iter()
        .filter(|param| param.name.eq_ignore_ascii_case(&filter.name));
    if filter.is_not_defined {
        return params.next().is_none();
    }
    match &filter.text_match {
        Some(text_match) => params
            .flat_map(|param| param.values.iter())
            .any(|value| text_match.matches(value)),
        None => params.next().is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_rfc::rfc::caldav::TextMatch;
    use almanac_rfc::rfc::ical::core::ICalendar;
    use almanac_rfc::rfc::ical::parse::parse;
    use chrono::{DateTime, TimeZone as _, Utc};

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn calendar(body: &str) -> ICalendar {
        parse(&format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n{body}END:VCALENDAR\r\n"
        ))
        .expect("valid calendar")
    }

    fn check(ical: &ICalendar, root: CompFilter) -> bool {
        let filter = CalendarFilter::new(root).expect("valid filter");
        matches(&ical.root, &filter, &ZoneResolver::default()).expect("evaluates")
    }

    fn vcalendar() -> CompFilter {
        CompFilter::new("VCALENDAR")
    }

    const TODO: &str = "BEGIN:VTODO\r\nUID:todo\r\nSUMMARY:Buy milk\r\n\
CATEGORIES:home,errands\r\nDUE;VALUE=DATE:20120105\r\n\
ATTENDEE;PARTSTAT=NEEDS-ACTION;ROLE=REQ-PARTICIPANT:mailto:a@example.com\r\n\
BEGIN:VALARM\r\nACTION:DISPLAY\r\nTRIGGER:-PT1H\r\nEND:VALARM\r\nEND:VTODO\r\n";

    const EVENT: &str = "BEGIN:VEVENT\r\nUID:event\r\nSUMMARY:Team meeting\\, weekly\r\n\
DTSTART:20120103T100000Z\r\nDTEND:20120103T110000Z\r\nEND:VEVENT\r\n";

    #[test_log::test]
    fn empty_filter_matches_everything() {
        assert!(check(&calendar(TODO), vcalendar()));
        assert!(check(&calendar(""), vcalendar()));
    }

    #[test_log::test]
    fn component_presence_and_absence() {
        let ical = calendar(TODO);
        assert!(check(&ical, vcalendar().with_comp_filter(CompFilter::new("VTODO"))));
        assert!(!check(&ical, vcalendar().with_comp_filter(CompFilter::new("VEVENT"))));
        assert!(check(
            &ical,
            vcalendar().with_comp_filter(CompFilter::new("VEVENT").not_defined())
        ));
        assert!(!check(
            &ical,
            vcalendar().with_comp_filter(CompFilter::new("VTODO").not_defined())
        ));
    }

    #[test_log::test]
    fn sibling_comp_filters_are_anded() {
        let both = calendar(&format!("{TODO}{EVENT}"));
        let filter = vcalendar()
            .with_comp_filter(CompFilter::new("VTODO"))
            .with_comp_filter(CompFilter::new("VEVENT"));
        assert!(check(&both, filter.clone()));
        assert!(!check(&calendar(TODO), filter));
    }

    #[test_log::test]
    fn missing_property_fails_prop_filter() {
        let ical = calendar(TODO);
        let filter = vcalendar().with_comp_filter(
            CompFilter::new("VTODO").with_prop_filter(PropFilter::new("LOCATION")),
        );
        assert!(!check(&ical, filter));
        let filter = vcalendar().with_comp_filter(
            CompFilter::new("VTODO").with_prop_filter(PropFilter::new("LOCATION").not_defined()),
        );
        assert!(check(&ical, filter));
    }

    #[test_log::test]
    fn text_match_uses_unescaped_value() {
        let ical = calendar(EVENT);
        let filter = |tm: TextMatch| {
            vcalendar().with_comp_filter(
                CompFilter::new("VEVENT")
                    .with_prop_filter(PropFilter::new("SUMMARY").with_text_match(tm)),
            )
        };
        assert!(check(&ical, filter(TextMatch::contains("meeting, week"))));
        assert!(!check(&ical, filter(TextMatch::contains("meeting\\,"))));
        assert!(check(&ical, filter(TextMatch::contains("lunch").negate())));
        assert!(!check(&ical, filter(TextMatch::contains("team").negate())));
    }

    #[test_log::test]
    fn text_match_on_lists_joins_items() {
        let ical = calendar(TODO);
        let filter = vcalendar().with_comp_filter(CompFilter::new("VTODO").with_prop_filter(
            PropFilter::new("CATEGORIES").with_text_match(TextMatch::equals("home,errands")),
        ));
        assert!(check(&ical, filter));
    }

    #[test_log::test]
    fn param_filters() {
        let ical = calendar(TODO);
        let with_param = |param: ParamFilter| {
            vcalendar().with_comp_filter(
                CompFilter::new("VTODO")
                    .with_prop_filter(PropFilter::new("ATTENDEE").with_param_filter(param)),
            )
        };
        assert!(check(
            &ical,
            with_param(ParamFilter::new("PARTSTAT").with_text_match(TextMatch::equals("needs-action")))
        ));
        assert!(!check(
            &ical,
            with_param(ParamFilter::new("PARTSTAT").with_text_match(TextMatch::equals("accepted")))
        ));
        assert!(check(&ical, with_param(ParamFilter::new("RSVP").not_defined())));
        assert!(!check(&ical, with_param(ParamFilter::new("ROLE").not_defined())));
        assert!(check(&ical, with_param(ParamFilter::new("ROLE"))));
    }

    #[test_log::test]
    fn comp_time_range() {
        let ical = calendar(EVENT);
        let in_window = |range: TimeRange| {
            vcalendar().with_comp_filter(CompFilter::new("VEVENT").with_time_range(range))
        };
        assert!(check(&ical, in_window(TimeRange::new(utc(2012, 1, 3), utc(2012, 1, 4)))));
        assert!(!check(&ical, in_window(TimeRange::new(utc(2012, 1, 4), utc(2012, 1, 5)))));
        assert!(check(&ical, in_window(TimeRange::from(utc(2012, 1, 2)))));
        assert!(!check(&ical, in_window(TimeRange::until(utc(2012, 1, 3)))));
    }

    #[test_log::test]
    fn prop_time_range_on_date_value() {
        let ical = calendar(TODO);
        let due_in = |range: TimeRange| {
            vcalendar().with_comp_filter(
                CompFilter::new("VTODO")
                    .with_prop_filter(PropFilter::new("DUE").with_time_range(range)),
            )
        };
        assert!(check(&ical, due_in(TimeRange::new(utc(2012, 1, 5), utc(2012, 1, 6)))));
        assert!(!check(&ical, due_in(TimeRange::new(utc(2012, 1, 6), utc(2012, 1, 7)))));
        // Non-temporal property never satisfies a time-range.
        let filter = vcalendar().with_comp_filter(CompFilter::new("VTODO").with_prop_filter(
            PropFilter::new("SUMMARY").with_time_range(TimeRange::from(utc(1970, 1, 1))),
        ));
        assert!(!check(&ical, filter));
    }

    #[test_log::test]
    fn nested_alarm_filter() {
        let ical = calendar(TODO);
        let filter = vcalendar().with_comp_filter(
            CompFilter::new("VTODO").with_comp_filter(
                CompFilter::new("VALARM")
                    .with_prop_filter(PropFilter::new("ACTION").with_text_match(TextMatch::equals("display"))),
            ),
        );
        assert!(check(&ical, filter));
        let filter = vcalendar().with_comp_filter(
            CompFilter::new("VTODO").with_comp_filter(CompFilter::new("VALARM").not_defined()),
        );
        assert!(!check(&ical, filter));
    }

    #[test_log::test]
    fn existential_over_same_name_components() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:a\r\nSUMMARY:first\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:b\r\nSUMMARY:second\r\nEND:VEVENT\r\n",
        );
        let filter = vcalendar().with_comp_filter(CompFilter::new("VEVENT").with_prop_filter(
            PropFilter::new("SUMMARY").with_text_match(TextMatch::equals("second")),
        ));
        assert!(check(&ical, filter));
    }

    #[test_log::test]
    fn repeated_evaluation_gives_the_same_answer() {
        let ical = calendar(&format!(
            "{TODO}{EVENT}BEGIN:VEVENT\r\nUID:weekly\r\n\
DTSTART;TZID=Europe/Berlin:20120207T181500\r\n\
DTEND;TZID=Europe/Berlin:20120207T191500\r\n\
RRULE:FREQ=WEEKLY;BYDAY=TU,TH\r\nEND:VEVENT\r\n"
        ));
        let resolver = ZoneResolver::default();
        let filters = [
            vcalendar(),
            vcalendar().with_comp_filter(CompFilter::new("VEVENT").with_time_range(
                TimeRange::new(utc(2012, 2, 14), utc(2012, 2, 15)),
            )),
            vcalendar().with_comp_filter(CompFilter::new("VEVENT").with_time_range(
                TimeRange::new(utc(2012, 2, 12), utc(2012, 2, 13)),
            )),
            vcalendar().with_comp_filter(
                CompFilter::new("VTODO").with_prop_filter(
                    PropFilter::new("SUMMARY").with_text_match(TextMatch::contains("milk").negate()),
                ),
            ),
        ]
        .map(|root| CalendarFilter::new(root).expect("valid filter"));

        let run = || {
            filters
                .iter()
                .map(|filter| matches(&ical.root, filter, &resolver).expect("evaluates"))
                .collect::<Vec<_>>()
        };
        let first = run();
        assert_eq!(first, [true, true, false, false]);
        assert_eq!(run(), first);
    }
}
