//! ## Summary
//! Reports filter elements the engine cannot evaluate.
//!
//! RFC 4791 §7.8 answers such queries with a `supported-filter`
//! precondition failure; this check gives the protocol layer the offending
//! name.

use crate::rfc::caldav::{CalendarFilter, CompFilter, PropFilter};

/// The first filter element the engine does not support.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnsupportedFilter {
    #[error("Unsupported component in filter: {0}")]
    Component(String),
    #[error("Unsupported property in filter: {0}")]
    Property(String),
    #[error("Unsupported parameter in filter: {0}")]
    Parameter(String),
}

const COMPONENTS: &[&str] = &[
    "VCALENDAR",
    "VEVENT",
    "VTODO",
    "VJOURNAL",
    "VFREEBUSY",
    "VALARM",
    "VTIMEZONE",
    "STANDARD",
    "DAYLIGHT",
];

const PROPERTIES: &[&str] = &[
    "ACTION",
    "ATTACH",
    "ATTENDEE",
    "CATEGORIES",
    "CLASS",
    "COMMENT",
    "COMPLETED",
    "CONTACT",
    "CREATED",
    "DESCRIPTION",
    "DTEND",
    "DTSTAMP",
    "DTSTART",
    "DUE",
    "DURATION",
    "EXDATE",
    "FREEBUSY",
    "GEO",
    "LAST-MODIFIED",
    "LOCATION",
    "ORGANIZER",
    "PERCENT-COMPLETE",
    "PRIORITY",
    "RDATE",
    "RECURRENCE-ID",
    "RELATED-TO",
    "REPEAT",
    "RESOURCES",
    "RRULE",
    "SEQUENCE",
    "STATUS",
    "SUMMARY",
    "TRANSP",
    "TRIGGER",
    "TZID",
    "UID",
    "URL",
];

const PARAMETERS: &[&str] = &[
    "CN",
    "CUTYPE",
    "EMAIL",
    "FBTYPE",
    "LANGUAGE",
    "PARTSTAT",
    "RANGE",
    "RELATED",
    "RELTYPE",
    "ROLE",
    "RSVP",
    "TZID",
    "VALUE",
];

fn listed(list: &[&str], name: &str) -> bool {
    list.iter().any(|known| known.eq_ignore_ascii_case(name))
}

fn is_extension(name: &str) -> bool {
    name.get(..2)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("X-"))
}

fn check_prop(filter: &PropFilter) -> Result<(), UnsupportedFilter> {
    if !listed(PROPERTIES, &filter.name) && !is_extension(&filter.name) {
        return Err(UnsupportedFilter::Property(filter.name.clone()));
    }
    match filter
        .param_filters
        .iter()
        .find(|p| !listed(PARAMETERS, &p.name) && !is_extension(&p.name))
    {
        Some(param) => Err(UnsupportedFilter::Parameter(param.name.clone())),
        None => Ok(()),
    }
}

fn check_comp(filter: &CompFilter) -> Result<(), UnsupportedFilter> {
    if !listed(COMPONENTS, &filter.name) {
        return Err(UnsupportedFilter::Component(filter.name.clone()));
    }
    filter.prop_filters.iter().try_for_each(check_prop)?;
    filter.comp_filters.iter().try_for_each(check_comp)
}

/// ## Summary
/// Checks that a filter only names supported components, properties and
/// parameters. `X-` properties and parameters are always accepted.
///
/// ## Errors
/// Returns the first unsupported element in document order.
pub fn validate_calendar_filter(filter: &CalendarFilter) -> Result<(), UnsupportedFilter> {
    check_comp(filter.root())
}
