//! iCalendar core models (RFC 5545).
//!
//! A parsed calendar object is a tree of [`Component`]s owning ordered
//! [`Property`] lists. Property names and parameter names are stored
//! upper-cased; lookups are case-insensitive. Raw values are kept next to
//! typed values so unknown content survives serialization.

mod component;
mod datetime;
mod duration;
mod parameter;
mod property;
mod rrule;
mod value;

pub use component::{Component, ComponentKind, ICalendar};
pub use datetime::{DateTime, DateTimeForm, DateTimeValue, UtcOffset};
pub use duration::Duration;
pub use parameter::Parameter;
pub use property::{ContentLine, Property};
pub use self::rrule::{Frequency, RRule, RRuleUntil, Weekday, WeekdayNum};
pub use value::{Period, Value};

/// Well-known property names.
pub mod names {
    pub const BEGIN: &str = "BEGIN";
    pub const END: &str = "END";
    pub const UID: &str = "UID";
    pub const DTSTART: &str = "DTSTART";
    pub const DTEND: &str = "DTEND";
    pub const DUE: &str = "DUE";
    pub const DURATION: &str = "DURATION";
    pub const COMPLETED: &str = "COMPLETED";
    pub const CREATED: &str = "CREATED";
    pub const RRULE: &str = "RRULE";
    pub const RDATE: &str = "RDATE";
    pub const EXDATE: &str = "EXDATE";
    pub const EXRULE: &str = "EXRULE";
    pub const RECURRENCE_ID: &str = "RECURRENCE-ID";
    pub const STATUS: &str = "STATUS";
    pub const TRIGGER: &str = "TRIGGER";
    pub const REPEAT: &str = "REPEAT";
    pub const FREEBUSY: &str = "FREEBUSY";
    pub const TZID: &str = "TZID";
    pub const TZOFFSETFROM: &str = "TZOFFSETFROM";
    pub const TZOFFSETTO: &str = "TZOFFSETTO";
    pub const TZNAME: &str = "TZNAME";
    pub const VERSION: &str = "VERSION";
    pub const PRODID: &str = "PRODID";
    pub const CALSCALE: &str = "CALSCALE";

    /// Parameter names.
    pub mod params {
        pub const VALUE: &str = "VALUE";
        pub const TZID: &str = "TZID";
        pub const RELATED: &str = "RELATED";
        pub const RANGE: &str = "RANGE";
    }
}
