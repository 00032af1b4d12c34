//! Wall-clock evaluation of recurrence rules through the `rrule` crate.

use chrono::{NaiveDateTime, TimeZone as _};
use rrule::{RRuleSet, Tz, Unvalidated};

use crate::error::{RfcError, RfcResult};
use crate::rfc::ical::core::RRule;

/// A recurrence rule bound to a wall-clock start.
///
/// The `rrule` crate iterates in a zone; feeding it the local reading as if
/// it were UTC makes every step a pure calendar operation. `UNTIL` is left
/// out of the built set because it bounds absolute instants and is applied
/// by the caller after anchoring.
#[derive(Debug, Clone)]
pub struct CivilRule {
    set: RRuleSet,
}

impl CivilRule {
    /// ## Summary
    /// Builds the rule set for `rule` starting at the local reading `dtstart`.
    ///
    /// ## Errors
    /// Returns `RfcError::InvalidRecurrence` if the `rrule` crate rejects
    /// the rule for this start (for example `BYWEEKNO` outside `YEARLY`).
    pub fn new(rule: &RRule, dtstart: NaiveDateTime) -> RfcResult<Self> {
        let text = rule.without_until().to_string();
        let parsed = text
            .parse::<rrule::RRule<Unvalidated>>()
            .map_err(|e| RfcError::InvalidRecurrence(format!("{text}: {e}")))?;
        let set = parsed
            .build(Tz::UTC.from_utc_datetime(&dtstart))
            .map_err(|e| RfcError::InvalidRecurrence(format!("{text}: {e}")))?;
        Ok(Self { set })
    }

    /// Lazily yields the rule's wall-clock readings in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        civil_instants(&self.set)
    }
}

/// Reads the instants of a civil-time rule set back as wall-clock values.
pub fn civil_instants(set: &RRuleSet) -> impl Iterator<Item = NaiveDateTime> + '_ {
    set.into_iter().map(|dt| dt.naive_utc())
}
