//! Recurrence sets: a master component, its rule, and its overridden instances.
//!
//! Rule instants are generated on the wall clock of the master's zone and
//! only anchored to absolute instants afterwards, so `BYDAY`/`BYMONTHDAY`
//! land on the intended local date across daylight-saving changes.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use almanac_rfc::rfc::caldav::TimeRange;
use almanac_rfc::rfc::ical::core::{
    Component, ComponentKind, DateTimeValue, Duration, Period, Property, RRuleUntil, names,
};
use almanac_rfc::rfc::ical::expand::{CivilRule, TimezoneError, Zone, ZoneResolver};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

use crate::error::{ServiceError, ServiceResult};

/// One concrete instance of a (possibly recurring) component.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence<'a> {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Instant this occurrence was generated for; `None` for a
    /// non-recurring component.
    pub recurrence_id: Option<DateTime<Utc>>,
    /// The master, or the override replacing this instance.
    pub component: &'a Component,
    pub is_override: bool,
    /// Whether the instance is read from a DATE (all-day) start.
    pub all_day: bool,
}

/// How an instance's end follows from its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Instant,
    /// Wall-clock difference, applied before anchoring.
    Civil(TimeDelta),
    /// Absolute length.
    Exact(TimeDelta),
    /// DURATION: days on the wall clock, then exact time.
    Nominal(Duration),
}

impl Span {
    /// The span a component declares through DTEND/DUE or DURATION.
    fn declared(
        component: &Component,
        dtstart: &DateTimeValue,
        start: DateTime<Utc>,
        resolver: &ZoneResolver,
    ) -> ServiceResult<Option<Self>> {
        let end_name = match component.kind {
            Some(ComponentKind::Journal) => return Ok(None),
            Some(ComponentKind::Todo) => names::DUE,
            _ => names::DTEND,
        };
        if let Some(end) = component.date_time_value(end_name) {
            if same_frame(dtstart, &end) {
                return Ok(Some(Self::Civil(end.civil() - dtstart.civil())));
            }
            let end = resolver.to_utc(&end)?;
            return Ok(Some(Self::Exact(end - start)));
        }
        Ok(component
            .get_property(names::DURATION)
            .and_then(Property::as_duration)
            .copied()
            .map(Self::Nominal))
    }

    /// All-day starts last one day; date-time starts are instants.
    fn implied(dtstart: &DateTimeValue) -> Self {
        if dtstart.is_date() {
            Self::Nominal(Duration::days(1))
        } else {
            Self::Instant
        }
    }

    fn end(
        self,
        zone: &Zone,
        local: Option<NaiveDateTime>,
        start: DateTime<Utc>,
    ) -> ServiceResult<DateTime<Utc>> {
        let end = match (self, local) {
            (Self::Instant, _) => start,
            (Self::Exact(delta), _) | (Self::Civil(delta), None) => shift(start, delta)?,
            (Self::Civil(delta), Some(local)) => {
                let local = local
                    .checked_add_signed(delta)
                    .ok_or_else(|| out_of_range(local))?;
                zone.to_utc(local)?
            }
            (Self::Nominal(duration), Some(local)) => {
                let local = duration
                    .add_nominal(local)
                    .ok_or_else(|| out_of_range(local))?;
                shift(
                    zone.to_utc(local)?,
                    TimeDelta::seconds(duration.exact_seconds()),
                )?
            }
            (Self::Nominal(duration), None) => shift(start, duration.as_delta())?,
        };
        Ok(end.max(start))
    }
}

/// Whether two values are read on the same wall clock.
fn same_frame(a: &DateTimeValue, b: &DateTimeValue) -> bool {
    match (a, b) {
        (DateTimeValue::Date(_), DateTimeValue::Date(_)) => true,
        (DateTimeValue::DateTime(a), DateTimeValue::DateTime(b)) => a.form == b.form,
        _ => false,
    }
}

fn shift(at: DateTime<Utc>, delta: TimeDelta) -> ServiceResult<DateTime<Utc>> {
    at.checked_add_signed(delta)
        .ok_or_else(|| ServiceError::from(TimezoneError::OutOfRange(at.to_string())))
}

fn out_of_range(local: NaiveDateTime) -> ServiceError {
    TimezoneError::OutOfRange(local.to_string()).into()
}

/// A start instant before exclusions and overrides are applied.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    /// Wall-clock reading in the master's zone, when known.
    local: Option<NaiveDateTime>,
    start: DateTime<Utc>,
    /// Explicit end of an RDATE period.
    end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct Rule {
    civil: CivilRule,
    count: Option<usize>,
    until: Option<RRuleUntil>,
    unbounded: bool,
}

impl Rule {
    /// Whether a candidate is within `UNTIL`; a UTC bound is compared on the
    /// absolute instant, a local bound on the wall clock.
    fn admits(&self, candidate: &Candidate) -> bool {
        let Some(local) = candidate.local else {
            return true;
        };
        match &self.until {
            None => true,
            Some(RRuleUntil::Date(date)) => local.date() <= *date,
            Some(RRuleUntil::DateTime(until)) if until.is_utc() => {
                candidate.start <= until.local.and_utc()
            }
            Some(RRuleUntil::DateTime(until)) => local <= until.local,
        }
    }
}

/// A master component with its rule, RDATEs, EXDATEs and overrides.
#[derive(Debug, Clone)]
pub struct RecurrenceSet<'a> {
    master: &'a Component,
    zone: Zone,
    dtstart: DateTimeValue,
    start: DateTime<Utc>,
    span: Span,
    rule: Option<Rule>,
    rdates: Vec<Candidate>,
    exdates: BTreeSet<DateTime<Utc>>,
    /// Overrides keyed by the instant their RECURRENCE-ID names.
    overrides: BTreeMap<DateTime<Utc>, &'a Component>,
    /// Emitted overrides, ascending by start.
    override_occurrences: Vec<Occurrence<'a>>,
    /// Set when the master is itself an override evaluated on its own.
    standalone_id: Option<DateTime<Utc>>,
}

impl<'a> RecurrenceSet<'a> {
    /// ## Summary
    /// Builds the recurrence set of `master` with the given overrides.
    ///
    /// Returns `Ok(None)` if `master` has no DTSTART. A master that itself
    /// carries RECURRENCE-ID is treated as a single overridden instance.
    /// Overrides without RECURRENCE-ID are ignored.
    ///
    /// ## Errors
    /// Returns an error if a TZID cannot be resolved or the rule is rejected
    /// by the recurrence engine.
    #[tracing::instrument(
        skip_all,
        fields(uid = master.uid().unwrap_or_default(), component = %master.name)
    )]
    pub fn new(
        master: &'a Component,
        overrides: impl IntoIterator<Item = &'a Component>,
        resolver: &ZoneResolver,
    ) -> ServiceResult<Option<Self>> {
        let Some(dtstart) = master.date_time_value(names::DTSTART) else {
            tracing::trace!("No DTSTART, no recurrence set");
            return Ok(None);
        };
        let zone = resolver.zone_of(&dtstart)?;
        let start = zone.to_utc(dtstart.civil())?;
        let span = Span::declared(master, &dtstart, start, resolver)?
            .unwrap_or_else(|| Span::implied(&dtstart));

        let standalone_id = master
            .recurrence_id()
            .map(|rid| resolver.to_utc(&rid))
            .transpose()?;

        let mut set = Self {
            master,
            zone,
            dtstart,
            start,
            span,
            rule: None,
            rdates: Vec::new(),
            exdates: BTreeSet::new(),
            overrides: BTreeMap::new(),
            override_occurrences: Vec::new(),
            standalone_id,
        };
        if set.standalone_id.is_some() {
            return Ok(Some(set));
        }

        if let Some(rule) = master
            .get_property(names::RRULE)
            .and_then(|p| p.value.as_recur())
        {
            tracing::trace!(rrule = %rule, "Found RRULE");
            set.rule = Some(Rule {
                civil: CivilRule::new(rule, set.dtstart.civil())?,
                count: rule.count.map(|c| usize::try_from(c).unwrap_or(usize::MAX)),
                until: rule.until.clone(),
                unbounded: rule.is_unbounded(),
            });
        }

        set.rdates = set.collect_rdates(resolver)?;
        set.exdates = master
            .get_properties(names::EXDATE)
            .iter()
            .flat_map(|p| p.value.date_time_values())
            .map(|value| resolver.to_utc(&value))
            .collect::<Result<_, _>>()?;

        for component in overrides {
            let Some(rid) = component.recurrence_id() else {
                continue;
            };
            set.overrides.insert(resolver.to_utc(&rid)?, component);
        }
        set.override_occurrences = set.collect_override_occurrences(resolver)?;

        tracing::trace!(
            rdates = set.rdates.len(),
            exdates = set.exdates.len(),
            overrides = set.overrides.len(),
            "Built recurrence set"
        );
        Ok(Some(set))
    }

    /// ## Summary
    /// Builds the set `component` belongs to inside `calendar`.
    ///
    /// For a master, the overrides are its siblings of the same kind and
    /// UID that carry RECURRENCE-ID. An override stands alone.
    ///
    /// ## Errors
    /// See [`Self::new`].
    pub fn for_component(
        calendar: &'a Component,
        component: &'a Component,
        resolver: &ZoneResolver,
    ) -> ServiceResult<Option<Self>> {
        if component.recurrence_id().is_some() {
            return Self::new(component, [], resolver);
        }
        let uid = component.uid();
        let overrides = calendar.children.iter().filter(|sibling| {
            uid.is_some()
                && sibling.kind == component.kind
                && sibling.uid() == uid
                && sibling.recurrence_id().is_some()
        });
        Self::new(component, overrides, resolver)
    }

    /// ## Summary
    /// Builds the set for the master with the given UID.
    ///
    /// Returns `Ok(None)` if no recurrable master with that UID and a
    /// DTSTART exists.
    ///
    /// ## Errors
    /// See [`Self::new`].
    pub fn for_uid(
        calendar: &'a Component,
        uid: &str,
        resolver: &ZoneResolver,
    ) -> ServiceResult<Option<Self>> {
        let Some(master) = calendar.children.iter().find(|c| {
            c.kind.is_some_and(ComponentKind::is_recurrable)
                && c.uid() == Some(uid)
                && c.recurrence_id().is_none()
        }) else {
            return Ok(None);
        };
        Self::for_component(calendar, master, resolver)
    }

    #[must_use]
    pub const fn master(&self) -> &'a Component {
        self.master
    }

    /// Whether the set has more than its DTSTART instance to offer.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.rule.is_some() || !self.rdates.is_empty() || !self.overrides.is_empty()
    }

    /// Whether the rule has neither COUNT nor UNTIL.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.rule.as_ref().is_some_and(|rule| rule.unbounded)
    }

    /// Overrides keyed by the UTC instant they replace.
    #[must_use]
    pub const fn overrides(&self) -> &BTreeMap<DateTime<Utc>, &'a Component> {
        &self.overrides
    }

    fn collect_rdates(&self, resolver: &ZoneResolver) -> ServiceResult<Vec<Candidate>> {
        let mut rdates = Vec::new();
        for prop in self.master.get_properties(names::RDATE) {
            let periods = prop.value.periods();
            if periods.is_empty() {
                for value in prop.value.date_time_values() {
                    rdates.push(Candidate {
                        local: same_frame(&self.dtstart, &value).then(|| value.civil()),
                        start: resolver.to_utc(&value)?,
                        end: None,
                    });
                }
                continue;
            }
            for period in periods {
                let (start, end) = period_bounds(period, resolver)?;
                rdates.push(Candidate {
                    local: None,
                    start,
                    end: Some(end),
                });
            }
        }
        rdates.sort_by_key(|c| c.start);
        rdates.dedup_by_key(|c| c.start);
        Ok(rdates)
    }

    fn collect_override_occurrences(
        &self,
        resolver: &ZoneResolver,
    ) -> ServiceResult<Vec<Occurrence<'a>>> {
        let mut occurrences = Vec::new();
        for (&key, &component) in &self.overrides {
            if self.exdates.contains(&key) || component.is_cancelled() {
                tracing::trace!(recurrence_id = %key, "Override excluded");
                continue;
            }
            occurrences.push(self.override_occurrence(key, component, resolver)?);
        }
        occurrences.sort_by_key(|o| o.start);
        Ok(occurrences)
    }

    /// An override keeps its own start and end; without DTEND/DURATION it
    /// inherits the master's span.
    fn override_occurrence(
        &self,
        key: DateTime<Utc>,
        component: &'a Component,
        resolver: &ZoneResolver,
    ) -> ServiceResult<Occurrence<'a>> {
        let Some(dtstart) = component.date_time_value(names::DTSTART) else {
            return Ok(Occurrence {
                start: key,
                end: self.span.end(&self.zone, None, key)?,
                recurrence_id: Some(key),
                component,
                is_override: true,
                all_day: self.dtstart.is_date(),
            });
        };
        let zone = resolver.zone_of(&dtstart)?;
        let start = zone.to_utc(dtstart.civil())?;
        let span = Span::declared(component, &dtstart, start, resolver)?.unwrap_or(self.span);
        Ok(Occurrence {
            start,
            end: span.end(&zone, Some(dtstart.civil()), start)?,
            recurrence_id: Some(key),
            component,
            is_override: true,
            all_day: dtstart.is_date(),
        })
    }

    /// Rule instants (DTSTART first) merged with RDATEs, ascending.
    ///
    /// COUNT is applied before exclusions, so EXDATEd instants still
    /// consume it.
    fn candidates(&self) -> impl Iterator<Item = ServiceResult<Candidate>> + '_ {
        let first = self.dtstart.civil();
        let cancelled = self.standalone_id.is_some() && self.master.is_cancelled();

        let locals: Box<dyn Iterator<Item = NaiveDateTime> + '_> = match &self.rule {
            _ if cancelled => Box::new(std::iter::empty()),
            Some(rule) => Box::new(
                std::iter::once(first)
                    .chain(rule.civil.iter().filter(move |local| *local > first))
                    .take(rule.count.unwrap_or(usize::MAX)),
            ),
            None => Box::new(std::iter::once(first)),
        };

        let mut ruled = locals
            .map(move |local| {
                let start = if local == first {
                    self.start
                } else {
                    self.zone.to_utc(local)?
                };
                Ok(Candidate {
                    local: Some(local),
                    start,
                    end: None,
                })
            })
            .enumerate()
            .take_while(move |(index, candidate)| {
                *index == 0
                    || candidate.as_ref().map_or(true, |candidate| {
                        self.rule.as_ref().is_none_or(|rule| rule.admits(candidate))
                    })
            })
            .map(|(_, candidate)| candidate)
            .peekable();

        let mut rdates = self.rdates.iter().copied().peekable();

        std::iter::from_fn(move || {
            let order = match (ruled.peek(), rdates.peek()) {
                (None, None) => return None,
                (None, Some(_)) => Ordering::Less,
                (Some(Ok(rule)), Some(rdate)) => rdate.start.cmp(&rule.start),
                (Some(_), _) => Ordering::Greater,
            };
            match order {
                Ordering::Less => rdates.next().map(Ok),
                Ordering::Equal => {
                    rdates.next();
                    ruled.next()
                }
                Ordering::Greater => ruled.next(),
            }
        })
    }

    fn generated_occurrence(&self, candidate: &Candidate) -> ServiceResult<Occurrence<'a>> {
        let end = match candidate.end {
            Some(end) => end.max(candidate.start),
            None => self.span.end(&self.zone, candidate.local, candidate.start)?,
        };
        let recurrence_id = match self.standalone_id {
            Some(id) => Some(id),
            None => self.is_recurring().then_some(candidate.start),
        };
        Ok(Occurrence {
            start: candidate.start,
            end,
            recurrence_id,
            component: self.master,
            is_override: self.standalone_id.is_some(),
            all_day: self.dtstart.is_date(),
        })
    }

    /// ## Summary
    /// Lazily yields the occurrences intersecting `window`, ascending by
    /// start.
    ///
    /// Each call starts a fresh sequence. Generation stops once a start
    /// reaches the window end; with an open end and an unbounded rule the
    /// sequence is infinite, so callers must bound it themselves.
    ///
    /// ## Errors
    /// Items are errors if an instant cannot be anchored in its zone.
    pub fn occurrences<'s>(
        &'s self,
        window: &TimeRange,
    ) -> impl Iterator<Item = ServiceResult<Occurrence<'a>>> + 's {
        let window = *window;
        let mut generated = self
            .candidates()
            .take_while(move |candidate| {
                candidate
                    .as_ref()
                    .map_or(true, |candidate| !window.is_past(candidate.start))
            })
            .filter(move |candidate| {
                candidate.as_ref().map_or(true, |candidate| {
                    !self.exdates.contains(&candidate.start)
                        && !self.overrides.contains_key(&candidate.start)
                })
            })
            .map(move |candidate| candidate.and_then(|c| self.generated_occurrence(&c)))
            .filter(move |occurrence| {
                occurrence
                    .as_ref()
                    .map_or(true, |o| window.overlaps(o.start, o.end))
            })
            .peekable();
        let mut overridden = self
            .override_occurrences
            .iter()
            .filter(move |o| window.overlaps(o.start, o.end))
            .cloned()
            .peekable();

        std::iter::from_fn(move || {
            let from_override = match (generated.peek(), overridden.peek()) {
                (_, None) | (Some(Err(_)), _) => false,
                (None, Some(_)) => true,
                (Some(Ok(next)), Some(moved)) => moved.start < next.start,
            };
            if from_override {
                overridden.next().map(Ok)
            } else {
                generated.next()
            }
        })
    }

    /// ## Summary
    /// Whether at least one occurrence intersects `window`.
    ///
    /// Stops at the first hit, so an open-ended window is fine even for an
    /// unbounded rule.
    ///
    /// ## Errors
    /// Returns an error if an instant cannot be anchored in its zone.
    pub fn any(&self, window: &TimeRange) -> ServiceResult<bool> {
        Ok(self.occurrences(window).next().transpose()?.is_some())
    }

    /// ## Summary
    /// Materializes the occurrences intersecting `window`.
    ///
    /// At most `max_instances` occurrences are returned; the rest are
    /// dropped with a warning.
    ///
    /// ## Errors
    /// Returns `ServiceError::UnboundedExpansion` if the rule is unbounded
    /// and the window has no end, before generating anything.
    pub fn expand(
        &self,
        window: &TimeRange,
        max_instances: usize,
    ) -> ServiceResult<Vec<Occurrence<'a>>> {
        if window.end.is_none() && self.is_unbounded() {
            return Err(ServiceError::UnboundedExpansion(format!(
                "{} has no COUNT or UNTIL and the window has no end",
                self.master.uid().unwrap_or(&self.master.name)
            )));
        }
        let mut occurrences = Vec::new();
        for occurrence in self.occurrences(window) {
            if occurrences.len() == max_instances {
                tracing::warn!(
                    uid = self.master.uid().unwrap_or_default(),
                    max_instances,
                    "Expansion truncated"
                );
                break;
            }
            occurrences.push(occurrence?);
        }
        Ok(occurrences)
    }
}

/// Absolute bounds of a PERIOD value.
pub(crate) fn period_bounds(
    period: &Period,
    resolver: &ZoneResolver,
) -> ServiceResult<(DateTime<Utc>, DateTime<Utc>)> {
    let start = resolver.to_utc(&DateTimeValue::DateTime(period.start().clone()))?;
    let end = match period {
        Period::Explicit { end, .. } => resolver.to_utc(&DateTimeValue::DateTime(end.clone()))?,
        Period::Duration { duration, .. } => shift(start, duration.as_delta())?,
    };
    Ok((start, end.max(start)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_rfc::rfc::ical::core::ICalendar;
    use almanac_rfc::rfc::ical::parse::parse;
    use chrono::TimeZone as _;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn calendar(body: &str) -> ICalendar {
        parse(&format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n{body}END:VCALENDAR\r\n"
        ))
        .expect("valid calendar")
    }

    fn starts(occurrences: &[Occurrence<'_>]) -> Vec<DateTime<Utc>> {
        occurrences.iter().map(|o| o.start).collect()
    }

    const BERLIN_WEEKLY: &str = "BEGIN:VEVENT\r\n\
UID:foobar\r\n\
DTEND;TZID=Europe/Berlin:20120207T191500\r\n\
RRULE:FREQ=WEEKLY;INTERVAL=1;BYDAY=TU,TH\r\n\
SUMMARY:RecurringEvents on tuesday and thursday\r\n\
DTSTART;TZID=Europe/Berlin:20120207T181500\r\n\
END:VEVENT\r\n";

    #[test_log::test]
    fn weekly_in_berlin_anchors_to_utc() {
        let ical = calendar(BERLIN_WEEKLY);
        let resolver = ZoneResolver::default();
        let set = RecurrenceSet::for_uid(&ical.root, "foobar", &resolver)
            .expect("valid set")
            .expect("has DTSTART");

        let window = TimeRange::new(utc(2012, 2, 10, 23, 0), utc(2012, 2, 17, 22, 59));
        let occurrences = set.expand(&window, 100).expect("bounded window");
        assert_eq!(
            starts(&occurrences),
            vec![utc(2012, 2, 14, 17, 15), utc(2012, 2, 16, 17, 15)]
        );
        assert_eq!(occurrences[0].end, utc(2012, 2, 14, 18, 15));
        assert_eq!(occurrences[1].end, utc(2012, 2, 16, 18, 15));
        assert_eq!(occurrences[0].recurrence_id, Some(utc(2012, 2, 14, 17, 15)));
    }

    #[test_log::test]
    fn local_time_is_kept_across_dst() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:dst\r\n\
DTSTART;TZID=Europe/Berlin:20260324T090000\r\nDURATION:PT1H\r\n\
RRULE:FREQ=DAILY;COUNT=14\r\nEND:VEVENT\r\n",
        );
        let resolver = ZoneResolver::default();
        let set = RecurrenceSet::for_uid(&ical.root, "dst", &resolver)
            .expect("valid set")
            .expect("has DTSTART");
        let window = TimeRange::new(utc(2026, 3, 28, 0, 0), utc(2026, 3, 31, 0, 0));
        let occurrences = set.expand(&window, 100).expect("bounded");
        // Clocks go forward on 29 March: 09:00 CET is 08:00Z, 09:00 CEST is 07:00Z.
        assert_eq!(
            starts(&occurrences),
            vec![
                utc(2026, 3, 28, 8, 0),
                utc(2026, 3, 29, 7, 0),
                utc(2026, 3, 30, 7, 0)
            ]
        );
        assert_eq!(occurrences[1].end, utc(2026, 3, 29, 8, 0));
    }

    #[test_log::test]
    fn non_recurring_yields_itself() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:single\r\nDTSTART:20120105T100000Z\r\n\
DTEND:20120105T110000Z\r\nEND:VEVENT\r\n",
        );
        let resolver = ZoneResolver::default();
        let set = RecurrenceSet::for_uid(&ical.root, "single", &resolver)
            .expect("valid set")
            .expect("has DTSTART");
        assert!(!set.is_recurring());

        let occurrences = set
            .expand(&TimeRange::from(utc(2012, 1, 1, 0, 0)), 10)
            .expect("bounded");
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].start, utc(2012, 1, 5, 10, 0));
        assert_eq!(occurrences[0].end, utc(2012, 1, 5, 11, 0));
        assert_eq!(occurrences[0].recurrence_id, None);
        assert!(!occurrences[0].is_override);

        assert!(!set.any(&TimeRange::from(utc(2012, 1, 5, 11, 0))).expect("ok"));
    }

    #[test_log::test]
    fn excluded_instants_consume_count() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:counted\r\nDTSTART:20120101T100000Z\r\n\
RRULE:FREQ=DAILY;COUNT=3\r\n\
EXDATE:20120101T100000Z,20120102T100000Z\r\nEXDATE:20120103T100000Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:open\r\nDTSTART:20120101T100000Z\r\n\
RRULE:FREQ=DAILY\r\n\
EXDATE:20120101T100000Z,20120102T100000Z,20120103T100000Z\r\n\
END:VEVENT\r\n",
        );
        let resolver = ZoneResolver::default();
        let counted = RecurrenceSet::for_uid(&ical.root, "counted", &resolver)
            .expect("valid set")
            .expect("has DTSTART");
        assert!(
            counted
                .expand(&TimeRange::from(utc(2000, 1, 1, 0, 0)), 100)
                .expect("COUNT bounds the rule")
                .is_empty()
        );

        let open = RecurrenceSet::for_uid(&ical.root, "open", &resolver)
            .expect("valid set")
            .expect("has DTSTART");
        let occurrences = open
            .expand(
                &TimeRange::new(utc(2012, 1, 1, 0, 0), utc(2012, 1, 6, 0, 0)),
                100,
            )
            .expect("bounded window");
        assert_eq!(
            starts(&occurrences),
            vec![utc(2012, 1, 4, 10, 0), utc(2012, 1, 5, 10, 0)]
        );
    }

    #[test_log::test]
    fn unbounded_rule_needs_window_end() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:forever\r\nDTSTART:20120101T100000Z\r\n\
RRULE:FREQ=WEEKLY\r\nEND:VEVENT\r\n",
        );
        let resolver = ZoneResolver::default();
        let set = RecurrenceSet::for_uid(&ical.root, "forever", &resolver)
            .expect("valid set")
            .expect("has DTSTART");
        assert!(set.is_unbounded());
        assert!(matches!(
            set.expand(&TimeRange::from(utc(2012, 1, 1, 0, 0)), 100),
            Err(ServiceError::UnboundedExpansion(_))
        ));
        assert!(set.any(&TimeRange::from(utc(2030, 1, 1, 0, 0))).expect("ok"));
        assert!(!set.any(&TimeRange::until(utc(2011, 1, 1, 0, 0))).expect("ok"));
    }

    #[test_log::test]
    fn overrides_replace_and_cancel_instances() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:series\r\nDTSTART:20120101T100000Z\r\n\
DTEND:20120101T110000Z\r\nRRULE:FREQ=DAILY;COUNT=4\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:series\r\nRECURRENCE-ID:20120102T100000Z\r\n\
DTSTART:20120102T150000Z\r\nDTEND:20120102T153000Z\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:series\r\nRECURRENCE-ID:20120103T100000Z\r\n\
STATUS:CANCELLED\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:series\r\nRECURRENCE-ID:20120110T100000Z\r\n\
DTSTART:20120110T100000Z\r\nEND:VEVENT\r\n",
        );
        let resolver = ZoneResolver::default();
        let set = RecurrenceSet::for_uid(&ical.root, "series", &resolver)
            .expect("valid set")
            .expect("has DTSTART");
        assert_eq!(set.overrides().len(), 3);

        let occurrences = set
            .expand(&TimeRange::from(utc(2012, 1, 1, 0, 0)), 100)
            .expect("COUNT bounds the rule");
        assert_eq!(
            starts(&occurrences),
            vec![
                utc(2012, 1, 1, 10, 0),
                utc(2012, 1, 2, 15, 0),
                utc(2012, 1, 4, 10, 0),
                // Orphaned override, outside the rule.
                utc(2012, 1, 10, 10, 0),
            ]
        );
        let moved = &occurrences[1];
        assert!(moved.is_override);
        assert_eq!(moved.end, utc(2012, 1, 2, 15, 30));
        assert_eq!(moved.recurrence_id, Some(utc(2012, 1, 2, 10, 0)));
        // Inherits the master's one hour.
        assert_eq!(occurrences[3].end, utc(2012, 1, 10, 11, 0));
    }

    #[test_log::test]
    fn moved_override_leaves_its_slot() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:series\r\nDTSTART:20120101T100000Z\r\n\
RRULE:FREQ=DAILY;COUNT=3\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:series\r\nRECURRENCE-ID:20120102T100000Z\r\n\
DTSTART:20120120T100000Z\r\nEND:VEVENT\r\n",
        );
        let resolver = ZoneResolver::default();
        let set = RecurrenceSet::for_uid(&ical.root, "series", &resolver)
            .expect("valid set")
            .expect("has DTSTART");
        let window = TimeRange::new(utc(2012, 1, 2, 0, 0), utc(2012, 1, 3, 0, 0));
        assert!(!set.any(&window).expect("ok"));
        let window = TimeRange::new(utc(2012, 1, 20, 0, 0), utc(2012, 1, 21, 0, 0));
        assert!(set.any(&window).expect("ok"));
    }

    #[test_log::test]
    fn rdates_merge_without_duplicates() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:extra\r\nDTSTART:20120101T100000Z\r\n\
RRULE:FREQ=DAILY;COUNT=2\r\n\
RDATE:20120102T100000Z,20111231T080000Z\r\n\
RDATE;VALUE=PERIOD:20120105T120000Z/PT2H\r\nEND:VEVENT\r\n",
        );
        let resolver = ZoneResolver::default();
        let set = RecurrenceSet::for_uid(&ical.root, "extra", &resolver)
            .expect("valid set")
            .expect("has DTSTART");
        let occurrences = set
            .expand(&TimeRange::from(utc(2011, 1, 1, 0, 0)), 100)
            .expect("bounded");
        assert_eq!(
            starts(&occurrences),
            vec![
                utc(2011, 12, 31, 8, 0),
                utc(2012, 1, 1, 10, 0),
                utc(2012, 1, 2, 10, 0),
                utc(2012, 1, 5, 12, 0),
            ]
        );
        assert_eq!(occurrences[3].end, utc(2012, 1, 5, 14, 0));
    }

    #[test_log::test]
    fn all_day_series_spans_whole_days() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:days\r\nDTSTART;VALUE=DATE:20120101\r\n\
RRULE:FREQ=WEEKLY;UNTIL=20120115\r\nEND:VEVENT\r\n",
        );
        let resolver = ZoneResolver::new(chrono_tz::Europe::Berlin);
        let set = RecurrenceSet::for_uid(&ical.root, "days", &resolver)
            .expect("valid set")
            .expect("has DTSTART");
        let occurrences = set
            .expand(&TimeRange::from(utc(2011, 1, 1, 0, 0)), 100)
            .expect("UNTIL bounds the rule");
        assert_eq!(
            starts(&occurrences),
            vec![
                utc(2011, 12, 31, 23, 0),
                utc(2012, 1, 7, 23, 0),
                utc(2012, 1, 14, 23, 0)
            ]
        );
        assert!(occurrences.iter().all(|o| o.all_day));
        assert_eq!(occurrences[0].end, utc(2012, 1, 1, 23, 0));
    }

    #[test_log::test]
    fn utc_until_bounds_absolute_instants() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:until\r\nDTSTART;TZID=America/New_York:20120101T200000\r\n\
RRULE:FREQ=DAILY;UNTIL=20120103T010000Z\r\nEND:VEVENT\r\n",
        );
        let resolver = ZoneResolver::default();
        let set = RecurrenceSet::for_uid(&ical.root, "until", &resolver)
            .expect("valid set")
            .expect("has DTSTART");
        // 20:00 EST is 01:00Z the next day: only the first two instants qualify.
        let occurrences = set
            .expand(&TimeRange::from(utc(2011, 1, 1, 0, 0)), 100)
            .expect("bounded");
        assert_eq!(
            starts(&occurrences),
            vec![utc(2012, 1, 2, 1, 0), utc(2012, 1, 3, 1, 0)]
        );
    }

    #[test_log::test]
    fn max_instances_truncates() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:many\r\nDTSTART:20120101T100000Z\r\n\
RRULE:FREQ=HOURLY;COUNT=50\r\nEND:VEVENT\r\n",
        );
        let resolver = ZoneResolver::default();
        let set = RecurrenceSet::for_uid(&ical.root, "many", &resolver)
            .expect("valid set")
            .expect("has DTSTART");
        let occurrences = set
            .expand(&TimeRange::from(utc(2012, 1, 1, 0, 0)), 5)
            .expect("bounded");
        assert_eq!(occurrences.len(), 5);
    }

    #[test_log::test]
    fn unknown_tzid_is_an_error() {
        let ical = calendar(
            "BEGIN:VEVENT\r\nUID:lost\r\nDTSTART;TZID=Nowhere/Special:20120101T100000\r\n\
END:VEVENT\r\n",
        );
        let resolver = ZoneResolver::default();
        assert!(matches!(
            RecurrenceSet::for_uid(&ical.root, "lost", &resolver),
            Err(ServiceError::RfcError(almanac_rfc::error::RfcError::Timezone(_)))
        ));
    }

    #[test_log::test]
    fn occurrences_restart_on_each_call() {
        let ical = calendar(BERLIN_WEEKLY);
        let resolver = ZoneResolver::default();
        let set = RecurrenceSet::for_uid(&ical.root, "foobar", &resolver)
            .expect("valid set")
            .expect("has DTSTART");
        let window = TimeRange::new(utc(2012, 2, 1, 0, 0), utc(2012, 3, 1, 0, 0));

        let mut partial = set.occurrences(&window);
        assert!(partial.next().is_some());

        let first: Vec<_> = set
            .occurrences(&window)
            .collect::<ServiceResult<_>>()
            .expect("anchors");
        let second: Vec<_> = set
            .occurrences(&window)
            .collect::<ServiceResult<_>>()
            .expect("anchors");
        assert_eq!(first.len(), 7);
        assert_eq!(first, second);
        assert_eq!(first[0].start, utc(2012, 2, 7, 17, 15));
    }
}
