//! Embedded `VTIMEZONE` definitions (RFC 5545 §3.6.5).

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

use super::civil::CivilRule;
use super::timezone::TimezoneError;
use crate::rfc::ical::core::{Component, ComponentKind, RRuleUntil, UtcOffset, names};

/// Upper bound on onsets walked per observance when locating an offset.
const MAX_ONSETS: usize = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservanceKind {
    Standard,
    Daylight,
}

/// One `STANDARD` or `DAYLIGHT` block.
///
/// Onsets are wall-clock readings in the offset that was in force before
/// the observance began (`TZOFFSETFROM`).
#[derive(Debug, Clone)]
pub struct Observance {
    pub kind: ObservanceKind,
    pub dtstart: NaiveDateTime,
    pub offset_from: UtcOffset,
    pub offset_to: UtcOffset,
    rule: Option<(CivilRule, Option<RRuleUntil>)>,
    rdates: Vec<NaiveDateTime>,
}

impl Observance {
    fn parse(tzid: &str, component: &Component) -> Result<Self, TimezoneError> {
        let invalid = |reason: &str| TimezoneError::InvalidVTimezone {
            tzid: tzid.to_string(),
            reason: reason.to_string(),
        };

        let kind = match component.kind {
            Some(ComponentKind::Daylight) => ObservanceKind::Daylight,
            _ => ObservanceKind::Standard,
        };
        let dtstart = component
            .date_time_value(names::DTSTART)
            .ok_or_else(|| invalid("observance without DTSTART"))?
            .civil();
        let offset = |name: &str| {
            component
                .get_property(name)
                .and_then(|p| p.value.as_utc_offset())
                .ok_or_else(|| invalid(&format!("observance without {name}")))
        };
        let offset_from = offset(names::TZOFFSETFROM)?;
        let offset_to = offset(names::TZOFFSETTO)?;

        let rule = match component
            .get_property(names::RRULE)
            .and_then(|p| p.value.as_recur())
        {
            Some(rule) => Some((
                CivilRule::new(rule, dtstart).map_err(|e| invalid(&e.to_string()))?,
                rule.until.clone(),
            )),
            None => None,
        };
        let rdates = component
            .get_properties(names::RDATE)
            .iter()
            .flat_map(|p| p.value.date_time_values())
            .map(|v| v.civil())
            .collect();

        Ok(Self {
            kind,
            dtstart,
            offset_from,
            offset_to,
            rule,
            rdates,
        })
    }

    fn onset_utc(&self, local: NaiveDateTime) -> NaiveDateTime {
        local - self.offset_from.as_delta()
    }

    fn before_until(&self, local: NaiveDateTime, until: Option<&RRuleUntil>) -> bool {
        match until {
            None => true,
            Some(RRuleUntil::Date(date)) => local.date() <= *date,
            Some(RRuleUntil::DateTime(dt)) if dt.is_utc() => self.onset_utc(local) <= dt.local,
            Some(RRuleUntil::DateTime(dt)) => local <= dt.local,
        }
    }

    /// Latest onset at or before `at` (UTC reading), if any.
    fn last_onset_before(&self, at: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut latest = (self.onset_utc(self.dtstart) <= at).then(|| self.onset_utc(self.dtstart));

        if let Some((rule, until)) = &self.rule {
            let ruled = rule
                .iter()
                .take(MAX_ONSETS)
                .take_while(|local| self.before_until(*local, until.as_ref()))
                .map(|local| self.onset_utc(local))
                .take_while(|onset| *onset <= at)
                .last();
            latest = latest.max(ruled);
        }

        let dated = self
            .rdates
            .iter()
            .map(|local| self.onset_utc(*local))
            .filter(|onset| *onset <= at)
            .max();
        latest.max(dated)
    }
}

/// A parsed `VTIMEZONE`.
#[derive(Debug, Clone)]
pub struct VTimezone {
    pub tzid: String,
    pub observances: Vec<Observance>,
}

impl VTimezone {
    /// ## Summary
    /// Reads the observances of a `VTIMEZONE` component.
    ///
    /// ## Errors
    /// Returns `TimezoneError::InvalidVTimezone` if `TZID` is missing, no
    /// observance is present, or an observance lacks a required property.
    pub fn parse(component: &Component) -> Result<Self, TimezoneError> {
        let tzid = component
            .get_property(names::TZID)
            .and_then(|p| p.as_text())
            .ok_or_else(|| TimezoneError::InvalidVTimezone {
                tzid: String::new(),
                reason: "VTIMEZONE without TZID".to_string(),
            })?
            .to_string();

        let observances = component
            .children
            .iter()
            .filter(|c| {
                matches!(
                    c.kind,
                    Some(ComponentKind::Standard | ComponentKind::Daylight)
                )
            })
            .map(|c| Observance::parse(&tzid, c))
            .collect::<Result<Vec<_>, _>>()?;

        if observances.is_empty() {
            return Err(TimezoneError::InvalidVTimezone {
                tzid,
                reason: "no STANDARD or DAYLIGHT observance".to_string(),
            });
        }

        Ok(Self { tzid, observances })
    }

    /// Offset in force at the UTC instant `at`.
    ///
    /// Before the first onset the earliest observance's `TZOFFSETFROM`
    /// applies.
    #[must_use]
    pub fn offset_at(&self, at: DateTime<Utc>) -> UtcOffset {
        let at = at.naive_utc();
        self.observances
            .iter()
            .filter_map(|o| o.last_onset_before(at).map(|onset| (onset, o.offset_to)))
            .max_by_key(|(onset, _)| *onset)
            .map_or_else(
                || {
                    self.observances
                        .iter()
                        .min_by_key(|o| o.onset_utc(o.dtstart))
                        .map_or(UtcOffset::UTC, |o| o.offset_from)
                },
                |(_, offset)| offset,
            )
    }

    /// ## Summary
    /// Anchors a wall-clock reading in this zone.
    ///
    /// A repeated reading takes the earlier instant. A skipped reading is
    /// read with the offset in force before the gap.
    #[must_use]
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let mut offsets: Vec<UtcOffset> = self
            .observances
            .iter()
            .flat_map(|o| [o.offset_from, o.offset_to])
            .collect();
        offsets.sort_by_key(|o| std::cmp::Reverse(o.as_seconds()));
        offsets.dedup();

        // Largest offset first, so the first consistent reading is the earliest instant.
        for offset in offsets {
            let candidate = (local - offset.as_delta()).and_utc();
            if self.offset_at(candidate) == offset {
                return candidate;
            }
        }

        let before_gap = self.offset_at((local - TimeDelta::days(1)).and_utc());
        (local - before_gap.as_delta()).and_utc()
    }
}
