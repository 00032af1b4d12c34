//! Timezone resolution and UTC conversion for iCalendar date-times.
//!
//! Embedded `VTIMEZONE` definitions win over IANA names. Windows zone names
//! and IANA aliases are canonicalised with ICU4X before `chrono-tz` lookup.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, LazyLock, RwLock};

use chrono::{DateTime, LocalResult, NaiveDateTime, Offset as _, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use icu::time::zone::WindowsParser;
use icu::time::zone::iana::IanaParserExtended;
use sha2::{Digest, Sha256};

use super::vtimezone::VTimezone;
use crate::rfc::ical::build::serialize_component;
use crate::rfc::ical::core::{Component, DateTimeForm, DateTimeValue, ICalendar};

/// Error during timezone resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimezoneError {
    /// Neither an embedded `VTIMEZONE` nor an IANA zone matches the TZID.
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Invalid VTIMEZONE {tzid}: {reason}")]
    InvalidVTimezone { tzid: String, reason: String },

    /// The reading cannot be anchored (outside chrono's range).
    #[error("Date-time out of range: {0}")]
    OutOfRange(String),
}

/// Raw TZID → normalised IANA name.
static NORMALIZED_TZIDS: LazyLock<RwLock<HashMap<String, String>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// SHA-256 of a serialized `VTIMEZONE` → parsed definition.
static VTIMEZONES: LazyLock<RwLock<HashMap<String, Arc<VTimezone>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// ## Summary
/// Normalises a TZID to a canonical IANA name.
///
/// Strips `/mozilla.org/` and `/softwarestudio.org/` prefixes, maps Windows
/// zone names, and canonicalises IANA aliases. Unknown names come back
/// without the prefix.
///
/// ## Side Effects
/// Memoises the result in a process-wide cache.
#[must_use]
pub fn normalize_tzid(tzid: &str) -> String {
    if let Ok(cache) = NORMALIZED_TZIDS.read()
        && let Some(hit) = cache.get(tzid)
    {
        return hit.clone();
    }

    let normalized = normalize_uncached(tzid);
    if let Ok(mut cache) = NORMALIZED_TZIDS.write() {
        cache.insert(tzid.to_string(), normalized.clone());
    }
    normalized
}

fn normalize_uncached(tzid: &str) -> String {
    let stripped = tzid
        .strip_prefix("/mozilla.org/")
        .or_else(|| tzid.strip_prefix("/softwarestudio.org/"))
        .unwrap_or(tzid);

    let iana_parser = IanaParserExtended::new();

    if let Some(tz) = WindowsParser::new().parse(stripped, None)
        && let Some(entry) = iana_parser.iter().find(|entry| entry.time_zone == tz)
    {
        return entry.canonical.to_string();
    }

    let parsed = iana_parser.parse(stripped);
    if parsed.time_zone != icu::time::TimeZone::UNKNOWN {
        return parsed.canonical.to_string();
    }

    stripped.to_string()
}

/// Parses a `VTIMEZONE` component, reusing an identical earlier definition.
fn cached_vtimezone(component: &Component) -> Result<Arc<VTimezone>, TimezoneError> {
    let key = hex::encode(Sha256::digest(serialize_component(component).as_bytes()));

    if let Ok(cache) = VTIMEZONES.read()
        && let Some(hit) = cache.get(&key)
    {
        return Ok(Arc::clone(hit));
    }

    let parsed = Arc::new(VTimezone::parse(component)?);
    if let Ok(mut cache) = VTIMEZONES.write() {
        cache.entry(key).or_insert_with(|| Arc::clone(&parsed));
    }
    Ok(parsed)
}

/// A resolved zone that wall-clock readings are anchored in.
#[derive(Debug, Clone)]
pub enum Zone {
    Utc,
    Iana(Tz),
    Defined(Arc<VTimezone>),
}

impl Zone {
    /// ## Summary
    /// Anchors a wall-clock reading to an absolute instant.
    ///
    /// A repeated reading (fold) takes the earlier instant; a skipped
    /// reading (gap) is read with the offset in force before the gap.
    ///
    /// ## Errors
    /// Returns `TimezoneError::OutOfRange` if the reading cannot be anchored.
    pub fn to_utc(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, TimezoneError> {
        match self {
            Self::Utc => Ok(local.and_utc()),
            Self::Defined(vtimezone) => Ok(vtimezone.to_utc(local)),
            Self::Iana(tz) => match tz.from_local_datetime(&local) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                    Ok(dt.with_timezone(&Utc))
                }
                LocalResult::None => {
                    let probe = local
                        .checked_sub_signed(TimeDelta::days(1))
                        .ok_or_else(|| TimezoneError::OutOfRange(local.to_string()))?;
                    let offset = tz.offset_from_utc_datetime(&probe).fix();
                    local
                        .checked_sub_signed(TimeDelta::seconds(i64::from(
                            offset.local_minus_utc(),
                        )))
                        .map(|utc| utc.and_utc())
                        .ok_or_else(|| TimezoneError::OutOfRange(local.to_string()))
                }
            },
        }
    }
}

/// Resolver for timezone identifiers within one calendar object.
///
/// Holds the object's embedded `VTIMEZONE` definitions and the zone used for
/// floating times and all-day dates.
#[derive(Debug, Clone)]
pub struct ZoneResolver {
    vtimezones: HashMap<String, Arc<VTimezone>>,
    default_zone: Tz,
}

impl ZoneResolver {
    #[must_use]
    pub fn new(default_zone: Tz) -> Self {
        Self {
            vtimezones: HashMap::new(),
            default_zone,
        }
    }

    /// ## Summary
    /// Builds a resolver with every `VTIMEZONE` of `ical` registered.
    ///
    /// ## Errors
    /// Returns an error if a `VTIMEZONE` component is invalid.
    pub fn for_calendar(ical: &ICalendar, default_zone: Tz) -> Result<Self, TimezoneError> {
        let mut resolver = Self::new(default_zone);
        for component in ical.timezones() {
            let vtimezone = cached_vtimezone(component)?;
            resolver.register_vtimezone(vtimezone);
        }
        Ok(resolver)
    }

    pub fn register_vtimezone(&mut self, vtimezone: Arc<VTimezone>) {
        self.vtimezones.insert(vtimezone.tzid.clone(), vtimezone);
    }

    #[must_use]
    pub fn has_vtimezone(&self, tzid: &str) -> bool {
        self.vtimezones.contains_key(tzid)
    }

    #[must_use]
    pub const fn default_zone(&self) -> Tz {
        self.default_zone
    }

    /// ## Summary
    /// Resolves a TZID, preferring an embedded definition.
    ///
    /// ## Errors
    /// Returns `TimezoneError::UnknownTimezone` if nothing matches.
    pub fn resolve(&self, tzid: &str) -> Result<Zone, TimezoneError> {
        if let Some(vtimezone) = self.vtimezones.get(tzid) {
            return Ok(Zone::Defined(Arc::clone(vtimezone)));
        }
        let normalized = normalize_tzid(tzid);
        Tz::from_str(&normalized)
            .map(Zone::Iana)
            .map_err(|_e| TimezoneError::UnknownTimezone(tzid.to_string()))
    }

    /// ## Summary
    /// Zone a temporal value is read in.
    ///
    /// DATE values and floating times use the default zone.
    ///
    /// ## Errors
    /// Returns an error if the value's TZID cannot be resolved.
    pub fn zone_of(&self, value: &DateTimeValue) -> Result<Zone, TimezoneError> {
        match value {
            DateTimeValue::Date(_) => Ok(Zone::Iana(self.default_zone)),
            DateTimeValue::DateTime(dt) => match &dt.form {
                DateTimeForm::Utc => Ok(Zone::Utc),
                DateTimeForm::Floating => Ok(Zone::Iana(self.default_zone)),
                DateTimeForm::Zoned { tzid } => self.resolve(tzid),
            },
        }
    }

    /// ## Summary
    /// Converts a DATE or DATE-TIME to an absolute instant.
    ///
    /// A DATE converts to the start of its day.
    ///
    /// ## Errors
    /// Returns an error if the TZID cannot be resolved or the reading is out
    /// of range.
    pub fn to_utc(&self, value: &DateTimeValue) -> Result<DateTime<Utc>, TimezoneError> {
        self.zone_of(value)?.to_utc(value.civil())
    }
}

impl Default for ZoneResolver {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rfc::ical::core::DateTime as IcalDateTime;
    use crate::rfc::ical::parse::parse;
    use chrono::NaiveDate;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid datetime")
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        local(y, m, d, h, min).and_utc()
    }

    #[test_log::test]
    fn normalize_windows_and_prefixed_names() {
        assert_eq!(normalize_tzid("W. Europe Standard Time"), "Europe/Berlin");
        assert_eq!(normalize_tzid("Eastern Standard Time"), "America/New_York");
        assert_eq!(
            normalize_tzid("/mozilla.org/America/New_York"),
            "America/New_York"
        );
        assert_eq!(normalize_tzid("US/Eastern"), "America/New_York");
        assert_eq!(normalize_tzid("Not/AZone"), "Not/AZone");
    }

    #[test_log::test]
    fn berlin_winter_reading() {
        let resolver = ZoneResolver::default();
        let value = DateTimeValue::DateTime(IcalDateTime::zoned(
            local(2012, 2, 14, 18, 15),
            "Europe/Berlin",
        ));
        assert_eq!(resolver.to_utc(&value), Ok(utc(2012, 2, 14, 17, 15)));
    }

    #[test_log::test]
    fn iana_fold_and_gap() {
        let zone = ZoneResolver::default()
            .resolve("Europe/Berlin")
            .expect("known zone");
        // 2012-10-28 02:30 happens twice.
        assert_eq!(zone.to_utc(local(2012, 10, 28, 2, 30)), Ok(utc(2012, 10, 28, 0, 30)));
        // 2012-03-25 02:30 is skipped; read with CET (+01:00).
        assert_eq!(zone.to_utc(local(2012, 3, 25, 2, 30)), Ok(utc(2012, 3, 25, 1, 30)));
    }

    #[test_log::test]
    fn floating_and_dates_use_default_zone() {
        let resolver = ZoneResolver::new(Tz::America__New_York);
        let date = DateTimeValue::Date(NaiveDate::from_ymd_opt(2026, 1, 15).expect("valid"));
        assert_eq!(resolver.to_utc(&date), Ok(utc(2026, 1, 15, 5, 0)));
        let floating = DateTimeValue::DateTime(IcalDateTime::floating(local(2026, 7, 1, 9, 0)));
        assert_eq!(resolver.to_utc(&floating), Ok(utc(2026, 7, 1, 13, 0)));
        let fixed = DateTimeValue::DateTime(IcalDateTime::utc(local(2026, 7, 1, 9, 0)));
        assert_eq!(resolver.to_utc(&fixed), Ok(utc(2026, 7, 1, 9, 0)));
    }

    #[test_log::test]
    fn unknown_tzid_is_an_error() {
        let value =
            DateTimeValue::DateTime(IcalDateTime::zoned(local(2026, 1, 1, 0, 0), "Mars/Olympus"));
        assert_eq!(
            ZoneResolver::default().to_utc(&value),
            Err(TimezoneError::UnknownTimezone("Mars/Olympus".to_string()))
        );
    }

    #[test_log::test]
    fn embedded_definition_wins_and_is_cached() {
        let text = "BEGIN:VCALENDAR\r\n\
BEGIN:VTIMEZONE\r\n\
TZID:Europe/Berlin\r\n\
BEGIN:STANDARD\r\n\
DTSTART:19700101T000000\r\n\
TZOFFSETFROM:+0200\r\n\
TZOFFSETTO:+0200\r\n\
END:STANDARD\r\n\
END:VTIMEZONE\r\n\
END:VCALENDAR\r\n";
        let ical = parse(text).expect("valid calendar");
        let resolver = ZoneResolver::for_calendar(&ical, Tz::UTC).expect("valid VTIMEZONE");
        assert!(resolver.has_vtimezone("Europe/Berlin"));

        let value = DateTimeValue::DateTime(IcalDateTime::zoned(
            local(2012, 2, 14, 18, 15),
            "Europe/Berlin",
        ));
        assert_eq!(resolver.to_utc(&value), Ok(utc(2012, 2, 14, 16, 15)));

        let again = ZoneResolver::for_calendar(&ical, Tz::UTC).expect("valid VTIMEZONE");
        let (Ok(Zone::Defined(a)), Ok(Zone::Defined(b))) =
            (resolver.resolve("Europe/Berlin"), again.resolve("Europe/Berlin"))
        else {
            panic!("expected embedded definitions");
        };
        assert!(Arc::ptr_eq(&a, &b));
    }
}
