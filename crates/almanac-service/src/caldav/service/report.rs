//! CalDAV REPORT service layer.
//!
//! Business logic for calendar-query and calendar-multiget reports over a
//! [`CalendarStore`].

use std::collections::HashMap;

use almanac_core::config::EngineConfig;
use almanac_rfc::rfc::caldav::{CalendarFilter, TimeRange};
use almanac_rfc::rfc::ical::build::serialize;
use almanac_rfc::rfc::ical::core::ICalendar;
use almanac_rfc::rfc::ical::expand::ZoneResolver;
use almanac_rfc::rfc::ical::parse::parse;
use chrono_tz::Tz;
use futures::future::try_join_all;
use serde::Serialize;
use tracing_futures::Instrument;

use crate::caldav::expand::{expand_calendar, limit_recurrence_set};
use crate::caldav::filter::matches;
use crate::error::{ServiceError, ServiceResult};
use crate::storage::CalendarStore;

/// Per-query engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Zone for floating date-times and all-day dates.
    pub default_timezone: Tz,
    pub max_instances: usize,
    /// Skip unparseable objects with a warning instead of failing the query.
    pub skip_corrupt_objects: bool,
    /// URIs fetched per storage round-trip.
    pub batch_size: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_timezone: Tz::UTC,
            max_instances: 10_000,
            skip_corrupt_objects: true,
            batch_size: 128,
        }
    }
}

impl EngineOptions {
    /// ## Summary
    /// Derives engine options from loaded settings.
    ///
    /// ## Errors
    /// Returns an error if `default_timezone` is not a known IANA zone.
    pub fn from_settings(config: &EngineConfig) -> ServiceResult<Self> {
        Ok(Self {
            default_timezone: config.default_tz()?,
            max_instances: usize::try_from(config.max_instances).unwrap_or(usize::MAX),
            skip_corrupt_objects: config.skip_corrupt_objects,
            batch_size: config.batch_size.max(1),
        })
    }
}

/// One calendar object as returned to the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarData {
    pub uri: String,
    pub calendar_data: String,
}

/// Result of a calendar-multiget report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultigetResult {
    pub found: Vec<CalendarData>,
    /// Requested URIs with no stored object, in request order.
    pub not_found: Vec<String>,
}

/// A stored object that satisfied the filter.
struct MatchedObject {
    uri: String,
    ical: ICalendar,
    resolver: ZoneResolver,
}

/// ## Summary
/// Executes a calendar-query report.
///
/// Returns the URIs of objects matching `filter`, in the backend's listing
/// order.
///
/// ## Side Effects
/// Reads every object of the calendar from the store.
///
/// ## Errors
/// Returns storage errors, and object errors when `skip_corrupt_objects` is
/// off.
#[tracing::instrument(skip(store, filter, options))]
pub async fn calendar_query<S: CalendarStore>(
    store: &S,
    calendar_id: &str,
    filter: &CalendarFilter,
    options: &EngineOptions,
) -> ServiceResult<Vec<String>> {
    let matched = matching_objects(store, calendar_id, filter, options).await?;
    tracing::debug!(matched = matched.len(), "Calendar query complete");
    Ok(matched.into_iter().map(|object| object.uri).collect())
}

/// ## Summary
/// Executes a calendar-query report with `expand`.
///
/// Each matching object is returned with its occurrences in `window`
/// materialized as standalone UTC components.
///
/// ## Side Effects
/// Reads every object of the calendar from the store.
///
/// ## Errors
/// Returns `RfcError::InvalidFilter` if `window` has no bound or is empty,
/// and `ServiceError::UnboundedExpansion` if a matching object has an
/// unbounded rule and `window` has no end; otherwise as
/// [`calendar_query`].
#[tracing::instrument(skip(store, filter, options))]
pub async fn calendar_expand<S: CalendarStore>(
    store: &S,
    calendar_id: &str,
    filter: &CalendarFilter,
    window: &TimeRange,
    options: &EngineOptions,
) -> ServiceResult<Vec<CalendarData>> {
    window.validate()?;
    let matched = matching_objects(store, calendar_id, filter, options).await?;
    let mut results = Vec::with_capacity(matched.len());
    for object in matched {
        match expand_calendar(&object.ical, window, &object.resolver, options.max_instances) {
            Ok(expanded) => results.push(CalendarData {
                calendar_data: serialize(&expanded),
                uri: object.uri,
            }),
            Err(e) => skip_or_fail(e, calendar_id, &object.uri, options)?,
        }
    }
    Ok(results)
}

/// ## Summary
/// Executes a calendar-query report with `limit-recurrence-set`.
///
/// Matching objects keep their masters and only the overrides intersecting
/// `window`.
///
/// ## Side Effects
/// Reads every object of the calendar from the store.
///
/// ## Errors
/// Returns `RfcError::InvalidFilter` if `window` has no bound or is empty;
/// otherwise as [`calendar_query`].
#[tracing::instrument(skip(store, filter, options))]
pub async fn calendar_limit_recurrence_set<S: CalendarStore>(
    store: &S,
    calendar_id: &str,
    filter: &CalendarFilter,
    window: &TimeRange,
    options: &EngineOptions,
) -> ServiceResult<Vec<CalendarData>> {
    window.validate()?;
    let matched = matching_objects(store, calendar_id, filter, options).await?;
    let mut results = Vec::with_capacity(matched.len());
    for object in matched {
        match limit_recurrence_set(&object.ical, window, &object.resolver) {
            Ok(limited) => results.push(CalendarData {
                calendar_data: serialize(&limited),
                uri: object.uri,
            }),
            Err(e) => skip_or_fail(e, calendar_id, &object.uri, options)?,
        }
    }
    Ok(results)
}

/// ## Summary
/// Executes a calendar-multiget report.
///
/// Stored text is returned as-is, in request order; duplicate URIs are
/// answered once. An object whose bytes cannot be decoded is skipped under
/// `skip_corrupt_objects` and reported in `not_found`.
///
/// ## Side Effects
/// Fetches the requested objects in batches of `batch_size`.
///
/// ## Errors
/// Returns storage errors, and undecodable objects when
/// `skip_corrupt_objects` is off.
#[tracing::instrument(skip(store, uris, options), fields(requested = uris.len()))]
pub async fn calendar_multiget<S: CalendarStore>(
    store: &S,
    calendar_id: &str,
    uris: &[String],
    options: &EngineOptions,
) -> ServiceResult<MultigetResult> {
    let mut requested = uris.to_vec();
    let mut seen = std::collections::HashSet::new();
    requested.retain(|uri| seen.insert(uri.clone()));

    let mut objects = fetch_objects(store, calendar_id, &requested, options).await?;
    let mut result = MultigetResult::default();
    for uri in requested {
        match objects.remove(&uri) {
            Some(calendar_data) => result.found.push(CalendarData { uri, calendar_data }),
            None => result.not_found.push(uri),
        }
    }
    tracing::debug!(
        found = result.found.len(),
        not_found = result.not_found.len(),
        "Calendar multiget complete"
    );
    Ok(result)
}

/// Lists, fetches, parses and filters every object of a calendar.
async fn matching_objects<S: CalendarStore>(
    store: &S,
    calendar_id: &str,
    filter: &CalendarFilter,
    options: &EngineOptions,
) -> ServiceResult<Vec<MatchedObject>> {
    let uris = store.list_object_uris(calendar_id).await?;
    let mut objects = fetch_objects(store, calendar_id, &uris, options).await?;

    let mut matched = Vec::new();
    for uri in uris {
        let Some(raw) = objects.remove(&uri) else {
            tracing::debug!(uri, "Listed object missing from fetch");
            continue;
        };
        match evaluate(&raw, filter, options.default_timezone) {
            Ok(Some((ical, resolver))) => matched.push(MatchedObject {
                uri,
                ical,
                resolver,
            }),
            Ok(None) => tracing::trace!(uri, "Filter did not match"),
            Err(e) => skip_or_fail(e, calendar_id, &uri, options)?,
        }
    }
    Ok(matched)
}

/// Parses one object and applies the filter.
fn evaluate(
    raw: &str,
    filter: &CalendarFilter,
    default_timezone: Tz,
) -> ServiceResult<Option<(ICalendar, ZoneResolver)>> {
    let ical = parse(raw)?;
    let resolver = ZoneResolver::for_calendar(&ical, default_timezone)?;
    if matches(&ical.root, filter, &resolver)? {
        Ok(Some((ical, resolver)))
    } else {
        Ok(None)
    }
}

/// ## Summary
/// Fetches `uris` in concurrent batches of at most `batch_size`.
///
/// A batch that fails on an unreadable object is re-read one URI at a time
/// so the corrupt-object policy applies to that object alone.
async fn fetch_objects<S: CalendarStore>(
    store: &S,
    calendar_id: &str,
    uris: &[String],
    options: &EngineOptions,
) -> ServiceResult<HashMap<String, String>> {
    let batches = uris
        .chunks(options.batch_size.max(1))
        .enumerate()
        .map(|(index, chunk)| {
            async move {
                match store.get_objects(calendar_id, chunk).await {
                    Err(e) if e.is_object_scoped() => {
                        tracing::debug!(
                            error = %e,
                            "Batch hit an unreadable object, fetching one by one"
                        );
                        fetch_each(store, calendar_id, chunk, options).await
                    }
                    result => result,
                }
            }
            .instrument(tracing::debug_span!("fetch_batch", index, size = chunk.len()))
        });

    let mut objects = HashMap::with_capacity(uris.len());
    for batch in try_join_all(batches).await? {
        objects.extend(batch);
    }
    Ok(objects)
}

/// Fetches `uris` one at a time, applying the corrupt-object policy per URI.
async fn fetch_each<S: CalendarStore>(
    store: &S,
    calendar_id: &str,
    uris: &[String],
    options: &EngineOptions,
) -> ServiceResult<HashMap<String, String>> {
    let mut objects = HashMap::with_capacity(uris.len());
    for uri in uris {
        match store.get_object(calendar_id, uri).await {
            Ok(Some(data)) => {
                objects.insert(uri.clone(), data);
            }
            Ok(None) => {}
            Err(e) => skip_or_fail(e, calendar_id, uri, options)?,
        }
    }
    Ok(objects)
}

/// Applies the corrupt-object policy to an error raised for one object.
fn skip_or_fail(
    err: ServiceError,
    calendar_id: &str,
    uri: &str,
    options: &EngineOptions,
) -> ServiceResult<()> {
    if options.skip_corrupt_objects && err.is_object_scoped() {
        tracing::warn!(calendar_id, uri, error = %err, "Skipping corrupt calendar object");
        return Ok(());
    }
    Err(err.for_object(calendar_id, uri))
}
