//! Filter tree types and construction-time checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::text_match::TextMatch;
use crate::error::{RfcError, RfcResult};

/// Half-open time window `[start, end)`; at least one bound is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Window open towards the future.
    #[must_use]
    pub const fn from(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Window open towards the past.
    #[must_use]
    pub const fn until(end: DateTime<Utc>) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    /// ## Summary
    /// Checks that the window has a bound and is not empty.
    ///
    /// ## Errors
    /// Returns `RfcError::InvalidFilter` if both bounds are absent or `end`
    /// is not after `start`.
    pub fn validate(&self) -> RfcResult<()> {
        match (self.start, self.end) {
            (None, None) => Err(RfcError::InvalidFilter(
                "time-range needs a start or an end".to_string(),
            )),
            (Some(start), Some(end)) if end <= start => Err(RfcError::InvalidFilter(format!(
                "time-range end {end} is not after start {start}"
            ))),
            _ => Ok(()),
        }
    }

    /// Whether the instant `at` lies in `[start, end)`.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| start <= at) && self.end.is_none_or(|end| at < end)
    }

    /// ## Summary
    /// Whether `[start, end)` intersects the window.
    ///
    /// A zero-length interval matches only if its instant is contained.
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if end <= start {
            return self.contains(start);
        }
        self.start.is_none_or(|window_start| end > window_start)
            && self.end.is_none_or(|window_end| start < window_end)
    }

    /// Whether `at` is at or beyond the window end.
    #[must_use]
    pub fn is_past(&self, at: DateTime<Utc>) -> bool {
        self.end.is_some_and(|end| at >= end)
    }
}

/// Parameter filter (RFC 4791 §9.7.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParamFilter {
    pub name: String,
    #[serde(default)]
    pub is_not_defined: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_match: Option<TextMatch>,
}

impl ParamFilter {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_not_defined: false,
            text_match: None,
        }
    }

    #[must_use]
    pub const fn not_defined(mut self) -> Self {
        self.is_not_defined = true;
        self
    }

    #[must_use]
    pub fn with_text_match(mut self, text_match: TextMatch) -> Self {
        self.text_match = Some(text_match);
        self
    }

    fn validate(&self) -> RfcResult<()> {
        if self.is_not_defined && self.text_match.is_some() {
            return Err(RfcError::InvalidFilter(format!(
                "param-filter {} combines is-not-defined with text-match",
                self.name
            )));
        }
        if let Some(text_match) = &self.text_match {
            text_match.effective_collation()?;
        }
        Ok(())
    }
}

/// Property filter (RFC 4791 §9.7.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PropFilter {
    pub name: String,
    #[serde(default)]
    pub is_not_defined: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_match: Option<TextMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub param_filters: Vec<ParamFilter>,
}

impl PropFilter {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_not_defined: false,
            text_match: None,
            time_range: None,
            param_filters: Vec::new(),
        }
    }

    #[must_use]
    pub const fn not_defined(mut self) -> Self {
        self.is_not_defined = true;
        self
    }

    #[must_use]
    pub fn with_text_match(mut self, text_match: TextMatch) -> Self {
        self.text_match = Some(text_match);
        self
    }

    #[must_use]
    pub const fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    #[must_use]
    pub fn with_param_filter(mut self, filter: ParamFilter) -> Self {
        self.param_filters.push(filter);
        self
    }

    fn validate(&self) -> RfcResult<()> {
        if self.is_not_defined
            && (self.text_match.is_some()
                || self.time_range.is_some()
                || !self.param_filters.is_empty())
        {
            return Err(RfcError::InvalidFilter(format!(
                "prop-filter {} combines is-not-defined with other tests",
                self.name
            )));
        }
        if let Some(range) = &self.time_range {
            range.validate()?;
        }
        if let Some(text_match) = &self.text_match {
            text_match.effective_collation()?;
        }
        self.param_filters.iter().try_for_each(ParamFilter::validate)
    }
}

/// Component filter (RFC 4791 §9.7.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CompFilter {
    pub name: String,
    #[serde(default)]
    pub is_not_defined: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prop_filters: Vec<PropFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comp_filters: Vec<CompFilter>,
}

impl CompFilter {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_not_defined: false,
            time_range: None,
            prop_filters: Vec::new(),
            comp_filters: Vec::new(),
        }
    }

    #[must_use]
    pub const fn not_defined(mut self) -> Self {
        self.is_not_defined = true;
        self
    }

    #[must_use]
    pub const fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    #[must_use]
    pub fn with_prop_filter(mut self, filter: PropFilter) -> Self {
        self.prop_filters.push(filter);
        self
    }

    #[must_use]
    pub fn with_comp_filter(mut self, filter: Self) -> Self {
        self.comp_filters.push(filter);
        self
    }

    fn validate(&self) -> RfcResult<()> {
        if self.is_not_defined
            && (self.time_range.is_some()
                || !self.prop_filters.is_empty()
                || !self.comp_filters.is_empty())
        {
            return Err(RfcError::InvalidFilter(format!(
                "comp-filter {} combines is-not-defined with other tests",
                self.name
            )));
        }
        if let Some(range) = &self.time_range {
            range.validate()?;
        }
        self.prop_filters.iter().try_for_each(PropFilter::validate)?;
        self.comp_filters.iter().try_for_each(Self::validate)
    }

    /// Whether any node of this subtree carries a time-range.
    #[must_use]
    pub fn has_time_range(&self) -> bool {
        self.time_range.is_some()
            || self.prop_filters.iter().any(|p| p.time_range.is_some())
            || self.comp_filters.iter().any(Self::has_time_range)
    }
}

/// A checked calendar-query filter rooted at `VCALENDAR`.
///
/// Only constructible through [`CalendarFilter::new`] (or deserialization,
/// which runs the same checks), so holders may assume a well-formed tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CompFilter", into = "CompFilter")]
pub struct CalendarFilter {
    root: CompFilter,
}

impl CalendarFilter {
    /// ## Summary
    /// Checks a filter tree and wraps it.
    ///
    /// ## Errors
    /// Returns `RfcError::InvalidFilter` if the root is not `VCALENDAR`, the
    /// root carries a time-range or is-not-defined, a node combines
    /// is-not-defined with another test, a time-range is empty or inverted,
    /// or a text-match names an unsupported collation.
    pub fn new(root: CompFilter) -> RfcResult<Self> {
        if !root.name.eq_ignore_ascii_case("VCALENDAR") {
            return Err(RfcError::InvalidFilter(format!(
                "filter root must be VCALENDAR, got {}",
                root.name
            )));
        }
        if root.time_range.is_some() {
            return Err(RfcError::InvalidFilter(
                "time-range is not supported on VCALENDAR".to_string(),
            ));
        }
        if root.is_not_defined {
            return Err(RfcError::InvalidFilter(
                "is-not-defined is not supported on VCALENDAR".to_string(),
            ));
        }
        root.validate()?;
        Ok(Self { root })
    }

    /// Filter matching every calendar object.
    #[must_use]
    pub fn match_all() -> Self {
        Self {
            root: CompFilter::new("VCALENDAR"),
        }
    }

    /// Filter matching objects holding a component of `name`.
    #[must_use]
    pub fn component(name: impl Into<String>) -> Self {
        Self {
            root: CompFilter::new("VCALENDAR").with_comp_filter(CompFilter::new(name)),
        }
    }

    #[must_use]
    pub const fn root(&self) -> &CompFilter {
        &self.root
    }

    /// Time-range of the first component-level filter that has one.
    ///
    /// This is the window used when expanding matching objects.
    #[must_use]
    pub fn component_time_range(&self) -> Option<TimeRange> {
        fn find(filter: &CompFilter) -> Option<TimeRange> {
            filter
                .time_range
                .or_else(|| filter.comp_filters.iter().find_map(find))
        }
        self.root.comp_filters.iter().find_map(find)
    }
}

impl TryFrom<CompFilter> for CalendarFilter {
    type Error = RfcError;

    fn try_from(root: CompFilter) -> RfcResult<Self> {
        Self::new(root)
    }
}

impl From<CalendarFilter> for CompFilter {
    fn from(filter: CalendarFilter) -> Self {
        filter.root
    }
}
