//! iCalendar property and content line types (RFC 5545 §3.1, §3.8).

use chrono::NaiveDate;

use super::{DateTime, DateTimeValue, Duration, Parameter, Value};

/// A raw content line as read from iCalendar text.
///
/// This is the low-level representation before value type resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    /// Property name (normalized to uppercase).
    pub name: String,
    /// Parameters in order of appearance.
    pub params: Vec<Parameter>,
    /// Raw value string (after unfolding, before unescaping).
    pub raw_value: String,
}

impl ContentLine {
    /// Returns the first value of the named parameter.
    #[must_use]
    pub fn get_param_value(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .and_then(Parameter::value)
    }

    /// Returns the VALUE parameter if present.
    #[must_use]
    pub fn value_type(&self) -> Option<&str> {
        self.get_param_value("VALUE")
    }

    /// Returns the TZID parameter if present.
    #[must_use]
    pub fn tzid(&self) -> Option<&str> {
        self.get_param_value("TZID")
    }
}

/// A fully parsed iCalendar property.
///
/// Contains the typed value along with the original raw value.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Property name (normalized to uppercase).
    pub name: String,
    /// Parameters in order of appearance; names may repeat.
    pub params: Vec<Parameter>,
    /// Parsed value.
    pub value: Value,
    /// Original raw value string, escaped as on the wire.
    pub raw_value: String,
}

impl Property {
    fn build(name: impl Into<String>, params: Vec<Parameter>, value: Value, raw: String) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            params,
            value,
            raw_value: raw,
        }
    }

    /// Creates a property with a text value; `raw_value` holds the escaped form.
    #[must_use]
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        let raw = crate::rfc::ical::build::escape_text(&value);
        Self::build(name, Vec::new(), Value::Text(value), raw)
    }

    #[must_use]
    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Self::build(name, Vec::new(), Value::Integer(value), value.to_string())
    }

    /// Creates a DATE-TIME property, adding a TZID parameter for zoned values.
    #[must_use]
    pub fn datetime(name: impl Into<String>, dt: DateTime) -> Self {
        let params = dt.tzid().map(Parameter::tzid).into_iter().collect();
        let raw = dt.to_string();
        Self::build(name, params, Value::DateTime(dt), raw)
    }

    /// Creates a DATE property with `VALUE=DATE`.
    #[must_use]
    pub fn date(name: impl Into<String>, date: NaiveDate) -> Self {
        let raw = date.format("%Y%m%d").to_string();
        Self::build(name, vec![Parameter::value_type("DATE")], Value::Date(date), raw)
    }

    /// Creates a DATE or DATE-TIME property from a temporal value.
    #[must_use]
    pub fn date_time_value(name: impl Into<String>, value: DateTimeValue) -> Self {
        match value {
            DateTimeValue::Date(date) => Self::date(name, date),
            DateTimeValue::DateTime(dt) => Self::datetime(name, dt),
        }
    }

    #[must_use]
    pub fn duration(name: impl Into<String>, d: Duration) -> Self {
        let raw = d.to_string();
        Self::build(name, Vec::new(), Value::Duration(d), raw)
    }

    /// Creates a property from a content line with an unparsed value.
    #[must_use]
    pub fn from_content_line(cl: ContentLine) -> Self {
        Self {
            name: cl.name,
            params: cl.params,
            value: Value::Unknown(cl.raw_value.clone()),
            raw_value: cl.raw_value,
        }
    }

    /// Returns the first parameter with the given name.
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Returns every parameter with the given name, in order.
    #[must_use]
    pub fn get_params(&self, name: &str) -> Vec<&Parameter> {
        self.params
            .iter()
            .filter(|p| p.name.eq_ignore_ascii_case(name))
            .collect()
    }

    /// Returns the first value of a parameter.
    #[must_use]
    pub fn get_param_value(&self, name: &str) -> Option<&str> {
        self.get_param(name)?.value()
    }

    #[must_use]
    pub fn has_param(&self, name: &str) -> bool {
        self.get_param(name).is_some()
    }

    /// Sets a parameter, replacing any existing parameter with the same name.
    pub fn set_param(&mut self, param: Parameter) {
        self.params.retain(|p| p.name != param.name);
        self.params.push(param);
    }

    /// Removes every parameter with the given name.
    pub fn remove_param(&mut self, name: &str) {
        self.params.retain(|p| !p.name.eq_ignore_ascii_case(name));
    }

    #[must_use]
    pub fn tzid(&self) -> Option<&str> {
        self.get_param_value("TZID")
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        self.value.as_text()
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        self.value.as_integer()
    }

    #[must_use]
    pub fn as_duration(&self) -> Option<&Duration> {
        self.value.as_duration()
    }

    #[must_use]
    pub fn as_date_time_value(&self) -> Option<DateTimeValue> {
        self.value.as_date_time_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_property_escapes_raw_value() {
        let prop = Property::text("summary", "Lunch; with, friends");
        assert_eq!(prop.name, "SUMMARY");
        assert_eq!(prop.as_text(), Some("Lunch; with, friends"));
        assert_eq!(prop.raw_value, "Lunch\\; with\\, friends");
    }

    #[test]
    fn zoned_datetime_carries_tzid() {
        let local = NaiveDate::from_ymd_opt(2012, 2, 7)
            .and_then(|d| d.and_hms_opt(18, 15, 0))
            .expect("valid datetime");
        let prop = Property::datetime("DTSTART", DateTime::zoned(local, "Europe/Berlin"));
        assert_eq!(prop.tzid(), Some("Europe/Berlin"));
        assert_eq!(prop.raw_value, "20120207T181500");
    }

    #[test]
    fn repeated_parameters_are_kept() {
        let mut prop = Property::text("ATTENDEE", "mailto:a@example.com");
        prop.params.push(Parameter::new("X-TAG", "one"));
        prop.params.push(Parameter::new("x-tag", "two"));
        assert_eq!(prop.get_params("X-TAG").len(), 2);
        prop.set_param(Parameter::new("X-TAG", "three"));
        assert_eq!(prop.get_params("X-TAG").len(), 1);
        assert_eq!(prop.get_param_value("x-tag"), Some("three"));
        prop.remove_param("X-TAG");
        assert!(!prop.has_param("X-TAG"));
    }
}
