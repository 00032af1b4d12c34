//! Component tree serializer.

use crate::rfc::ical::core::{Component, ICalendar, Property};

use super::fold_line;

/// Writes one property as a folded content line with trailing CRLF.
#[must_use]
pub fn serialize_property(prop: &Property) -> String {
    let mut line = prop.name.clone();
    for param in &prop.params {
        line.push(';');
        line.push_str(&param.to_string());
    }
    line.push(':');
    line.push_str(&prop.raw_value);

    let mut out = fold_line(&line);
    out.push_str("\r\n");
    out
}

/// Writes a component and its children, preserving property order.
#[must_use]
pub fn serialize_component(component: &Component) -> String {
    let mut out = String::new();
    write_component(&mut out, component);
    out
}

fn write_component(out: &mut String, component: &Component) {
    out.push_str(&fold_line(&format!("BEGIN:{}", component.name)));
    out.push_str("\r\n");
    for prop in &component.properties {
        out.push_str(&serialize_property(prop));
    }
    for child in &component.children {
        write_component(out, child);
    }
    out.push_str(&fold_line(&format!("END:{}", component.name)));
    out.push_str("\r\n");
}

/// ## Summary
/// Serializes a calendar object to RFC 5545 text with CRLF line endings.
#[must_use]
pub fn serialize(ical: &ICalendar) -> String {
    serialize_component(&ical.root)
}
