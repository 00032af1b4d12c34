//! iCalendar text reader (RFC 5545 §3.1).
//!
//! `parse` turns one stored calendar object into an [`ICalendar`] tree.
//!
//! [`ICalendar`]: crate::rfc::ical::core::ICalendar

mod error;
mod lexer;
mod parser;
mod values;

pub use error::{ParseError, ParseErrorKind, ParseResult};
pub use parser::parse;
pub use values::{parse_date, parse_datetime, parse_duration, parse_rrule, parse_utc_offset};
