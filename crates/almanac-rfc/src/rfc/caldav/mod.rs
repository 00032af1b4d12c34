//! CalDAV calendar-query filter tree (RFC 4791 §9.7).

pub mod filter;
pub mod text_match;

pub use filter::{CalendarFilter, CompFilter, ParamFilter, PropFilter, TimeRange};
pub use text_match::{Collation, MatchType, TextMatch};
