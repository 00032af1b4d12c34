//! CalDAV calendar-query evaluation.
//!
//! ## Module Organization
//!
//! - `recurrence`: recurrence sets and lazy occurrence generation
//! - `timerange`: RFC 4791 §9.9 time-range tests per component type
//! - `filter`: comp/prop/param filter evaluation
//! - `expand`: `expand` and `limit-recurrence-set` calendar-data shaping
//! - `service`: report orchestration over a storage backend

pub mod expand;
pub mod filter;
pub mod recurrence;
pub mod service;
pub mod timerange;

pub use expand::{expand_calendar, limit_recurrence_set};
pub use filter::matches;
pub use recurrence::{Occurrence, RecurrenceSet};
pub use timerange::occurs_in_range;
