//! Capability checks for incoming filters.

pub mod filter;

pub use filter::{UnsupportedFilter, validate_calendar_filter};
