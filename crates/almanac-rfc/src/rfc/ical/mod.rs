//! iCalendar (RFC 5545) document model, reader, writer and time zone support.

pub mod build;
pub mod core;
pub mod expand;
pub mod parse;
