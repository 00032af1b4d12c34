use thiserror::Error;

use crate::rfc::ical::expand::TimezoneError;
use crate::rfc::ical::parse::ParseError;

/// iCalendar parsing, filter and recurrence errors
#[derive(Error, Debug)]
pub enum RfcError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid recurrence rule: {0}")]
    InvalidRecurrence(String),

    #[error(transparent)]
    Timezone(#[from] TimezoneError),
}

pub type RfcResult<T> = std::result::Result<T, RfcError>;
