use almanac_rfc::error::RfcError;
use almanac_rfc::rfc::ical::expand::TimezoneError;
use thiserror::Error;

/// Service layer errors - combines all error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    RfcError(#[from] RfcError),

    #[error(transparent)]
    CoreError(#[from] almanac_core::error::CoreError),

    #[error("Unbounded expansion: {0}")]
    UnboundedExpansion(String),

    #[error("Corrupt object {uri} in calendar {calendar_id}: {source}")]
    CorruptObject {
        calendar_id: String,
        uri: String,
        #[source]
        source: RfcError,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<TimezoneError> for ServiceError {
    fn from(err: TimezoneError) -> Self {
        Self::RfcError(RfcError::Timezone(err))
    }
}

impl From<almanac_rfc::rfc::ical::parse::ParseError> for ServiceError {
    fn from(err: almanac_rfc::rfc::ical::parse::ParseError) -> Self {
        Self::RfcError(RfcError::Parse(err))
    }
}

impl ServiceError {
    /// ## Summary
    /// Whether the error is scoped to a single stored object.
    ///
    /// Such errors are skipped by the query orchestrator when
    /// `skip_corrupt_objects` is enabled.
    #[must_use]
    pub const fn is_object_scoped(&self) -> bool {
        matches!(
            self,
            Self::CorruptObject { .. }
                | Self::RfcError(
                    RfcError::Parse(_) | RfcError::InvalidRecurrence(_) | RfcError::Timezone(_)
                )
        )
    }

    /// ## Summary
    /// Scopes an engine error to the stored object it came from.
    ///
    /// Errors already tied to an object, or not about object data, are
    /// returned unchanged.
    #[must_use]
    pub fn for_object(self, calendar_id: &str, uri: &str) -> Self {
        match self {
            Self::RfcError(
                source @ (RfcError::Parse(_)
                | RfcError::InvalidRecurrence(_)
                | RfcError::Timezone(_)),
            ) => Self::CorruptObject {
                calendar_id: calendar_id.to_string(),
                uri: uri.to_string(),
                source,
            },
            other => other,
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
