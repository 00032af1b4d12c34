//! Storage backends the query orchestrator reads calendar objects from.
//!
//! The engine treats stored object text as opaque input to the iCalendar
//! parser; backends only list and fetch it.

pub mod fs;
pub mod memory;

use std::collections::HashMap;

use crate::error::ServiceResult;

pub use fs::FsStore;
pub use memory::MemoryStore;

/// Read access to stored calendar objects.
pub trait CalendarStore: Send + Sync {
    /// ## Summary
    /// Lists the object URIs of a calendar in a stable order.
    ///
    /// ## Errors
    /// Returns `ServiceError::NotFound` if the calendar does not exist, or
    /// `ServiceError::Storage` if the backend fails.
    fn list_object_uris(
        &self,
        calendar_id: &str,
    ) -> impl Future<Output = ServiceResult<Vec<String>>> + Send;

    /// ## Summary
    /// Fetches the raw text of one object; `None` if it does not exist.
    ///
    /// ## Errors
    /// Returns `ServiceError::Storage` if the backend fails.
    fn get_object(
        &self,
        calendar_id: &str,
        uri: &str,
    ) -> impl Future<Output = ServiceResult<Option<String>>> + Send;

    /// ## Summary
    /// Fetches several objects in one round-trip.
    ///
    /// Missing URIs are absent from the returned map. The default falls back
    /// to one `get_object` call per URI.
    ///
    /// ## Errors
    /// Returns `ServiceError::Storage` if the backend fails.
    fn get_objects(
        &self,
        calendar_id: &str,
        uris: &[String],
    ) -> impl Future<Output = ServiceResult<HashMap<String, String>>> + Send {
        async move {
            let mut found = HashMap::with_capacity(uris.len());
            for uri in uris {
                if let Some(data) = self.get_object(calendar_id, uri).await? {
                    found.insert(uri.clone(), data);
                }
            }
            Ok(found)
        }
    }
}
