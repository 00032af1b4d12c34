//! In-memory backend keeping objects in insertion order.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::CalendarStore;
use crate::error::{ServiceError, ServiceResult};

/// Calendars held in memory; listing returns objects in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    calendars: RwLock<HashMap<String, Vec<(String, String)>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Self::put_object`] for fixtures.
    #[must_use]
    pub fn with_object(
        mut self,
        calendar_id: impl Into<String>,
        uri: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        upsert(self.calendars.get_mut(), calendar_id.into(), uri.into(), data.into());
        self
    }

    /// ## Summary
    /// Stores an object, creating the calendar if needed.
    ///
    /// Replacing an existing URI keeps its position in the listing.
    pub async fn put_object(
        &self,
        calendar_id: impl Into<String>,
        uri: impl Into<String>,
        data: impl Into<String>,
    ) {
        let mut calendars = self.calendars.write().await;
        upsert(&mut calendars, calendar_id.into(), uri.into(), data.into());
    }

    /// Removes an object; returns whether it existed.
    pub async fn delete_object(&self, calendar_id: &str, uri: &str) -> bool {
        let mut calendars = self.calendars.write().await;
        let Some(objects) = calendars.get_mut(calendar_id) else {
            return false;
        };
        let before = objects.len();
        objects.retain(|(existing, _)| existing != uri);
        objects.len() != before
    }
}

fn upsert(
    calendars: &mut HashMap<String, Vec<(String, String)>>,
    calendar_id: String,
    uri: String,
    data: String,
) {
    let objects = calendars.entry(calendar_id).or_default();
    match objects.iter_mut().find(|(existing, _)| *existing == uri) {
        Some((_, existing)) => *existing = data,
        None => objects.push((uri, data)),
    }
}

impl CalendarStore for MemoryStore {
    async fn list_object_uris(&self, calendar_id: &str) -> ServiceResult<Vec<String>> {
        let calendars = self.calendars.read().await;
        calendars
            .get(calendar_id)
            .map(|objects| objects.iter().map(|(uri, _)| uri.clone()).collect())
            .ok_or_else(|| ServiceError::NotFound(format!("calendar {calendar_id}")))
    }

    async fn get_object(&self, calendar_id: &str, uri: &str) -> ServiceResult<Option<String>> {
        let calendars = self.calendars.read().await;
        Ok(calendars.get(calendar_id).and_then(|objects| {
            objects
                .iter()
                .find(|(existing, _)| existing == uri)
                .map(|(_, data)| data.clone())
        }))
    }

    async fn get_objects(
        &self,
        calendar_id: &str,
        uris: &[String],
    ) -> ServiceResult<HashMap<String, String>> {
        let calendars = self.calendars.read().await;
        let Some(objects) = calendars.get(calendar_id) else {
            return Ok(HashMap::new());
        };
        Ok(objects
            .iter()
            .filter(|(uri, _)| uris.contains(uri))
            .cloned()
            .collect())
    }
}
