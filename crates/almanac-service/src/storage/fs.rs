//! Directory-backed store: one sub-directory per calendar, one `.ics` file
//! per object.

use std::path::{Path, PathBuf};

use almanac_rfc::rfc::ical::parse::{ParseError, ParseErrorKind};

use super::CalendarStore;
use crate::error::{ServiceError, ServiceResult};

const OBJECT_EXTENSION: &str = "ics";

/// Calendars stored under a root directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn calendar_dir(&self, calendar_id: &str) -> ServiceResult<PathBuf> {
        validate_segment(calendar_id)?;
        Ok(self.root.join(calendar_id))
    }

    fn object_path(&self, calendar_id: &str, uri: &str) -> ServiceResult<PathBuf> {
        validate_segment(uri)?;
        Ok(self.calendar_dir(calendar_id)?.join(uri))
    }
}

/// ## Summary
/// Decodes stored bytes as UTF-8.
///
/// ## Errors
/// Returns a positioned `ParseError` pointing at the first invalid byte, so
/// the failure is scoped to this object.
fn decode(bytes: Vec<u8>) -> ServiceResult<String> {
    String::from_utf8(bytes).map_err(|err| {
        let valid = &err.as_bytes()[..err.utf8_error().valid_up_to()];
        let line = valid.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = valid.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
        let column = String::from_utf8_lossy(&valid[line_start..]).chars().count() + 1;
        ParseError::new(ParseErrorKind::InvalidUtf8, line, column).into()
    })
}

/// Rejects identifiers that would escape the calendar directory.
fn validate_segment(segment: &str) -> ServiceResult<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(ServiceError::Storage(format!(
            "invalid path segment `{segment}`"
        )));
    }
    Ok(())
}

impl CalendarStore for FsStore {
    #[tracing::instrument(skip(self))]
    async fn list_object_uris(&self, calendar_id: &str) -> ServiceResult<Vec<String>> {
        let dir = self.calendar_dir(calendar_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(ServiceError::NotFound(format!("calendar {calendar_id}")));
            }
            Err(error) => {
                return Err(ServiceError::Storage(format!(
                    "failed to list {}: {error}",
                    dir.display()
                )));
            }
        };

        let mut uris = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|error| {
            ServiceError::Storage(format!("failed to list {}: {error}", dir.display()))
        })? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(OBJECT_EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                uris.push(name.to_string());
            }
        }
        uris.sort_unstable();
        tracing::debug!(count = uris.len(), "Listed calendar objects");
        Ok(uris)
    }

    async fn get_object(&self, calendar_id: &str, uri: &str) -> ServiceResult<Option<String>> {
        let path = self.object_path(calendar_id, uri)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => decode(bytes).map(Some),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(ServiceError::Storage(format!(
                "failed to read {}: {error}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(root: &Path, calendar: &str, name: &str, data: &str) {
        let dir = root.join(calendar);
        tokio::fs::create_dir_all(&dir).await.expect("create dir");
        tokio::fs::write(dir.join(name), data).await.expect("write");
    }

    #[test_log::test(tokio::test)]
    async fn lists_ics_files_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "work", "b.ics", "B").await;
        write(dir.path(), "work", "a.ics", "A").await;
        write(dir.path(), "work", "notes.txt", "ignored").await;

        let store = FsStore::new(dir.path());
        assert_eq!(
            store.list_object_uris("work").await.expect("list"),
            vec!["a.ics", "b.ics"]
        );
        assert_eq!(
            store.get_object("work", "a.ics").await.expect("read"),
            Some("A".to_string())
        );
        assert_eq!(store.get_object("work", "zzz.ics").await.expect("read"), None);
    }

    #[test_log::test(tokio::test)]
    async fn default_batch_fetch_uses_single_reads() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "work", "a.ics", "A").await;

        let store = FsStore::new(dir.path());
        let found = store
            .get_objects("work", &["a.ics".to_string(), "b.ics".to_string()])
            .await
            .expect("read");
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("a.ics"));
    }

    #[test_log::test(tokio::test)]
    async fn undecodable_file_is_an_object_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let calendar = dir.path().join("work");
        tokio::fs::create_dir_all(&calendar).await.expect("create dir");
        tokio::fs::write(calendar.join("a.ics"), b"BEGIN:VCALENDAR\r\nSUMMARY:Caf\xe9\r\n")
            .await
            .expect("write");

        let err = FsStore::new(dir.path())
            .get_object("work", "a.ics")
            .await
            .expect_err("not UTF-8");
        assert!(err.is_object_scoped());
        match err {
            ServiceError::RfcError(almanac_rfc::error::RfcError::Parse(parse)) => {
                assert_eq!(parse.kind, ParseErrorKind::InvalidUtf8);
                assert_eq!((parse.line, parse.column), (2, 12));
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn missing_calendar_and_bad_segments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStore::new(dir.path());
        assert!(matches!(
            store.list_object_uris("nope").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            store.get_object("..", "a.ics").await,
            Err(ServiceError::Storage(_))
        ));
        assert!(matches!(
            store.get_object("work", "../a.ics").await,
            Err(ServiceError::Storage(_))
        ));
    }
}
