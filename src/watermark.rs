use crate::error::Result;
use crate::records::MovieRecord;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// In-run tracker for one stream's latest release date. Lexicographic max is
/// safe because release dates are ISO-8601 strings.
#[derive(Debug, Default)]
pub struct WatermarkTracker {
    latest: Option<String>,
}

impl WatermarkTracker {
    pub fn new(initial: Option<String>) -> Self {
        Self { latest: initial }
    }

    pub fn observe(&mut self, record: &MovieRecord) {
        let Some(date) = record.release_date.as_deref() else {
            return;
        };
        if self.latest.as_deref().map_or(true, |seen| date > seen) {
            self.latest = Some(date.to_string());
        }
    }

    pub fn latest(&self) -> Option<&str> {
        self.latest.as_deref()
    }
}

/// Durable per-stream watermarks, persisted as a JSON object mapping stream
/// name to the latest seen release date.
///
/// A missing or corrupt file degrades to "no watermark" so the next run
/// performs a full extraction instead of failing.
#[derive(Debug)]
pub struct WatermarkStore {
    path: PathBuf,
    latest: BTreeMap<String, String>,
}

impl WatermarkStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let latest = Self::read_map(&path);
        Self { path, latest }
    }

    fn read_map(path: &Path) -> BTreeMap<String, String> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    "Watermark file {} is corrupt ({e}); falling back to full extraction",
                    path.display()
                );
                BTreeMap::new()
            }
        }
    }

    pub fn get(&self, stream: &str) -> Option<&str> {
        self.latest.get(stream).map(String::as_str)
    }

    /// Record a new watermark for a stream. Never moves a watermark backwards.
    pub fn advance(&mut self, stream: &str, date: &str) {
        match self.latest.get(stream) {
            Some(seen) if seen.as_str() >= date => {}
            _ => {
                debug!(stream, date, "Advancing watermark");
                self.latest.insert(stream.to_string(), date.to_string());
            }
        }
    }

    /// Write the current map to durable storage.
    pub fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.latest)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_date(date: &str) -> MovieRecord {
        MovieRecord {
            id: Some(1),
            title: None,
            release_date: Some(date.to_string()),
            popularity: None,
            overview: None,
            vote_average: None,
            vote_count: None,
            genre_ids: None,
        }
    }

    #[test]
    fn tracker_keeps_the_latest_date_seen() {
        let mut tracker = WatermarkTracker::new(None);
        for date in ["2020-01-01", "2019-05-05", "2021-03-03"] {
            tracker.observe(&record_with_date(date));
        }
        assert_eq!(tracker.latest(), Some("2021-03-03"));
    }

    #[test]
    fn tracker_is_seeded_with_the_stored_watermark() {
        let mut tracker = WatermarkTracker::new(Some("2022-01-01".to_string()));
        tracker.observe(&record_with_date("2021-06-06"));
        assert_eq!(tracker.latest(), Some("2022-01-01"));
    }

    #[test]
    fn store_round_trips_across_processes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermarks.json");

        let mut store = WatermarkStore::open(&path);
        store.advance("popular_movies", "2022-07-01");
        store.flush().unwrap();

        // Fresh "process"
        let store = WatermarkStore::open(&path);
        assert_eq!(store.get("popular_movies"), Some("2022-07-01"));
        assert_eq!(store.get("upcoming_movies"), None);
    }

    #[test]
    fn advance_never_moves_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = WatermarkStore::open(dir.path().join("watermarks.json"));
        store.advance("popular_movies", "2022-07-01");
        store.advance("popular_movies", "2020-01-01");
        assert_eq!(store.get("popular_movies"), Some("2022-07-01"));
    }

    #[test]
    fn corrupt_file_degrades_to_full_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermarks.json");
        fs::write(&path, "{not json").unwrap();

        let store = WatermarkStore::open(&path);
        assert_eq!(store.get("popular_movies"), None);
    }
}
