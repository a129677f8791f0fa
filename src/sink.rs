use crate::error::Result;
use crate::records::EmittedRecord;
use serde_json::{Deserializer, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Append-only raw artifact store: one `<stream>.json` file per stream,
/// holding a sequence of JSON values (one per record), not a single JSON
/// array. Consumers must parse it as a value sequence.
#[derive(Debug, Clone)]
pub struct RawStore {
    dir: PathBuf,
}

impl RawStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn stream_path(&self, stream: &str) -> PathBuf {
        self.dir.join(format!("{stream}.json"))
    }

    /// Append this run's records for a stream, one JSON value per line.
    pub fn append(&self, stream: &str, records: &[EmittedRecord]) -> Result<PathBuf> {
        let path = self.stream_path(stream);
        if records.is_empty() {
            return Ok(path);
        }
        fs::create_dir_all(&self.dir)?;

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        for record in records {
            serde_json::to_writer(&mut file, &record.data)?;
            file.write_all(b"\n")?;
        }

        debug!(stream, count = records.len(), "Appended raw records");
        Ok(path)
    }

    /// Parse a raw artifact back into its JSON values.
    pub fn read_values(path: &Path) -> Result<Vec<Value>> {
        let content = fs::read_to_string(path)?;
        let mut values = Vec::new();
        for value in Deserializer::from_str(&content).into_iter::<Value>() {
            values.push(value?);
        }
        Ok(values)
    }
}
