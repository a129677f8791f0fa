use crate::error::{EtlError, Result};
use crate::sink::RawStore;
use crate::streams::{POPULAR_MOVIES, TOP_RATED_MOVIES, UPCOMING_MOVIES};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// The fixed streams that get a relational table. Sub-streams and the genre
/// list stay in the raw store only.
pub const LOADABLE_STREAMS: [&str; 3] = [POPULAR_MOVIES, TOP_RATED_MOVIES, UPCOMING_MOVIES];

/// Outcome of loading one stream's raw artifact.
#[derive(Debug)]
pub struct LoadOutcome {
    pub read: usize,
    pub inserted: usize,
}

/// SQLite sink for the load step. One table per fixed movie stream, keyed by
/// `movie_id`, with inserts deduplicated via conflict-ignore.
pub struct MovieDb {
    conn: Connection,
}

impl MovieDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self { conn })
    }

    fn init(conn: &Connection) -> Result<()> {
        for table in LOADABLE_STREAMS {
            conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id           INTEGER PRIMARY KEY AUTOINCREMENT,
                    movie_id     INTEGER UNIQUE,
                    title        TEXT NOT NULL,
                    release_date TEXT,
                    popularity   REAL,
                    overview     TEXT,
                    vote_average REAL,
                    vote_count   INTEGER,
                    genre_ids    TEXT
                );
                "#
            ))?;
        }
        Ok(())
    }

    /// Insert movie rows into a stream's table. Rows whose `movie_id` already
    /// exists are silently ignored, which makes the load idempotent.
    pub fn insert_movies(&self, stream: &str, rows: &[Value]) -> Result<usize> {
        if !LOADABLE_STREAMS.contains(&stream) {
            return Err(EtlError::Database {
                message: format!("'{stream}' has no relational table"),
            });
        }

        let sql = format!(
            "INSERT OR IGNORE INTO {stream}
             (movie_id, title, release_date, popularity, overview, vote_average, vote_count, genre_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let mut inserted = 0;
        for row in rows {
            let Some(movie_id) = row.get("id").and_then(Value::as_i64) else {
                warn!(stream, "Skipping row without an id");
                continue;
            };
            let genre_ids = row
                .get("genre_ids")
                .filter(|v| !v.is_null())
                .map(serde_json::to_string)
                .transpose()?;
            inserted += stmt.execute(params![
                movie_id,
                row.get("title").and_then(Value::as_str).unwrap_or(""),
                row.get("release_date").and_then(Value::as_str),
                row.get("popularity").and_then(Value::as_f64),
                row.get("overview").and_then(Value::as_str),
                row.get("vote_average").and_then(Value::as_f64),
                row.get("vote_count").and_then(Value::as_i64),
                genre_ids,
            ])?;
        }
        Ok(inserted)
    }

    /// Load one stream's raw artifact. A missing file is a skip, not an error.
    pub fn load_stream(&self, stream: &str, raw_path: &Path) -> Result<Option<LoadOutcome>> {
        if !raw_path.exists() {
            warn!(stream, path = %raw_path.display(), "Raw file not found; skipping");
            return Ok(None);
        }
        let rows = RawStore::read_values(raw_path)?;
        if rows.is_empty() {
            info!(stream, "No records in raw file; skipping");
            return Ok(None);
        }
        let inserted = self.insert_movies(stream, &rows)?;
        info!(stream, read = rows.len(), inserted, "Loaded stream");
        Ok(Some(LoadOutcome {
            read: rows.len(),
            inserted,
        }))
    }

    pub fn count(&self, stream: &str) -> Result<i64> {
        if !LOADABLE_STREAMS.contains(&stream) {
            return Err(EtlError::Database {
                message: format!("'{stream}' has no relational table"),
            });
        }
        let count =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {stream}"), [], |row| {
                    row.get(0)
                })?;
        Ok(count)
    }
}
