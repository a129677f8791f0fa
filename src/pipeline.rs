use crate::config::StorageConfig;
use crate::db::{MovieDb, LOADABLE_STREAMS};
use crate::error::Result;
use crate::fetcher::PageFetcher;
use crate::paginator::extract_stream;
use crate::sink::RawStore;
use crate::streams::{enumerate_streams, StreamDescriptor};
use crate::transform::{clean_stream, CleaningReport};
use crate::watermark::WatermarkStore;
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Per-stream outcome of one extraction run.
#[derive(Debug, Serialize)]
pub struct StreamRunResult {
    pub stream: String,
    pub records: usize,
    pub pages: u32,
    pub watermark: Option<String>,
    pub error: Option<String>,
}

/// Summary of a whole extraction run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub streams: Vec<StreamRunResult>,
}

impl RunSummary {
    pub fn total_records(&self) -> usize {
        self.streams.iter().map(|s| s.records).sum()
    }

    pub fn failed_streams(&self) -> usize {
        self.streams.iter().filter(|s| s.error.is_some()).count()
    }
}

fn selected(stream: &StreamDescriptor, filter: Option<&[String]>) -> bool {
    match filter {
        None => true,
        Some(names) => names
            .iter()
            .any(|name| name == &stream.name || (name == "credits" && stream.is_credits())),
    }
}

/// Run the extraction pipeline: enumerate streams, then page through each one
/// sequentially, appending raw records and advancing watermarks as streams
/// complete.
///
/// Failures are isolated per stream; only enumeration failure aborts the run.
#[instrument(skip_all, fields(run_id))]
pub async fn run_extraction(
    fetcher: &dyn PageFetcher,
    storage: &StorageConfig,
    stream_filter: Option<&[String]>,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    tracing::Span::current().record("run_id", tracing::field::display(run_id));

    let streams = enumerate_streams(fetcher).await?;
    let mut watermarks = WatermarkStore::open(&storage.watermark_file);
    let raw_store = RawStore::new(&storage.data_dir);

    let mut results = Vec::new();
    for stream in streams.iter().filter(|s| selected(s, stream_filter)) {
        let since = watermarks.get(&stream.name).map(str::to_string);
        match extract_stream(fetcher, stream, since.as_deref()).await {
            Ok(extraction) => {
                raw_store.append(&stream.name, &extraction.records)?;
                if let Some(date) = &extraction.watermark {
                    watermarks.advance(&stream.name, date);
                    // Flushed at end of each stream so a later failure
                    // cannot lose this stream's progress.
                    watermarks.flush()?;
                }
                info!(
                    stream = %stream.name,
                    records = extraction.records.len(),
                    pages = extraction.pages_fetched,
                    "Stream extracted"
                );
                results.push(StreamRunResult {
                    stream: stream.name.clone(),
                    records: extraction.records.len(),
                    pages: extraction.pages_fetched,
                    watermark: extraction.watermark,
                    error: None,
                });
            }
            Err(e) => {
                error!(stream = %stream.name, "Stream failed: {e}");
                results.push(StreamRunResult {
                    stream: stream.name.clone(),
                    records: 0,
                    pages: 0,
                    watermark: since,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    Ok(RunSummary {
        run_id,
        streams: results,
    })
}

/// Per-table outcome of the load step.
#[derive(Debug)]
pub struct LoadSummary {
    pub stream: String,
    pub read: usize,
    pub inserted: usize,
}

/// Load the fixed movie streams' raw artifacts into their relational tables.
/// Missing artifacts are skipped with a log line.
#[instrument(skip(storage))]
pub fn run_load(storage: &StorageConfig) -> Result<Vec<LoadSummary>> {
    let db = MovieDb::open(&storage.database_file)?;
    let raw_store = RawStore::new(&storage.data_dir);

    let mut summaries = Vec::new();
    for stream in LOADABLE_STREAMS {
        let raw_path = raw_store.stream_path(stream);
        if let Some(outcome) = db.load_stream(stream, &raw_path)? {
            summaries.push(LoadSummary {
                stream: stream.to_string(),
                read: outcome.read,
                inserted: outcome.inserted,
            });
        }
    }
    Ok(summaries)
}

/// Run the cleaning pass over the given streams' raw artifacts.
pub fn run_transform(storage: &StorageConfig, streams: &[String]) -> Result<Vec<CleaningReport>> {
    let raw_store = RawStore::new(&storage.data_dir);
    let mut reports = Vec::new();
    for stream in streams {
        let path = raw_store.stream_path(stream);
        reports.push(clean_stream(stream, &path)?);
    }
    Ok(reports)
}
