use crate::error::{EtlError, Result};
use crate::fetcher::{FetchResult, PageFetcher, PageRequest};
use crate::records::{emit, parse_page, EmittedRecord};
use crate::streams::StreamDescriptor;
use crate::watermark::WatermarkTracker;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Hard traversal-depth limit per stream, independent of the API's
/// self-reported `total_pages`.
pub const PAGE_CAP: u32 = 10;

/// Backoff applied when a 429 response carries no Retry-After duration.
pub const DEFAULT_RETRY_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Start,
    Fetching(u32),
    Retrying { page: u32, wait_secs: u64 },
    Done,
}

/// Everything one stream produced in a single run.
#[derive(Debug)]
pub struct StreamExtraction {
    pub records: Vec<EmittedRecord>,
    pub pages_fetched: u32,
    /// Latest release date observed, including the seed watermark.
    pub watermark: Option<String>,
}

/// Drive the pagination state machine for one stream until `Done`.
///
/// Rate-limited fetches are retried on the same page, without bound, after
/// sleeping the indicated backoff. A 404 ends the stream gracefully with
/// whatever was gathered so far. Any other failure aborts this stream only;
/// the caller continues with the remaining streams.
#[instrument(skip(fetcher), fields(stream = %stream.name))]
pub async fn extract_stream(
    fetcher: &dyn PageFetcher,
    stream: &StreamDescriptor,
    since: Option<&str>,
) -> Result<StreamExtraction> {
    let mut tracker = WatermarkTracker::new(since.map(str::to_string));
    let mut records = Vec::new();
    let mut pages_fetched = 0u32;
    let mut state = PageState::Start;

    loop {
        state = match state {
            PageState::Start => PageState::Fetching(1),

            PageState::Fetching(page) => {
                let request = PageRequest {
                    page,
                    watermark: since.map(str::to_string),
                };
                match fetcher.fetch_page(stream, &request).await {
                    FetchResult::Success {
                        payload,
                        total_pages,
                        ..
                    } => {
                        pages_fetched += 1;
                        for record in parse_page(&payload) {
                            tracker.observe(&record);
                            records.push(emit(&stream.name, record));
                        }
                        if page < total_pages.min(PAGE_CAP) {
                            PageState::Fetching(page + 1)
                        } else {
                            PageState::Done
                        }
                    }
                    FetchResult::NotFound => {
                        info!(page, "Stream not found upstream; skipping");
                        PageState::Done
                    }
                    FetchResult::RateLimited { retry_after_secs } => PageState::Retrying {
                        page,
                        wait_secs: retry_after_secs.unwrap_or(DEFAULT_RETRY_SECS),
                    },
                    FetchResult::TransientError { cause } => {
                        return Err(EtlError::Stream {
                            stream: stream.name.clone(),
                            message: cause,
                        })
                    }
                }
            }

            // Re-issue the identical page request after the backoff. The page
            // cursor and watermark are untouched while retrying.
            PageState::Retrying { page, wait_secs } => {
                warn!(page, wait_secs, "Rate limited; retrying same page");
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                PageState::Fetching(page)
            }

            PageState::Done => break,
        };
    }

    Ok(StreamExtraction {
        records,
        pages_fetched,
        watermark: tracker.latest().map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Serves a scripted list of responses and records every requested page.
    struct ScriptedFetcher {
        responses: Mutex<Vec<FetchResult>>,
        requested_pages: Mutex<Vec<u32>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<FetchResult>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requested_pages: Mutex::new(Vec::new()),
            }
        }

        fn pages(&self) -> Vec<u32> {
            self.requested_pages.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch_page(
            &self,
            _stream: &StreamDescriptor,
            request: &PageRequest,
        ) -> FetchResult {
            self.requested_pages.lock().unwrap().push(request.page);
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn page_payload(page: u32, total_pages: u32, dates: &[&str]) -> FetchResult {
        let results: Vec<Value> = dates
            .iter()
            .enumerate()
            .map(|(i, date)| json!({"id": (page * 100 + i as u32), "release_date": date}))
            .collect();
        FetchResult::Success {
            payload: json!({"page": page, "total_pages": total_pages, "results": results}),
            page,
            total_pages,
        }
    }

    fn descriptor() -> StreamDescriptor {
        StreamDescriptor::new("popular_movies", "movie/popular")
    }

    #[tokio::test]
    async fn never_fetches_beyond_the_page_cap() {
        let responses = (1..=PAGE_CAP)
            .map(|p| page_payload(p, 500, &["2020-01-01"]))
            .collect();
        let fetcher = ScriptedFetcher::new(responses);

        let extraction = extract_stream(&fetcher, &descriptor(), None).await.unwrap();

        assert_eq!(extraction.pages_fetched, PAGE_CAP);
        assert_eq!(fetcher.pages(), (1..=PAGE_CAP).collect::<Vec<_>>());
        assert_eq!(extraction.records.len(), PAGE_CAP as usize);
    }

    #[tokio::test]
    async fn single_page_stream_fetches_exactly_once() {
        let fetcher = ScriptedFetcher::new(vec![page_payload(1, 1, &["2021-05-05"])]);

        let extraction = extract_stream(&fetcher, &descriptor(), None).await.unwrap();

        assert_eq!(extraction.pages_fetched, 1);
        assert_eq!(fetcher.pages(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_the_same_page_without_advancing() {
        let fetcher = ScriptedFetcher::new(vec![
            page_payload(1, 2, &["2020-01-01"]),
            FetchResult::RateLimited {
                retry_after_secs: Some(2),
            },
            page_payload(2, 2, &["2020-02-02"]),
        ]);

        let extraction = extract_stream(&fetcher, &descriptor(), None).await.unwrap();

        // Page 2 was asked for twice: once rate limited, once successful.
        assert_eq!(fetcher.pages(), vec![1, 2, 2]);
        assert_eq!(extraction.pages_fetched, 2);
        assert_eq!(extraction.records.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_retry_after_uses_the_default_backoff() {
        let fetcher = ScriptedFetcher::new(vec![
            FetchResult::RateLimited {
                retry_after_secs: None,
            },
            page_payload(1, 1, &[]),
        ]);

        let started = tokio::time::Instant::now();
        extract_stream(&fetcher, &descriptor(), None).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(DEFAULT_RETRY_SECS));
        assert_eq!(fetcher.pages(), vec![1, 1]);
    }

    #[tokio::test]
    async fn not_found_ends_the_stream_with_zero_records() {
        let fetcher = ScriptedFetcher::new(vec![FetchResult::NotFound]);

        let extraction = extract_stream(&fetcher, &descriptor(), None).await.unwrap();

        assert_eq!(extraction.records.len(), 0);
        assert_eq!(extraction.pages_fetched, 0);
    }

    #[tokio::test]
    async fn transient_error_aborts_only_this_stream() {
        let fetcher = ScriptedFetcher::new(vec![
            page_payload(1, 3, &["2020-01-01"]),
            FetchResult::TransientError {
                cause: "boom".to_string(),
            },
        ]);

        let err = extract_stream(&fetcher, &descriptor(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("popular_movies"));
    }

    #[tokio::test]
    async fn watermark_advances_across_pages() {
        let fetcher = ScriptedFetcher::new(vec![
            page_payload(1, 2, &["2020-01-01", "2019-05-05"]),
            page_payload(2, 2, &["2021-03-03"]),
        ]);

        let extraction = extract_stream(&fetcher, &descriptor(), None).await.unwrap();
        assert_eq!(extraction.watermark.as_deref(), Some("2021-03-03"));
    }

    #[tokio::test]
    async fn seed_watermark_is_passed_to_every_request_and_kept() {
        struct CapturingFetcher {
            seen: Mutex<Vec<Option<String>>>,
        }
        #[async_trait::async_trait]
        impl PageFetcher for CapturingFetcher {
            async fn fetch_page(
                &self,
                _stream: &StreamDescriptor,
                request: &PageRequest,
            ) -> FetchResult {
                self.seen.lock().unwrap().push(request.watermark.clone());
                page_payload(1, 1, &["2019-01-01"])
            }
        }

        let fetcher = CapturingFetcher {
            seen: Mutex::new(Vec::new()),
        };
        let extraction = extract_stream(&fetcher, &descriptor(), Some("2022-07-01"))
            .await
            .unwrap();

        assert_eq!(
            fetcher.seen.lock().unwrap().clone(),
            vec![Some("2022-07-01".to_string())]
        );
        // An older record never moves the watermark backwards.
        assert_eq!(extraction.watermark.as_deref(), Some("2022-07-01"));
    }
}
