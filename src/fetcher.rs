use crate::config::ApiConfig;
use crate::error::{EtlError, Result};
use crate::streams::StreamDescriptor;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// One page request as issued by the pagination controller. Not persisted.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub page: u32,
    /// Incremental filter: only items released on or after this date.
    pub watermark: Option<String>,
}

impl PageRequest {
    pub fn first(watermark: Option<String>) -> Self {
        Self { page: 1, watermark }
    }
}

/// Classified outcome of a single page fetch.
#[derive(Debug, Clone)]
pub enum FetchResult {
    Success {
        payload: Value,
        page: u32,
        total_pages: u32,
    },
    /// 404 — no data for this stream; skip it, not fatal to the run.
    NotFound,
    /// 429 — server asked us to slow down. `retry_after_secs` is absent when
    /// the Retry-After header was missing or unparseable.
    RateLimited { retry_after_secs: Option<u64> },
    /// Anything else (network failure, 5xx, bad JSON). Not retried here;
    /// the caller decides.
    TransientError { cause: String },
}

/// The seam between the pagination controller and the network. Production
/// code uses [`TmdbClient`]; tests script the responses.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, stream: &StreamDescriptor, request: &PageRequest) -> FetchResult;
}

/// HTTP client for the TMDB-shaped API: bearer auth, `page` and
/// `release_date.gte` query parameters, JSON envelope with
/// `page`/`total_pages`/`results`.
pub struct TmdbClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TmdbClient {
    pub fn new(api: &ApiConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    /// Probe the API before a run. Failure here is fatal: no stream list can
    /// be produced without a reachable API.
    pub async fn check_connection(&self) -> Result<()> {
        let url = self.endpoint_url("movie/popular");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| EtlError::Api {
                message: format!("Connection failed: {e}"),
            })?;
        response.error_for_status().map_err(|e| EtlError::Api {
            message: format!("Connection failed: {e}"),
        })?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PageFetcher for TmdbClient {
    async fn fetch_page(&self, stream: &StreamDescriptor, request: &PageRequest) -> FetchResult {
        let url = self.endpoint_url(&stream.endpoint);
        let mut params: Vec<(&str, String)> = vec![("page", request.page.to_string())];
        if let Some(since) = &request.watermark {
            params.push(("release_date.gte", since.clone()));
        }

        debug!(stream = %stream.name, page = request.page, "Fetching page");

        let response = match self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return FetchResult::TransientError {
                    cause: e.to_string(),
                }
            }
        };

        match response.status() {
            StatusCode::NOT_FOUND => FetchResult::NotFound,
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                FetchResult::RateLimited { retry_after_secs }
            }
            status if !status.is_success() => FetchResult::TransientError {
                cause: format!("unexpected status {status} from {url}"),
            },
            _ => match response.json::<Value>().await {
                Ok(payload) => {
                    // Endpoints without pagination (genre list, credits) omit
                    // these fields; treat them as a single page.
                    let page = payload
                        .get("page")
                        .and_then(Value::as_u64)
                        .unwrap_or(request.page as u64) as u32;
                    let total_pages =
                        payload.get("total_pages").and_then(Value::as_u64).unwrap_or(1) as u32;
                    FetchResult::Success {
                        payload,
                        page,
                        total_pages,
                    }
                }
                Err(e) => FetchResult::TransientError {
                    cause: format!("invalid JSON body: {e}"),
                },
            },
        }
    }
}
