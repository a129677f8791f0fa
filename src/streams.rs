use crate::error::{EtlError, Result};
use crate::fetcher::{FetchResult, PageFetcher, PageRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, instrument};

// Fixed stream names
pub const POPULAR_MOVIES: &str = "popular_movies";
pub const TOP_RATED_MOVIES: &str = "top_rated_movies";
pub const UPCOMING_MOVIES: &str = "upcoming_movies";
pub const MOVIE_GENRES: &str = "movie_genres";

/// Prefix selecting all per-movie credits sub-streams on the CLI.
pub const CREDITS_PREFIX: &str = "credits_";

/// One logical, independently-paginated data source. Immutable after
/// enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    pub endpoint: String,
    pub primary_key: String,
}

impl StreamDescriptor {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            primary_key: "id".to_string(),
        }
    }

    pub fn is_credits(&self) -> bool {
        self.name.starts_with(CREDITS_PREFIX)
    }
}

/// The statically configured streams, in extraction order.
pub fn fixed_streams() -> Vec<StreamDescriptor> {
    vec![
        StreamDescriptor::new(POPULAR_MOVIES, "movie/popular"),
        StreamDescriptor::new(TOP_RATED_MOVIES, "movie/top_rated"),
        StreamDescriptor::new(UPCOMING_MOVIES, "movie/upcoming"),
        StreamDescriptor::new(MOVIE_GENRES, "genre/movie/list"),
    ]
}

/// Collect movie ids from page 1 of the three movie list streams, in
/// first-seen order with duplicates removed.
///
/// Any failure here is fatal to the run: without the id list no sub-stream
/// descriptors can be produced.
pub async fn discover_movie_ids(fetcher: &dyn PageFetcher) -> Result<Vec<i64>> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for stream in fixed_streams().iter().filter(|s| s.name != MOVIE_GENRES) {
        let request = PageRequest::first(None);
        let payload = match fetcher.fetch_page(stream, &request).await {
            FetchResult::Success { payload, .. } => payload,
            other => {
                return Err(EtlError::Api {
                    message: format!(
                        "Failed to reach '{}' during stream enumeration: {other:?}",
                        stream.name
                    ),
                })
            }
        };

        for item in payload
            .get("results")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let Some(id) = item.get("id").and_then(Value::as_i64) {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
        }
    }

    Ok(ids)
}

/// Produce the full stream list: the fixed streams plus one credits
/// sub-stream per discovered movie id.
///
/// Two-phase on purpose: ids are gathered eagerly before any descriptor is
/// materialized, so enumeration never issues API calls lazily mid-iteration.
#[instrument(skip(fetcher))]
pub async fn enumerate_streams(fetcher: &dyn PageFetcher) -> Result<Vec<StreamDescriptor>> {
    let movie_ids = discover_movie_ids(fetcher).await?;
    info!("Discovered {} distinct movie ids", movie_ids.len());

    let mut streams = fixed_streams();
    streams.extend(movie_ids.into_iter().map(|id| {
        StreamDescriptor::new(
            format!("{CREDITS_PREFIX}{id}"),
            format!("movie/{id}/credits"),
        )
    }));
    Ok(streams)
}
