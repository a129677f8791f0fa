use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One movie item parsed from a page payload. All fields are optional; the
/// upstream API omits them freely (credits payloads carry almost none).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub release_date: Option<String>,
    pub popularity: Option<f64>,
    pub overview: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub genre_ids: Option<Vec<i64>>,
}

impl MovieRecord {
    fn from_item(item: &Value) -> Self {
        Self {
            id: item.get("id").and_then(Value::as_i64),
            title: string_field(item, "title"),
            release_date: string_field(item, "release_date"),
            popularity: item.get("popularity").and_then(Value::as_f64),
            overview: string_field(item, "overview"),
            vote_average: item.get("vote_average").and_then(Value::as_f64),
            vote_count: item.get("vote_count").and_then(Value::as_i64),
            genre_ids: item.get("genre_ids").and_then(Value::as_array).map(|ids| {
                ids.iter().filter_map(Value::as_i64).collect()
            }),
        }
    }
}

fn string_field(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse the `results` array of one page payload. Payloads without a
/// `results` array (genre lists, credits) yield no records.
pub fn parse_page(payload: &Value) -> Vec<MovieRecord> {
    payload
        .get("results")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(MovieRecord::from_item)
        .collect()
}

/// A record wrapped for downstream consumption: stream name, payload, and
/// wall-clock emission time in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedRecord {
    pub stream: String,
    pub data: MovieRecord,
    pub emitted_at: i64,
}

pub fn emit(stream: &str, data: MovieRecord) -> EmittedRecord {
    EmittedRecord {
        stream: stream.to_string(),
        data,
        emitted_at: Utc::now().timestamp_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_movie_fields_from_results() {
        let payload = json!({
            "page": 1,
            "total_pages": 3,
            "results": [
                {
                    "id": 603,
                    "title": "The Matrix",
                    "release_date": "1999-03-30",
                    "popularity": 84.5,
                    "overview": "A hacker learns the truth.",
                    "vote_average": 8.2,
                    "vote_count": 24000,
                    "genre_ids": [28, 878]
                },
                {"id": 604}
            ]
        });

        let records = parse_page(&payload);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title.as_deref(), Some("The Matrix"));
        assert_eq!(records[0].genre_ids, Some(vec![28, 878]));
        assert_eq!(records[1].id, Some(604));
        assert_eq!(records[1].release_date, None);
    }

    #[test]
    fn payload_without_results_yields_no_records() {
        let payload = json!({"id": 603, "cast": [], "crew": []});
        assert!(parse_page(&payload).is_empty());
    }

    #[test]
    fn empty_release_date_is_treated_as_missing() {
        let payload = json!({"results": [{"id": 1, "release_date": ""}]});
        let records = parse_page(&payload);
        assert_eq!(records[0].release_date, None);
    }

    #[test]
    fn emitted_record_carries_stream_and_timestamp() {
        let record = MovieRecord::from_item(&json!({"id": 1}));
        let emitted = emit("popular_movies", record);
        assert_eq!(emitted.stream, "popular_movies");
        assert!(emitted.emitted_at > 0);
    }
}
