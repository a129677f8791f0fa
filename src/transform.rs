use crate::error::Result;
use crate::sink::RawStore;
use chrono::{Datelike, NaiveDate, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{info, instrument};

const COLUMNS: [&str; 8] = [
    "id",
    "title",
    "release_date",
    "popularity",
    "overview",
    "vote_average",
    "vote_count",
    "genre_ids",
];

/// How far in the future a release date may plausibly be.
const HORIZON_YEARS: i32 = 10;

/// Popularity values beyond this many standard deviations from the mean are
/// reported as outliers.
const OUTLIER_SIGMA: f64 = 5.0;

/// Result of the cleaning pass over one stream's raw artifact. The artifact
/// itself is left untouched; this is a report, not a rewrite.
#[derive(Debug)]
pub struct CleaningReport {
    pub stream: String,
    pub rows: usize,
    /// Missing (absent or null) values per column.
    pub missing: BTreeMap<String, usize>,
    pub duplicates_dropped: usize,
    /// Rows dated after today but within the plausibility horizon. Reported,
    /// kept.
    pub future_dated: usize,
    /// Rows dropped: unparseable dates or dates beyond the horizon.
    pub invalid_dates_dropped: usize,
    /// (movie id, popularity) of statistical outliers.
    pub popularity_outliers: Vec<(Option<i64>, f64)>,
    pub kept: usize,
}

/// Clean one stream's raw artifact: count missing values, drop exact
/// duplicates, validate release dates, and flag popularity outliers.
#[instrument(skip(path))]
pub fn clean_stream(stream: &str, path: &Path) -> Result<CleaningReport> {
    let rows = RawStore::read_values(path)?;
    let today = Utc::now().date_naive();
    clean_rows(stream, rows, today)
}

fn clean_rows(stream: &str, rows: Vec<Value>, today: NaiveDate) -> Result<CleaningReport> {
    let total = rows.len();

    let mut missing: BTreeMap<String, usize> = BTreeMap::new();
    for column in COLUMNS {
        let count = rows
            .iter()
            .filter(|row| row.get(column).map_or(true, Value::is_null))
            .count();
        missing.insert(column.to_string(), count);
    }

    // Exact-duplicate rows, first occurrence wins
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(rows.len());
    for row in rows {
        if seen.insert(row.to_string()) {
            unique.push(row);
        }
    }
    let duplicates_dropped = total - unique.len();

    let horizon = today
        .with_year(today.year() + HORIZON_YEARS)
        .unwrap_or(today);
    let mut future_dated = 0;
    let mut invalid_dates_dropped = 0;
    let mut kept = Vec::with_capacity(unique.len());
    for row in unique {
        match parse_release_date(&row) {
            Some(date) if date > horizon => invalid_dates_dropped += 1,
            Some(date) => {
                if date > today {
                    future_dated += 1;
                }
                kept.push(row);
            }
            None => {
                // No parseable date; an invalid one means the row can't be
                // validated, an absent one is merely a missing value.
                if row
                    .get("release_date")
                    .and_then(Value::as_str)
                    .map_or(false, |s| !s.is_empty())
                {
                    invalid_dates_dropped += 1;
                } else {
                    kept.push(row);
                }
            }
        }
    }

    let popularity: Vec<(Option<i64>, f64)> = kept
        .iter()
        .filter_map(|row| {
            row.get("popularity")
                .and_then(Value::as_f64)
                .map(|p| (row.get("id").and_then(Value::as_i64), p))
        })
        .collect();
    let popularity_outliers = find_outliers(&popularity);

    let report = CleaningReport {
        stream: stream.to_string(),
        rows: total,
        missing,
        duplicates_dropped,
        future_dated,
        invalid_dates_dropped,
        popularity_outliers,
        kept: kept.len(),
    };
    info!(
        stream,
        rows = report.rows,
        duplicates = report.duplicates_dropped,
        future_dated = report.future_dated,
        dropped = report.invalid_dates_dropped,
        outliers = report.popularity_outliers.len(),
        "Cleaning pass complete"
    );
    Ok(report)
}

fn parse_release_date(row: &Value) -> Option<NaiveDate> {
    row.get("release_date")
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn find_outliers(popularity: &[(Option<i64>, f64)]) -> Vec<(Option<i64>, f64)> {
    if popularity.len() < 2 {
        return Vec::new();
    }
    let n = popularity.len() as f64;
    let mean = popularity.iter().map(|(_, p)| p).sum::<f64>() / n;
    let variance = popularity
        .iter()
        .map(|(_, p)| (p - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return Vec::new();
    }
    popularity
        .iter()
        .filter(|(_, p)| (p - mean).abs() > OUTLIER_SIGMA * std_dev)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: i64, date: &str, popularity: f64) -> Value {
        json!({
            "id": id,
            "title": format!("Movie {id}"),
            "release_date": date,
            "popularity": popularity,
            "overview": "…",
            "vote_average": 7.0,
            "vote_count": 10,
            "genre_ids": [28]
        })
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 31).unwrap()
    }

    #[test]
    fn counts_missing_values_per_column() {
        let rows = vec![row(1, "2020-01-01", 1.0), json!({"id": 2, "title": null})];
        let report = clean_rows("popular_movies", rows, today()).unwrap();
        assert_eq!(report.missing["title"], 1);
        assert_eq!(report.missing["release_date"], 1);
        assert_eq!(report.missing["id"], 0);
    }

    #[test]
    fn drops_exact_duplicates_only() {
        let rows = vec![
            row(1, "2020-01-01", 1.0),
            row(1, "2020-01-01", 1.0),
            row(1, "2020-01-01", 2.0),
        ];
        let report = clean_rows("popular_movies", rows, today()).unwrap();
        assert_eq!(report.duplicates_dropped, 1);
        assert_eq!(report.kept, 2);
    }

    #[test]
    fn future_dates_are_reported_and_horizon_enforced() {
        let rows = vec![
            row(1, "2020-01-01", 1.0),
            row(2, "2027-06-01", 1.0),  // future, plausible
            row(3, "2099-01-01", 1.0),  // beyond the horizon
            row(4, "not-a-date", 1.0),  // unparseable
        ];
        let report = clean_rows("upcoming_movies", rows, today()).unwrap();
        assert_eq!(report.future_dated, 1);
        assert_eq!(report.invalid_dates_dropped, 2);
        assert_eq!(report.kept, 2);
    }

    #[test]
    fn flags_popularity_outliers() {
        let mut rows: Vec<Value> = (1..=40).map(|id| row(id, "2020-01-01", 10.0)).collect();
        rows.push(row(99, "2020-01-01", 10_000.0));
        let report = clean_rows("popular_movies", rows, today()).unwrap();
        assert_eq!(report.popularity_outliers.len(), 1);
        assert_eq!(report.popularity_outliers[0].0, Some(99));
    }

    #[test]
    fn uniform_popularity_has_no_outliers() {
        let rows: Vec<Value> = (1..=5).map(|id| row(id, "2020-01-01", 10.0)).collect();
        let report = clean_rows("popular_movies", rows, today()).unwrap();
        assert!(report.popularity_outliers.is_empty());
    }
}
