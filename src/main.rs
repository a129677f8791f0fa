use clap::{Parser, Subcommand};
use tracing::{error, info};

mod config;
mod db;
mod error;
mod fetcher;
mod logging;
mod paginator;
mod pipeline;
mod records;
mod sink;
mod streams;
mod transform;
mod watermark;

use crate::config::Config;
use crate::fetcher::TmdbClient;
use crate::pipeline::{run_extraction, run_load, run_transform, RunSummary};

#[derive(Parser)]
#[command(name = "tmdb_etl")]
#[command(about = "Movie metadata extraction, load, and cleaning pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract streams from the API into raw JSON artifacts
    Extract {
        /// Specific streams to pull (comma-separated). Available:
        /// popular_movies, top_rated_movies, upcoming_movies, movie_genres,
        /// credits (all credits sub-streams)
        #[arg(long)]
        streams: Option<String>,
    },
    /// Load the movie streams' raw artifacts into SQLite
    Load,
    /// Run the cleaning pass over raw artifacts
    Transform {
        /// Streams to clean (comma-separated). Defaults to popular_movies
        #[arg(long)]
        streams: Option<String>,
    },
    /// Run extract then load sequentially
    Run {
        /// Specific streams to pull (comma-separated)
        #[arg(long)]
        streams: Option<String>,
    },
}

fn parse_stream_list(streams: Option<String>) -> Option<Vec<String>> {
    streams.map(|list| list.split(',').map(|s| s.trim().to_string()).collect())
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Extraction results (run {}):", summary.run_id);
    println!("   Streams: {}", summary.streams.len());
    println!("   Records: {}", summary.total_records());
    println!("   Failed streams: {}", summary.failed_streams());
    for result in &summary.streams {
        match &result.error {
            Some(e) => println!("   ❌ {}: {}", result.stream, e),
            None if result.records > 0 => println!(
                "   ✅ {}: {} records over {} pages (watermark: {})",
                result.stream,
                result.records,
                result.pages,
                result.watermark.as_deref().unwrap_or("none")
            ),
            None => {}
        }
    }
}

async fn connect(config: &Config) -> Result<TmdbClient, Box<dyn std::error::Error>> {
    let client = TmdbClient::new(&config.api, Config::api_key()?)?;
    match client.check_connection().await {
        Ok(()) => {
            println!("✅ Connection successful!");
            Ok(client)
        }
        Err(e) => {
            error!("Connection check failed: {e}");
            println!("❌ Connection failed: {e}");
            Err(e.into())
        }
    }
}

async fn extract(
    config: &Config,
    streams: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = connect(config).await?;
    let filter = parse_stream_list(streams);
    let summary = run_extraction(&client, &config.storage, filter.as_deref()).await?;
    print_summary(&summary);
    Ok(())
}

fn load(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let summaries = run_load(&config.storage)?;
    println!("\n📦 Load results:");
    if summaries.is_empty() {
        println!("   Nothing to load — run `tmdb_etl extract` first");
    }
    for summary in summaries {
        println!(
            "   {}: {} read, {} inserted ({} duplicates ignored)",
            summary.stream,
            summary.read,
            summary.inserted,
            summary.read - summary.inserted
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Extract { streams } => {
            println!("🔄 Running extraction...");
            extract(&config, streams).await?;
        }
        Commands::Load => {
            println!("📦 Loading raw artifacts into SQLite...");
            load(&config)?;
        }
        Commands::Transform { streams } => {
            println!("🧹 Running cleaning pass...");
            let streams = parse_stream_list(streams)
                .unwrap_or_else(|| vec![streams::POPULAR_MOVIES.to_string()]);
            for report in run_transform(&config.storage, &streams)? {
                println!("\n🧾 Cleaning report for {}:", report.stream);
                println!("   Rows: {} ({} kept)", report.rows, report.kept);
                println!("   Duplicates dropped: {}", report.duplicates_dropped);
                println!(
                    "   Future-dated: {} (beyond horizon/invalid dropped: {})",
                    report.future_dated, report.invalid_dates_dropped
                );
                let missing: Vec<String> = report
                    .missing
                    .iter()
                    .filter(|(_, &count)| count > 0)
                    .map(|(column, count)| format!("{column}={count}"))
                    .collect();
                if !missing.is_empty() {
                    println!("   Missing values: {}", missing.join(", "));
                }
                for (id, popularity) in &report.popularity_outliers {
                    println!(
                        "   ⚠️  Popularity outlier: movie {} at {popularity}",
                        id.map_or_else(|| "?".to_string(), |id| id.to_string())
                    );
                }
            }
        }
        Commands::Run { streams } => {
            println!("🚀 Running full pipeline (extract + load)...");
            extract(&config, streams).await?;
            load(&config)?;
            info!("Full pipeline run complete");
        }
    }
    Ok(())
}
