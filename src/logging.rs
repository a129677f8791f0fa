use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Set up tracing with a human-readable console layer and a JSON file layer
/// under `logs/`, rotated daily. Honors `RUST_LOG` for overrides.
pub fn init_logging() {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "tmdb_etl.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::from_default_env().add_directive("tmdb_etl=info".parse().unwrap());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();

    // Leak the guard so buffered log lines are flushed for the process lifetime
    std::mem::forget(guard);
}
