use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

const CONFIG_PATH: &str = "config.toml";
const API_KEY_VAR: &str = "TMDB_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the per-stream raw JSON artifacts.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Durable watermark file used for incremental extraction.
    #[serde(default = "default_watermark_file")]
    pub watermark_file: String,
    /// SQLite database the load step writes into.
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

fn default_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_watermark_file() -> String {
    "data/watermarks.json".to_string()
}

fn default_database_file() -> String {
    "data/movies.db".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            watermark_file: default_watermark_file(),
            database_file: default_database_file(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self> {
        if !Path::new(CONFIG_PATH).exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(CONFIG_PATH).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{CONFIG_PATH}': {e}"))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Read the bearer token from the environment (a `.env` file is honored).
    pub fn api_key() -> Result<String> {
        dotenv::dotenv().ok();
        std::env::var(API_KEY_VAR).map_err(|_| {
            EtlError::Config(format!(
                "TMDB API key not found; set {API_KEY_VAR} in the environment or .env"
            ))
        })
    }
}
