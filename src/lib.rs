pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod paginator;
pub mod pipeline;
pub mod records;
pub mod sink;
pub mod streams;
pub mod transform;
pub mod watermark;
