//! `podcast-core`: configuration and shared error type for the podcast
//! ingestion service.

pub mod config;
pub mod error;

pub use config::PodcastsConfig;
pub use error::{CoreError, Result};
