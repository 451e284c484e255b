//! `podcast-feeds`: fetches RSS / Atom feeds and turns them into a
//! [`FeedDocument`].
//!
//! The fetcher performs exactly one HTTP GET per call and never retries;
//! a failed fetch surfaces as [`FetchError`] and the caller (a scheduled job)
//! simply tries again on its next tick.

pub mod client;
pub mod date;
pub mod error;
pub mod models;
pub mod parser;

pub use client::{FeedFetcher, HttpFeedFetcher};
pub use date::parse_pub_date;
pub use error::{EntryParseError, FetchError, Result};
pub use models::{Channel, FeedDocument, FeedEntry};
pub use parser::parse_feed;
