use thiserror::Error;

/// Failure of one fetch: the whole document is unusable.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Feed parse error: {0}")]
    Parse(String),
}

/// Failure of a single feed entry. The entry is skipped, the rest of the
/// document is still processed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryParseError {
    #[error("entry has no guid")]
    MissingGuid,

    #[error("unparseable publish date: {raw:?}")]
    InvalidDate { raw: String },

    #[error("entry has no publish date")]
    MissingDate,
}

pub type Result<T> = std::result::Result<T, FetchError>;
