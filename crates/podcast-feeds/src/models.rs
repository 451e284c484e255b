use serde::{Deserialize, Serialize};

/// Channel-level metadata shared by every entry of a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub title: String,
    /// Podcast artwork. Entries in these feeds carry no image of their own.
    pub image_url: Option<String>,
}

/// One `<item>` (RSS) or `<entry>` (Atom), fields kept as raw strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub guid: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Publish date exactly as the feed wrote it; see [`crate::parse_pub_date`].
    pub published_at: Option<String>,
    pub link: Option<String>,
}

/// A parsed feed. Lives for a single fetch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDocument {
    pub channel: Channel,
    /// Entries in document order.
    pub entries: Vec<FeedEntry>,
}
