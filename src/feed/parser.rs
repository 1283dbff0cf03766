use anyhow::Result;
use chrono::{DateTime, Utc};
use feed_rs::parser;

/// What the pipeline needs from a parsed RSS/Atom document.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    /// Empty when the entry has no title.
    pub title: String,
    /// RSS `description` or Atom `summary`, falling back to the content body.
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
}

/// Parses RSS or Atom bytes.
///
/// A successful parse always carries both feed-level metadata and an entry
/// list (possibly empty), so `Ok` is exactly the "well-formed feed" test the
/// validator needs. Anything `feed-rs` rejects is an error.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed> {
    let feed = parser::parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();

            ParsedEntry {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                summary,
                published: entry.published.or(entry.updated),
            }
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content),
        entries,
    })
}
