use anyhow::{Context, Result};
use std::time::Duration;

use crate::feed::parser::{parse_feed, ParsedEntry};
use crate::feed::validator::{fetch_feed_bytes, ValidatorConfig};
use crate::types::Genre;
use crate::util::check_feed_url;

/// How many of a feed's newest entries feed the keyword scorer.
const SAMPLE_ENTRIES: usize = 5;

/// Keyword lists per genre. Table order is also the tie-break order.
static GENRE_KEYWORDS: &[(Genre, &[&str])] = &[
    (
        Genre::Technology,
        &["tech", "programming", "software", "hardware", "ai", "code"],
    ),
    (
        Genre::Science,
        &["science", "research", "study", "discovery", "space", "physics"],
    ),
    (
        Genre::News,
        &["news", "politics", "world", "breaking", "report"],
    ),
    (
        Genre::Entertainment,
        &["movie", "music", "celebrity", "entertainment", "film"],
    ),
    (
        Genre::Sports,
        &["sports", "game", "player", "team", "score", "match"],
    ),
];

/// Lowercased title and summary text of the first entries, the scorer's input.
pub fn sample_text(entries: &[ParsedEntry]) -> String {
    entries
        .iter()
        .take(SAMPLE_ENTRIES)
        .map(|e| format!("{} {}", e.title, e.summary))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Scores `text` against each genre's keywords and returns the winner.
///
/// A keyword counts once no matter how often it occurs, and matches as a
/// plain substring (`"ai"` matches inside `"daily"`). Ties go to the genre
/// listed first; no match at all yields [`Genre::Other`].
pub fn classify_text(text: &str) -> Genre {
    let mut best: Option<(&Genre, usize)> = None;

    for (genre, keywords) in GENRE_KEYWORDS {
        let score = keywords.iter().filter(|kw| text.contains(*kw)).count();
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((genre, score));
        }
    }

    best.map(|(genre, _)| genre.clone()).unwrap_or(Genre::Other)
}

/// Guesses feed genres from their recent articles.
#[derive(Debug, Clone)]
pub struct GenreClassifier {
    client: reqwest::Client,
    timeout: Duration,
}

impl GenreClassifier {
    pub fn new(client: reqwest::Client, config: &ValidatorConfig) -> Self {
        Self {
            client,
            timeout: config.timeout,
        }
    }

    /// Fetches the feed at `url` and classifies its first few entries.
    ///
    /// Never fails: an unreachable or unparsable feed is `Other`.
    pub async fn guess_genre(&self, url: &str) -> Genre {
        match self.fetch_entries(url).await {
            Ok(entries) => {
                let genre = classify_text(&sample_text(&entries));
                tracing::debug!(url = %url, genre = %genre, "Classified feed");
                genre
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Error guessing genre");
                Genre::Other
            }
        }
    }

    /// The newest `limit` entries of a feed, in document order.
    pub async fn latest_articles(&self, url: &str, limit: usize) -> Result<Vec<ParsedEntry>> {
        let mut entries = self.fetch_entries(url).await?;
        entries.truncate(limit);
        Ok(entries)
    }

    async fn fetch_entries(&self, url: &str) -> Result<Vec<ParsedEntry>> {
        check_feed_url(url)?;
        let bytes = fetch_feed_bytes(&self.client, url, self.timeout)
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        let feed = parse_feed(&bytes).with_context(|| format!("Failed to parse {}", url))?;
        Ok(feed.entries)
    }
}
