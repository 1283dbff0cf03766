use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Identity Key
// ============================================================================

/// Stable identity of a feed: the SHA-256 digest of its URL.
///
/// Two feeds share a key exactly when their URLs are byte-identical, so the
/// key is case- and scheme-sensitive just like the URL it was derived from.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedKey([u8; 32]);

impl FeedKey {
    pub fn for_url(url: &str) -> Self {
        let digest = Sha256::digest(url.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// First 8 hex characters, enough to tell feeds apart in log lines.
    pub fn short(&self) -> String {
        self.to_string()[..8].to_string()
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Feed key must be 64 hex characters, got '{0}'")]
pub struct ParseKeyError(String);

impl FromStr for FeedKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 64 || !s.is_ascii() {
            return Err(ParseKeyError(s.to_string()));
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseKeyError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Debug for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedKey({})", self.short())
    }
}

// ============================================================================
// Genre
// ============================================================================

/// Topic label attached to a feed.
///
/// The fixed labels are the ones the classifier and the genre editor know
/// about. Categories outside that set survive a load/save cycle as
/// [`Genre::Custom`] but can never be assigned through [`Genre::parse_recognized`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Genre {
    News,
    Technology,
    Science,
    Entertainment,
    Sports,
    #[default]
    Other,
    /// Terminal state for feeds that keep failing health checks.
    Dead,
    Custom(String),
}

impl Genre {
    /// Every label a user may assign, in menu order.
    pub const RECOGNIZED: &'static [Genre] = &[
        Genre::Dead,
        Genre::Entertainment,
        Genre::News,
        Genre::Other,
        Genre::Science,
        Genre::Sports,
        Genre::Technology,
    ];

    /// Maps a document category onto a genre. Blank categories become `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "" | "Other" => Genre::Other,
            "News" => Genre::News,
            "Technology" => Genre::Technology,
            "Science" => Genre::Science,
            "Entertainment" => Genre::Entertainment,
            "Sports" => Genre::Sports,
            "Dead" => Genre::Dead,
            custom => Genre::Custom(custom.to_string()),
        }
    }

    /// Like [`Genre::from_label`] but rejects anything outside the fixed set.
    pub fn parse_recognized(label: &str) -> Option<Self> {
        Some(Self::from_label(label)).filter(Genre::is_recognized)
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Genre::Custom(_))
    }

    pub fn label(&self) -> &str {
        match self {
            Genre::News => "News",
            Genre::Technology => "Technology",
            Genre::Science => "Science",
            Genre::Entertainment => "Entertainment",
            Genre::Sports => "Sports",
            Genre::Other => "Other",
            Genre::Dead => "Dead",
            Genre::Custom(label) => label,
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Feed
// ============================================================================

/// One subscription in a feed list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub title: String,
    pub url: String,
    pub genre: Genre,
    pub description: String,
    /// Set only on copies that live in the deleted archive.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Feed {
    pub fn new(title: impl Into<String>, url: impl Into<String>, genre: Genre) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            genre,
            description: String::new(),
            deleted_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn key(&self) -> FeedKey {
        FeedKey::for_url(&self.url)
    }
}
