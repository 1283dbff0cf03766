//! The feed list and its lifecycle.
//!
//! A [`FeedManager`] owns one active feed list. Loading a document validates
//! every entry; failures are copied to the invalid archive with the reason
//! attached, duplicates are dropped, and the rest become the active list.
//! Deletions move feeds into the deleted archive. Both archives are ordinary
//! OPML documents.
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::{
    encode, group_by_genre, read_document, write_document, DocumentError, FeedValidator,
    GenreClassifier, ValidatorConfig,
};
use crate::types::{Feed, FeedKey, Genre};

pub const ACTIVE_DOCUMENT_TITLE: &str = "RSS Feeds";
pub const INVALID_DOCUMENT_TITLE: &str = "Invalid RSS Feeds - Grouped by Original Category";
pub const DELETED_DOCUMENT_TITLE: &str = "Deleted RSS Feeds";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ManagerError {
    /// The source document could not be read or decoded at all.
    #[error("Failed to load '{}': {source}", .path.display())]
    DocumentLoad {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    /// An operation named a feed that is not in the active list.
    #[error("No feed with key {0}")]
    UnknownFeed(FeedKey),

    /// Encoding or writing a document failed.
    #[error("Failed to persist document: {0:#}")]
    Persist(#[from] anyhow::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

// ============================================================================
// Configuration and Reports
// ============================================================================

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub validator: ValidatorConfig,
    pub deleted_archive: PathBuf,
    pub invalid_archive: PathBuf,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            validator: ValidatorConfig::default(),
            deleted_archive: PathBuf::from("deleted_feeds.opml"),
            invalid_archive: PathBuf::from("invalid_feeds.opml"),
        }
    }
}

/// Where the active list stands relative to its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Unloaded,
    /// Identical to the document it was loaded from.
    Loaded,
    /// Changed in memory since the last load or save.
    Modified,
    Saved,
}

/// Summary of a [`FeedManager::load_document`] run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// Feeds admitted to the active list.
    pub valid: usize,
    /// Invalid URL → reason, as written to the invalid archive.
    pub invalid: BTreeMap<String, String>,
    /// Valid entries dropped because their URL was already in the list.
    pub duplicates_removed: usize,
}

// ============================================================================
// Feed Manager
// ============================================================================

pub struct FeedManager {
    config: ManagerConfig,
    validator: FeedValidator,
    classifier: GenreClassifier,
    /// Insertion order is document order; lookups go through `FeedKey`.
    feeds: Vec<Feed>,
    /// `keys[i]` is `feeds[i].key()`, computed once when the feed enters the list.
    keys: Vec<FeedKey>,
    state: DocumentState,
}

impl FeedManager {
    pub fn new(config: ManagerConfig) -> Result<Self, ManagerError> {
        let client = config.validator.build_client()?;
        let validator = FeedValidator::with_client(client.clone(), config.validator.clone());
        let classifier = GenreClassifier::new(client, &config.validator);

        Ok(Self {
            config,
            validator,
            classifier,
            feeds: Vec::new(),
            keys: Vec::new(),
            state: DocumentState::Unloaded,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn classifier(&self) -> &GenreClassifier {
        &self.classifier
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn get(&self, key: &FeedKey) -> Option<&Feed> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|index| &self.feeds[index])
    }

    fn position(&self, key: &FeedKey) -> Result<usize, ManagerError> {
        self.keys
            .iter()
            .position(|k| k == key)
            .ok_or(ManagerError::UnknownFeed(*key))
    }

    fn replace_feeds(&mut self, feeds: Vec<Feed>) {
        self.keys = feeds.iter().map(Feed::key).collect();
        self.feeds = feeds;
    }

    fn mark_modified(&mut self) {
        self.state = DocumentState::Modified;
    }

    /// Loads `path`, replacing the active list.
    ///
    /// Every entry is validated concurrently. Valid feeds become the active
    /// list in document order, then duplicates are removed. Invalid feeds are
    /// written, grouped by their original category, to the invalid archive
    /// with the failure reason appended to their description.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::DocumentLoad`] if `path` cannot be read or decoded
    /// - [`ManagerError::Persist`] if the invalid archive cannot be written;
    ///   the active list is left as it was
    ///
    /// Individual feeds failing validation is never an error. The state ends
    /// up [`DocumentState::Modified`] when invalid feeds or duplicates were
    /// dropped, so the cleaned list is offered for saving.
    pub async fn load_document(&mut self, path: &Path) -> Result<LoadReport, ManagerError> {
        let drafts = read_document(path)
            .await
            .map_err(|source| ManagerError::DocumentLoad {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(path = %path.display(), entries = drafts.len(), "Validating feeds");
        let results = self
            .validator
            .validate_many(drafts.iter().map(|d| d.url.clone()))
            .await;

        let mut active = Vec::new();
        let mut invalid_feeds = Vec::new();
        let mut invalid = BTreeMap::new();

        for draft in drafts {
            let reason = match results.get(&draft.url) {
                Some(result) if result.valid => None,
                Some(result) => Some(
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| "Unknown error".to_string()),
                ),
                None => Some("Unknown error".to_string()),
            };

            let feed = draft.into_feed();
            match reason {
                None => active.push(feed),
                Some(reason) => {
                    if invalid.contains_key(&feed.url) {
                        continue;
                    }
                    invalid_feeds.push(annotate_invalid(feed.clone(), &reason));
                    invalid.insert(feed.url, reason);
                }
            }
        }

        if !invalid_feeds.is_empty() {
            let content = encode(&group_by_genre(&invalid_feeds), INVALID_DOCUMENT_TITLE)?;
            write_document(&self.config.invalid_archive, &content)?;
            tracing::info!(
                path = %self.config.invalid_archive.display(),
                count = invalid_feeds.len(),
                "Saved invalid feeds"
            );
        }

        self.replace_feeds(active);
        let duplicates_removed = self.remove_duplicates();
        // A list that lost entries no longer matches the file on disk
        self.state = if invalid.is_empty() && duplicates_removed == 0 {
            DocumentState::Loaded
        } else {
            DocumentState::Modified
        };

        tracing::info!(valid = self.feeds.len(), "Loaded valid feeds");
        if !invalid.is_empty() {
            tracing::warn!(invalid = invalid.len(), "Found invalid feeds");
        }

        Ok(LoadReport {
            valid: self.feeds.len(),
            invalid,
            duplicates_removed,
        })
    }

    /// Appends a feed to the active list. Duplicates are allowed until the
    /// next [`dedupe`](Self::dedupe).
    pub fn add_feed(&mut self, feed: Feed) -> FeedKey {
        let key = feed.key();
        self.keys.push(key);
        self.feeds.push(feed);
        self.mark_modified();
        key
    }

    /// Removes every feed whose URL already appeared earlier in the list.
    /// Returns how many were removed; a second call always returns 0.
    pub fn dedupe(&mut self) -> usize {
        let removed = self.remove_duplicates();
        if removed > 0 {
            self.mark_modified();
        }
        removed
    }

    fn remove_duplicates(&mut self) -> usize {
        let before = self.feeds.len();
        let mut seen = HashSet::new();
        // Equal keys mean byte-identical URLs
        let (keys, feeds): (Vec<FeedKey>, Vec<Feed>) = std::mem::take(&mut self.keys)
            .into_iter()
            .zip(std::mem::take(&mut self.feeds))
            .filter(|(key, _)| seen.insert(*key))
            .unzip();
        self.keys = keys;
        self.feeds = feeds;
        let removed = before - self.feeds.len();
        if removed > 0 {
            tracing::info!(removed = removed, "Removed duplicate feeds");
        }
        removed
    }

    /// Changes a feed's genre.
    ///
    /// Labels outside [`Genre::RECOGNIZED`] are ignored and `Ok(false)` is
    /// returned, so callers must check the label themselves if they care.
    pub fn set_genre(&mut self, key: &FeedKey, label: &str) -> Result<bool, ManagerError> {
        let index = self.position(key)?;
        let Some(genre) = Genre::parse_recognized(label) else {
            tracing::debug!(label = %label, "Ignoring unrecognized genre");
            return Ok(false);
        };

        self.feeds[index].genre = genre;
        self.mark_modified();
        Ok(true)
    }

    /// Moves a feed from the active list to the deleted archive.
    ///
    /// The archive is rewritten first; only once that succeeds is the feed
    /// removed from the active list. A missing archive starts empty; an
    /// unreadable one is set aside and replaced. Returns the archived copy.
    pub async fn move_to_deleted(&mut self, key: &FeedKey) -> Result<Feed, ManagerError> {
        let index = self.position(key)?;

        let archive_path = self.config.deleted_archive.clone();
        let mut archived = load_archive(&archive_path).await;

        let mut deleted = self.feeds[index].clone();
        deleted.deleted_at = Some(Utc::now());
        archived.push(deleted.clone());

        let content = encode(&group_by_genre(&archived), DELETED_DOCUMENT_TITLE)?;
        write_document(&archive_path, &content)?;

        self.feeds.remove(index);
        self.keys.remove(index);
        self.mark_modified();
        tracing::info!(title = %deleted.title, key = %key.short(), "Moved feed to deleted feeds");
        Ok(deleted)
    }

    /// Writes the active list, grouped by genre, to `path`.
    pub fn save(&mut self, path: &Path) -> Result<(), ManagerError> {
        let content = encode(&group_by_genre(&self.feeds), ACTIVE_DOCUMENT_TITLE)?;
        write_document(path, &content)?;
        self.state = DocumentState::Saved;
        tracing::info!(path = %path.display(), feeds = self.feeds.len(), "Saved feed list");
        Ok(())
    }

    /// Guesses a genre for every feed still labelled `Other`.
    ///
    /// Feeds are classified concurrently under the same cap as validation.
    /// Returns how many feeds received a more specific genre.
    pub async fn classify_unknown(&mut self) -> usize {
        // Indices stay valid: the list cannot change while `&mut self` is held
        let pending: Vec<(usize, String)> = self
            .feeds
            .iter()
            .enumerate()
            .filter(|(_, f)| f.genre == Genre::Other)
            .map(|(index, f)| (index, f.url.clone()))
            .collect();

        if pending.is_empty() {
            return 0;
        }

        let classifier = &self.classifier;
        let guesses: Vec<(usize, Genre)> = stream::iter(pending)
            .map(|(index, url)| async move { (index, classifier.guess_genre(&url).await) })
            .buffer_unordered(self.config.validator.max_concurrent.max(1))
            .collect()
            .await;

        let mut changed = 0;
        for (index, genre) in guesses {
            if genre != Genre::Other {
                self.feeds[index].genre = genre;
                changed += 1;
            }
        }

        if changed > 0 {
            self.mark_modified();
        }
        tracing::info!(classified = changed, "Classified feeds");
        changed
    }

    /// Re-validates the active list and labels failing feeds `Dead`.
    ///
    /// Dead feeds stay in the list so they can be reviewed and deleted.
    /// Returns how many feeds were newly marked.
    pub async fn check_health(&mut self) -> usize {
        let results = self
            .validator
            .validate_many(self.feeds.iter().map(|f| f.url.clone()))
            .await;

        let mut marked = 0;
        for feed in &mut self.feeds {
            let healthy = results.get(&feed.url).map_or(false, |r| r.valid);
            if !healthy && feed.genre != Genre::Dead {
                tracing::info!(title = %feed.title, "Marked feed as dead");
                feed.genre = Genre::Dead;
                marked += 1;
            }
        }

        if marked > 0 {
            self.mark_modified();
        }
        marked
    }
}

fn annotate_invalid(mut feed: Feed, reason: &str) -> Feed {
    feed.description = if feed.description.is_empty() {
        format!("Validation Error: {}", reason)
    } else {
        format!("{}\nValidation Error: {}", feed.description, reason)
    };
    feed
}

/// Reads the deleted archive. Never fails: a missing archive is empty, and an
/// undecodable one is renamed aside so the rewrite does not destroy it.
async fn load_archive(path: &Path) -> Vec<Feed> {
    match read_document(path).await {
        Ok(drafts) => drafts.into_iter().map(|d| d.into_feed()).collect(),
        Err(DocumentError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No deleted archive yet");
            Vec::new()
        }
        Err(e) => {
            let aside = path.with_extension(format!(
                "opml.corrupt.{}",
                Utc::now().format("%Y%m%d_%H%M%S")
            ));
            tracing::warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                error = %e,
                "Deleted archive unreadable, starting a new one"
            );
            if let Err(rename_err) = std::fs::rename(path, &aside) {
                tracing::warn!(error = %rename_err, "Failed to set aside unreadable archive");
            }
            Vec::new()
        }
    }
}
