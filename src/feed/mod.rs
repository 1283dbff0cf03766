//! Everything that touches feed documents or feed URLs.
//!
//! - [`opml`] - OPML decode/encode and atomic document writes
//! - [`parser`] - RSS/Atom parsing via `feed-rs`
//! - [`validator`] - bounded-retry, concurrent feed validation
//! - [`genre`] - keyword-based genre guessing
//!
//! # Example
//!
//! ```ignore
//! use feedwarden::feed::{read_document, FeedValidator, ValidatorConfig};
//!
//! let drafts = read_document(path).await?;
//! let validator = FeedValidator::new(ValidatorConfig::default())?;
//! let results = validator.validate_many(drafts.iter().map(|d| d.url.clone())).await;
//! ```

pub mod genre;
pub mod opml;
pub mod parser;
pub mod validator;

pub use genre::{classify_text, GenreClassifier};
pub use opml::{
    decode, encode, encode_at, group_by_genre, read_document, write_document, DocumentError,
    FeedDraft,
};
pub use parser::{parse_feed, ParsedEntry, ParsedFeed};
pub use validator::{
    FeedValidator, ValidationResult, ValidatorConfig, DEFAULT_USER_AGENT, MAX_ATTEMPTS,
};
