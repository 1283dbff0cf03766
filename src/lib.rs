//! feedwarden keeps an OPML subscription list healthy.
//!
//! Loading a document validates every feed URL concurrently, archives the
//! ones that fail, drops duplicates, and guesses a genre for feeds that do
//! not have one yet. Edits (genre changes, deletions) are written back as
//! OPML, with deleted and invalid feeds kept in their own archive documents.

pub mod config;
pub mod feed;
pub mod manager;
pub mod session;
pub mod types;
pub mod util;

pub use config::{Config, ConfigError};
pub use manager::{DocumentState, FeedManager, LoadReport, ManagerConfig, ManagerError};
pub use types::{Feed, FeedKey, Genre};
