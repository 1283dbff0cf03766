//! Utility functions shared by the pipeline and the interactive session.
//!
//! - **URL checks**: the structural test every feed URL must pass before any
//!   network traffic is spent on it
//! - **Text**: terminal-safe rendering of untrusted feed titles in tables

mod text;
mod url_check;

pub use text::{fit_to_width, strip_control_chars};
pub use url_check::{check_feed_url, UrlCheckError};
