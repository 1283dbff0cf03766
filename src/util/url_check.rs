use thiserror::Error;
use url::Url;

/// Reasons a feed URL is rejected before any request is made.
#[derive(Error, Debug)]
pub enum UrlCheckError {
    /// No scheme, e.g. `example.com/feed.xml`.
    #[error("URL has no scheme: {0}")]
    MissingScheme(String),
    /// Parsed, but there is no authority to connect to (`mailto:`, `file:///`).
    #[error("URL has no host: {0}")]
    MissingHost(String),
    #[error("Invalid URL: {0}")]
    Parse(url::ParseError),
}

/// Checks that `url_str` has both a scheme and a host.
///
/// This is deliberately structural only: scheme and host are not restricted,
/// so a feed served from an intranet host validates like any other.
///
/// ```
/// use feedwarden::util::check_feed_url;
///
/// assert!(check_feed_url("https://example.com/feed.xml").is_ok());
/// assert!(check_feed_url("invalid-url").is_err());
/// assert!(check_feed_url("mailto:someone@example.com").is_err());
/// ```
pub fn check_feed_url(url_str: &str) -> Result<Url, UrlCheckError> {
    let url = Url::parse(url_str.trim()).map_err(|e| match e {
        url::ParseError::RelativeUrlWithoutBase => {
            UrlCheckError::MissingScheme(url_str.to_string())
        }
        other => UrlCheckError::Parse(other),
    })?;

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlCheckError::MissingHost(url_str.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(check_feed_url("https://example.com/feed.xml").is_ok());
        assert!(check_feed_url("http://news.example.org").is_ok());
        assert!(check_feed_url("http://127.0.0.1:8080/rss").is_ok());
    }

    #[test]
    fn test_special_characters_accepted() {
        assert!(check_feed_url("http://example.com/feed?param=value&other=äöü").is_ok());
    }

    #[test]
    fn test_missing_scheme() {
        assert!(matches!(
            check_feed_url("invalid-url"),
            Err(UrlCheckError::MissingScheme(_))
        ));
        assert!(matches!(
            check_feed_url("example.com/feed.xml"),
            Err(UrlCheckError::MissingScheme(_))
        ));
    }

    #[test]
    fn test_missing_host() {
        assert!(matches!(
            check_feed_url("mailto:editor@example.com"),
            Err(UrlCheckError::MissingHost(_))
        ));
        assert!(matches!(
            check_feed_url("file:///etc/passwd"),
            Err(UrlCheckError::MissingHost(_))
        ));
    }

    #[test]
    fn test_empty_string_rejected() {
        assert!(check_feed_url("").is_err());
        assert!(check_feed_url("   ").is_err());
    }
}
