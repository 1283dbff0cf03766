use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::feed::parser::parse_feed;
use crate::util::check_feed_url;

/// Attempts per URL before a feed is declared invalid.
pub const MAX_ATTEMPTS: u32 = 2;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_REDIRECTS: usize = 10;

pub const DEFAULT_USER_AGENT: &str = concat!(
    "feedwarden/",
    env!("CARGO_PKG_VERSION"),
    " (feed-validator)"
);

pub const INVALID_URL_REASON: &str = "Invalid URL format";
pub const UNEXPECTED_ERROR_REASON: &str = "Unexpected validation error";

/// Network policy shared by the validator and the genre classifier.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Bound on one whole attempt: connect, redirects, and body read.
    pub timeout: Duration,
    /// Pause between a failed first attempt and the second one.
    pub retry_delay: Duration,
    /// Most validations in flight at once.
    pub max_concurrent: usize,
    pub user_agent: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
            max_concurrent: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ValidatorConfig {
    /// Builds the HTTP client every request of this config goes through:
    /// fixed `User-Agent`, redirects followed.
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
    }
}

/// Outcome of validating one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    /// Human-readable reason, set only when `valid` is false.
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(reason.into()),
        }
    }
}

/// Why a single attempt failed. Logged, never returned to callers: the final
/// result only reports that attempts were exhausted.
#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    /// Network-level error (DNS, connection, TLS, too many redirects)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Any status other than 200 after redirects
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body is not RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
}

// ============================================================================
// Retry State Machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryStep {
    /// Wait this long, then make the next attempt.
    Backoff(Duration),
    Exhausted,
}

/// Attempt counter plus backoff policy for one URL.
#[derive(Debug)]
pub(crate) struct RetryState {
    attempts_made: u32,
    max_attempts: u32,
    delay: Duration,
}

impl RetryState {
    pub(crate) fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            attempts_made: 0,
            max_attempts,
            delay,
        }
    }

    /// Records the start of an attempt and returns its 1-based number.
    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempts_made += 1;
        self.attempts_made
    }

    /// Decides what follows a failed attempt.
    pub(crate) fn after_failure(&self) -> RetryStep {
        if self.attempts_made < self.max_attempts {
            RetryStep::Backoff(self.delay)
        } else {
            RetryStep::Exhausted
        }
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Checks that URLs serve well-formed RSS/Atom feeds.
#[derive(Debug, Clone)]
pub struct FeedValidator {
    client: reqwest::Client,
    config: ValidatorConfig,
}

impl FeedValidator {
    pub fn new(config: ValidatorConfig) -> reqwest::Result<Self> {
        let client = config.build_client()?;
        Ok(Self::with_client(client, config))
    }

    /// Uses an existing client. The client is expected to carry the
    /// configured `User-Agent` and redirect policy.
    pub fn with_client(client: reqwest::Client, config: ValidatorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validates one URL.
    ///
    /// URLs without a scheme or host fail with `"Invalid URL format"` and no
    /// request is made. Otherwise up to [`MAX_ATTEMPTS`] GET requests are
    /// issued, separated by the configured retry delay; the first attempt
    /// that returns HTTP 200 with a parsable feed body wins. Network errors
    /// never escape: every failure ends as an invalid result.
    pub async fn validate(&self, url: &str) -> ValidationResult {
        if let Err(e) = check_feed_url(url) {
            tracing::debug!(url = %url, error = %e, "Rejected feed URL without request");
            return ValidationResult::invalid(INVALID_URL_REASON);
        }

        let mut retry = RetryState::new(MAX_ATTEMPTS, self.config.retry_delay);
        loop {
            let attempt = retry.begin_attempt();
            let started = Instant::now();

            let error = match self.attempt(url).await {
                Ok(()) => {
                    tracing::debug!(url = %url, attempt = attempt, "Feed validated");
                    return ValidationResult::valid();
                }
                Err(e) => e,
            };

            if attempt == 1 {
                tracing::warn!(
                    url = %url,
                    error = %error,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "First validation attempt failed"
                );
            } else {
                tracing::debug!(url = %url, attempt = attempt, error = %error, "Validation attempt failed");
            }

            match retry.after_failure() {
                RetryStep::Backoff(delay) => tokio::time::sleep(delay).await,
                RetryStep::Exhausted => {
                    return ValidationResult::invalid(format!(
                        "Feed validation failed after {} attempts",
                        MAX_ATTEMPTS
                    ));
                }
            }
        }
    }

    /// Validates every URL concurrently and returns one result per distinct URL.
    ///
    /// At most `max_concurrent` validations run at once; the call returns when
    /// all of them have finished. Each URL is isolated from the others: even a
    /// panic inside one validation only turns that URL's result invalid.
    /// Dropping the returned future cancels every request still in flight.
    pub async fn validate_many<I, S>(&self, urls: I) -> HashMap<String, ValidationResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let unique: Vec<String> = urls
            .into_iter()
            .map(Into::into)
            .filter(|url| seen.insert(url.clone()))
            .collect();

        if unique.is_empty() {
            return HashMap::new();
        }

        let total = unique.len();
        let started = Instant::now();

        let results: HashMap<String, ValidationResult> = stream::iter(unique)
            .map(|url| async move {
                let result = catch_validation_panic(&url, self.validate(&url)).await;
                (url, result)
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        let invalid = results.values().filter(|r| !r.valid).count();
        tracing::info!(
            total = total,
            invalid = invalid,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Validated feeds"
        );

        results
    }

    async fn attempt(&self, url: &str) -> Result<(), AttemptError> {
        let bytes = fetch_feed_bytes(&self.client, url, self.config.timeout).await?;
        parse_feed(&bytes).map_err(|e| AttemptError::Parse(e.to_string()))?;
        Ok(())
    }
}

/// Awaits one validation, turning a panic inside it into an invalid result
/// for that URL alone.
pub(crate) async fn catch_validation_panic<F>(url: &str, validation: F) -> ValidationResult
where
    F: Future<Output = ValidationResult>,
{
    AssertUnwindSafe(validation)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            tracing::error!(url = %url, "Validation task panicked");
            ValidationResult::invalid(UNEXPECTED_ERROR_REASON)
        })
}

/// One GET request whose entire duration, body included, is bounded by `timeout`.
pub(crate) async fn fetch_feed_bytes(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, AttemptError> {
    tokio::time::timeout(timeout, fetch_once(client, url))
        .await
        .map_err(|_| AttemptError::Timeout)?
}

async fn fetch_once(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, AttemptError> {
    let response = client.get(url).send().await?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(AttemptError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, MAX_FEED_SIZE).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, AttemptError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(AttemptError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(AttemptError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{any, header, method, path};
    use std::sync::{Arc, Mutex};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test</title>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

    const EXHAUSTED: &str = "Feed validation failed after 2 attempts";

    fn test_validator(retry_delay: Duration) -> FeedValidator {
        FeedValidator::new(ValidatorConfig {
            timeout: Duration::from_secs(2),
            retry_delay,
            max_concurrent: 4,
            user_agent: "feedwarden-test/1.0".to_string(),
        })
        .unwrap()
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.map(|r| r.len()).unwrap_or(0)
    }

    #[test]
    fn test_retry_state_allows_one_backoff() {
        let mut retry = RetryState::new(2, Duration::from_millis(250));

        assert_eq!(retry.begin_attempt(), 1);
        assert_eq!(
            retry.after_failure(),
            RetryStep::Backoff(Duration::from_millis(250))
        );
        assert_eq!(retry.begin_attempt(), 2);
        assert_eq!(retry.after_failure(), RetryStep::Exhausted);
    }

    #[test]
    fn test_retry_state_single_attempt() {
        let mut retry = RetryState::new(1, Duration::from_secs(1));
        retry.begin_attempt();
        assert_eq!(retry.after_failure(), RetryStep::Exhausted);
    }

    #[tokio::test]
    async fn test_invalid_url_format_makes_no_request() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(0)
            .mount(&mock_server)
            .await;

        let validator = test_validator(Duration::from_millis(10));
        for url in ["invalid-url", "mailto:editor@example.com", "", "//no-scheme/feed"] {
            let result = validator.validate(url).await;
            assert_eq!(result, ValidationResult::invalid(INVALID_URL_REASON), "url: {url:?}");
        }
        assert_eq!(request_count(&mock_server).await, 0);
    }

    #[tokio::test]
    async fn test_valid_feed_single_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let validator = test_validator(Duration::from_millis(10));
        let result = validator
            .validate(&format!("{}/feed", mock_server.uri()))
            .await;

        assert_eq!(result, ValidationResult::valid());
        assert_eq!(request_count(&mock_server).await, 1);
    }

    #[tokio::test]
    async fn test_valid_atom_feed() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>A</title><id>urn:a</id>
<updated>2024-03-01T12:00:00Z</updated></feed>"#;

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(atom))
            .mount(&mock_server)
            .await;

        let result = test_validator(Duration::from_millis(10))
            .validate(&format!("{}/atom", mock_server.uri()))
            .await;
        assert!(result.valid);
    }

    #[tokio::test]
    async fn test_404_fails_after_two_attempts_with_delay() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&mock_server)
            .await;

        let delay = Duration::from_millis(300);
        let validator = test_validator(delay);
        let started = Instant::now();
        let result = validator
            .validate(&format!("{}/missing", mock_server.uri()))
            .await;

        assert_eq!(result, ValidationResult::invalid(EXHAUSTED));
        assert!(started.elapsed() >= delay, "retry delay not observed");
        assert_eq!(request_count(&mock_server).await, 2);
    }

    #[tokio::test]
    async fn test_malformed_body_fails_after_two_attempts() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .expect(2)
            .mount(&mock_server)
            .await;

        let result = test_validator(Duration::from_millis(10))
            .validate(&format!("{}/malformed", mock_server.uri()))
            .await;

        assert_eq!(result, ValidationResult::invalid(EXHAUSTED));
    }

    #[tokio::test]
    async fn test_empty_body_is_invalid() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&mock_server)
            .await;

        let result = test_validator(Duration::from_millis(10))
            .validate(&format!("{}/empty", mock_server.uri()))
            .await;
        assert!(!result.valid);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_timeout_on_both_attempts() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let validator = FeedValidator::new(ValidatorConfig {
            timeout: Duration::from_millis(200),
            retry_delay: Duration::from_millis(100),
            max_concurrent: 1,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
        .unwrap();

        let started = Instant::now();
        let result = validator
            .validate(&format!("{}/slow", mock_server.uri()))
            .await;

        assert_eq!(result, ValidationResult::invalid(EXHAUSTED));
        // Two timeouts plus the retry delay, well short of the server delay
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_connection_error_is_invalid() {
        // Bind and drop a listener to get a port nothing is listening on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let result = test_validator(Duration::from_millis(10))
            .validate(&format!("http://127.0.0.1:{}/feed", port))
            .await;
        assert_eq!(result, ValidationResult::invalid(EXHAUSTED));
    }

    #[tokio::test]
    async fn test_server_error_then_success() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let result = test_validator(Duration::from_millis(10))
            .validate(&format!("{}/flaky", mock_server.uri()))
            .await;

        assert_eq!(result, ValidationResult::valid());
        assert_eq!(request_count(&mock_server).await, 2);
    }

    #[tokio::test]
    async fn test_redirect_is_followed() {
        let mock_server = MockServer::start().await;
        Mock::given(path("/old"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("Location", format!("{}/new", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;
        Mock::given(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let result = test_validator(Duration::from_millis(10))
            .validate(&format!("{}/old", mock_server.uri()))
            .await;
        assert!(result.valid);
    }

    #[tokio::test]
    async fn test_sends_configured_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "feedwarden-test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = test_validator(Duration::from_millis(10))
            .validate(&format!("{}/ua", mock_server.uri()))
            .await;
        assert!(result.valid);
    }

    #[tokio::test]
    async fn test_validate_many_isolates_results() {
        let mock_server = MockServer::start().await;
        Mock::given(path("/good"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;
        Mock::given(path("/bad"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let good = format!("{}/good", mock_server.uri());
        let bad = format!("{}/bad", mock_server.uri());
        let urls = vec![
            good.clone(),
            bad.clone(),
            "invalid-url".to_string(),
            good.clone(),
        ];

        let results = test_validator(Duration::from_millis(10))
            .validate_many(urls)
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[&good], ValidationResult::valid());
        assert_eq!(results[&bad], ValidationResult::invalid(EXHAUSTED));
        assert_eq!(
            results["invalid-url"],
            ValidationResult::invalid(INVALID_URL_REASON)
        );
    }

    #[tokio::test]
    async fn test_validate_many_with_concurrency_of_one() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(5)
            .mount(&mock_server)
            .await;

        let validator = FeedValidator::new(ValidatorConfig {
            max_concurrent: 1,
            ..ValidatorConfig::default()
        })
        .unwrap();

        let urls: Vec<String> = (0..5)
            .map(|i| format!("{}/feed/{}", mock_server.uri(), i))
            .collect();
        let results = validator.validate_many(urls).await;

        assert_eq!(results.len(), 5);
        assert!(results.values().all(|r| r.valid));
    }

    /// Serves a valid feed after a fixed delay and records when each request
    /// arrived.
    struct DelayedFeed {
        delay: Duration,
        arrivals: Arc<Mutex<Vec<Instant>>>,
    }

    impl Respond for DelayedFeed {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            self.arrivals.lock().unwrap().push(Instant::now());
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .set_delay(self.delay)
        }
    }

    /// Most arrivals that fall inside any window of `width`.
    fn peak_arrivals(arrivals: &[Instant], width: Duration) -> usize {
        arrivals
            .iter()
            .map(|start| {
                arrivals
                    .iter()
                    .filter(|t| **t >= *start && t.duration_since(*start) < width)
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_validate_many_respects_concurrency_cap() {
        let mock_server = MockServer::start().await;
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        Mock::given(method("GET"))
            .respond_with(DelayedFeed {
                delay: Duration::from_millis(300),
                arrivals: Arc::clone(&arrivals),
            })
            .mount(&mock_server)
            .await;

        let validator = FeedValidator::new(ValidatorConfig {
            timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(10),
            max_concurrent: 2,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
        .unwrap();
        let urls: Vec<String> = (0..6)
            .map(|i| format!("{}/feed/{}", mock_server.uri(), i))
            .collect();

        let started = Instant::now();
        let results = validator.validate_many(urls).await;
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 6);
        assert!(results.values().all(|r| r.valid));

        // A request only starts once an earlier one has finished, so no two
        // batches of arrivals share a window shorter than the response delay.
        let arrivals = arrivals.lock().unwrap().clone();
        assert_eq!(arrivals.len(), 6);
        assert!(peak_arrivals(&arrivals, Duration::from_millis(250)) <= 2);
        // Six 300ms responses, two at a time
        assert!(elapsed >= Duration::from_millis(900), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_slow_feed_does_not_hold_up_fast_ones() {
        let mock_server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&mock_server)
            .await;

        let timeout = Duration::from_millis(300);
        let retry_delay = Duration::from_millis(100);
        let validator = FeedValidator::new(ValidatorConfig {
            timeout,
            retry_delay,
            max_concurrent: 2,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
        .unwrap();

        let slow = format!("{}/slow", mock_server.uri());
        let mut urls = vec![slow.clone()];
        urls.extend((0..6).map(|i| format!("{}/fast/{}", mock_server.uri(), i)));

        let started = Instant::now();
        let results = validator.validate_many(urls).await;
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 7);
        assert_eq!(results[&slow], ValidationResult::invalid(EXHAUSTED));
        assert_eq!(results.values().filter(|r| r.valid).count(), 6);
        // Bounded by the slow feed's two timeouts plus the pause between them
        let budget = timeout * 2 + retry_delay + Duration::from_millis(700);
        assert!(elapsed < budget, "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_dropping_validate_many_cancels_pending_requests() {
        let mock_server = MockServer::start().await;
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        Mock::given(method("GET"))
            .respond_with(DelayedFeed {
                delay: Duration::from_millis(400),
                arrivals: Arc::clone(&arrivals),
            })
            .mount(&mock_server)
            .await;

        let validator = FeedValidator::new(ValidatorConfig {
            timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(10),
            max_concurrent: 1,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
        .unwrap();
        let urls: Vec<String> = (0..3)
            .map(|i| format!("{}/feed/{}", mock_server.uri(), i))
            .collect();

        let outcome =
            tokio::time::timeout(Duration::from_millis(150), validator.validate_many(urls)).await;
        assert!(outcome.is_err());

        // Long enough for the remaining feeds to have been requested if the
        // batch were still running
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(arrivals.lock().unwrap().len(), 1);
        assert_eq!(request_count(&mock_server).await, 1);
    }

    #[tokio::test]
    async fn test_panic_during_validation_becomes_invalid_result() {
        let panicking = async {
            if UNEXPECTED_ERROR_REASON.is_empty() {
                return ValidationResult::valid();
            }
            panic!("parser blew up");
        };

        let result = catch_validation_panic("https://example.com/rss", panicking).await;
        assert_eq!(result, ValidationResult::invalid(UNEXPECTED_ERROR_REASON));

        let passed_through =
            catch_validation_panic("https://example.com/rss", async { ValidationResult::valid() })
                .await;
        assert_eq!(passed_through, ValidationResult::valid());
    }

    #[tokio::test]
    async fn test_validate_many_empty() {
        let results = test_validator(Duration::from_millis(10))
            .validate_many(Vec::<String>::new())
            .await;
        assert!(results.is_empty());
    }
}
