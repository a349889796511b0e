//! HTTP fetch client
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building the HTTP client with the configured user agent and timeout
//! - Conditional GET/HEAD requests built from a prior fetch record
//! - Bounded retry with exponential backoff and `Retry-After`
//! - Classifying every response into a [`FetchOutcome`]

use super::sleeper::{Sleeper, TokioSleeper};
use crate::config::FetchConfig;
use crate::storage::FetchRecord;
use reqwest::header::{
    HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
    RETRY_AFTER,
};
use reqwest::{redirect::Policy, Client, Method, StatusCode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use url::Url;

/// Longest `Retry-After` the client will honor
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Why an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection refused, reset, timeout or an interrupted body
    TransientNetwork,
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError,
    /// Any other 4xx, or an unexpected status
    ClientError,
    /// Redirect loop or too many redirects
    Redirect,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork | Self::RateLimited | Self::ServerError
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Normalized result of one fetch, after all retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// 2xx with a body (GET) or headers only (HEAD)
    Success,
    /// 304; the prior record is still current
    NotModified,
    /// Terminal failure that was never retried
    ClientError,
    /// Retryable failure that used up every attempt
    RetryableFailure,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub url: Url,
    pub kind: OutcomeKind,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Declared `Content-Length`
    pub content_length: Option<u64>,
    /// Response body; `None` for HEAD, 304 and failures
    pub body: Option<Vec<u8>>,
    pub error: Option<FetchError>,
    pub attempts: u32,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    pub fn is_not_modified(&self) -> bool {
        self.kind == OutcomeKind::NotModified
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.message.clone())
    }

    fn from_response(
        url: &Url,
        kind: OutcomeKind,
        status: StatusCode,
        headers: &HeaderMap,
        attempts: u32,
    ) -> Self {
        Self {
            url: url.clone(),
            kind,
            status_code: Some(status.as_u16()),
            content_type: header_string(headers, CONTENT_TYPE),
            etag: header_string(headers, ETAG),
            last_modified: header_string(headers, LAST_MODIFIED),
            content_length: header_string(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok()),
            body: None,
            error: None,
            attempts,
        }
    }

    fn failed(url: &Url, status: Option<u16>, error: FetchError, attempts: u32) -> Self {
        let kind = if error.kind.is_retryable() {
            OutcomeKind::RetryableFailure
        } else {
            OutcomeKind::ClientError
        };
        Self {
            url: url.clone(),
            kind,
            status_code: status,
            content_type: None,
            etag: None,
            last_modified: None,
            content_length: None,
            body: None,
            error: Some(error),
            attempts,
        }
    }
}

/// Attempt count and backoff curve
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub backoff_cap: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts(),
            backoff_factor: config.backoff_factor.max(0.0),
            backoff_cap: config.backoff_cap(),
        }
    }

    /// Delay after failed attempt `attempt` (1-based):
    /// `min(backoff_factor * 2^(attempt - 1), backoff_cap)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let seconds = self.backoff_factor * 2f64.powi(exponent);
        let computed = Duration::try_from_secs_f64(seconds).unwrap_or(self.backoff_cap);
        computed.min(self.backoff_cap)
    }
}

/// Parses a `Retry-After` value: delay seconds or an HTTP-date
///
/// Negative or unparseable values yield `None`; anything above one hour is
/// capped.
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            tracing::debug!(seconds, "Negative Retry-After value, ignoring");
            return None;
        }
        return Some(Duration::from_secs(seconds.unsigned_abs()).min(MAX_RETRY_AFTER));
    }

    let when = httpdate::parse_http_date(header_value).ok()?;
    let delay = when
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    Some(delay.min(MAX_RETRY_AFTER))
}

/// Builds the HTTP client
///
/// Redirects are followed (up to 10 hops); the recorded URL stays the one
/// that was requested.
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_seconds))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Conditional HTTP client with bounded retry
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl FetchClient {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            policy: RetryPolicy::from_config(config),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replaces the sleeper used for backoff waits
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        Arc::clone(&self.sleeper)
    }

    /// Conditional GET
    pub async fn fetch(&self, url: &Url, prior: Option<&FetchRecord>) -> FetchOutcome {
        self.execute(Method::GET, url, prior).await
    }

    /// Conditional HEAD
    pub async fn head(&self, url: &Url, prior: Option<&FetchRecord>) -> FetchOutcome {
        self.execute(Method::HEAD, url, prior).await
    }

    /// Sends a request until it succeeds, fails terminally or runs out of attempts
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Success |
    /// | 304 | NotModified |
    /// | 429, 503 | Retry after `Retry-After`, or backoff |
    /// | Other 5xx | Retry after backoff |
    /// | Connect error, timeout | Retry after backoff |
    /// | Other 4xx | Terminal |
    /// | Redirect loop | Terminal |
    async fn execute(&self, method: Method, url: &Url, prior: Option<&FetchRecord>) -> FetchOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::debug!(url = %url, method = %method, attempt, "Sending request");

            let (status, error, retry_after) = match self.send(&method, url, prior).await {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();

                    if status == StatusCode::NOT_MODIFIED {
                        return FetchOutcome::from_response(
                            url,
                            OutcomeKind::NotModified,
                            status,
                            &headers,
                            attempt,
                        );
                    }

                    if status.is_success() {
                        let mut outcome = FetchOutcome::from_response(
                            url,
                            OutcomeKind::Success,
                            status,
                            &headers,
                            attempt,
                        );
                        if method == Method::HEAD {
                            return outcome;
                        }
                        match response.bytes().await {
                            Ok(body) => {
                                outcome.body = Some(body.to_vec());
                                return outcome;
                            }
                            Err(e) => (
                                Some(status.as_u16()),
                                FetchError {
                                    kind: ErrorKind::TransientNetwork,
                                    message: format!("Failed to read body: {}", e),
                                },
                                None,
                            ),
                        }
                    } else {
                        let kind = classify_status(status);
                        let retry_after = if matches!(
                            status,
                            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
                        ) {
                            header_string(&headers, RETRY_AFTER)
                                .as_deref()
                                .and_then(parse_retry_after)
                        } else {
                            None
                        };
                        (
                            Some(status.as_u16()),
                            FetchError {
                                kind,
                                message: format!("HTTP {}", status),
                            },
                            retry_after,
                        )
                    }
                }
                Err(e) => (None, classify_request_error(&e), None),
            };

            if !error.kind.is_retryable() {
                tracing::debug!(url = %url, status, error = %error.message, "Terminal failure");
                return FetchOutcome::failed(url, status, error, attempt);
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    url = %url,
                    attempts = attempt,
                    error = %error.message,
                    "Giving up after retries"
                );
                return FetchOutcome::failed(url, status, error, attempt);
            }

            let delay = retry_after.unwrap_or_else(|| self.policy.delay_for(attempt));
            tracing::warn!(
                url = %url,
                attempt,
                status,
                delay_ms = delay.as_millis() as u64,
                honored_retry_after = retry_after.is_some(),
                "Retryable failure, backing off"
            );
            self.sleeper.sleep(delay).await;
        }
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        prior: Option<&FetchRecord>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(prior) = prior {
            if let Some(etag) = prior.etag.as_deref() {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = prior.last_modified.as_deref() {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }
        request.send().await
    }
}

fn classify_status(status: StatusCode) -> ErrorKind {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ErrorKind::RateLimited
    } else if status.is_server_error() {
        ErrorKind::ServerError
    } else {
        ErrorKind::ClientError
    }
}

fn classify_request_error(e: &reqwest::Error) -> FetchError {
    if e.is_redirect() {
        FetchError {
            kind: ErrorKind::Redirect,
            message: format!("Redirect error: {}", e),
        }
    } else if e.is_timeout() {
        FetchError {
            kind: ErrorKind::TransientNetwork,
            message: "Request timeout".to_string(),
        }
    } else if e.is_connect() {
        FetchError {
            kind: ErrorKind::TransientNetwork,
            message: format!("Connection failed: {}", e),
        }
    } else if e.is_builder() {
        FetchError {
            kind: ErrorKind::ClientError,
            message: format!("Invalid request: {}", e),
        }
    } else {
        FetchError {
            kind: ErrorKind::TransientNetwork,
            message: e.to_string(),
        }
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::sleeper::RecordingSleeper;
    use crate::storage::sample_record;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> FetchConfig {
        FetchConfig {
            max_retries: 3,
            backoff_factor: 0.5,
            backoff_max_seconds: Some(1.5),
            ..FetchConfig::default()
        }
    }

    fn client(sleeper: &RecordingSleeper) -> FetchClient {
        FetchClient::new(&test_config())
            .unwrap()
            .with_sleeper(Arc::new(sleeper.clone()))
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&FetchConfig::default()).is_ok());
    }

    #[test]
    fn test_backoff_curve_is_capped() {
        let policy = RetryPolicy::from_config(&test_config());
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(30), Duration::from_millis(1500));
    }

    #[test]
    fn test_default_backoff_cap() {
        let config = FetchConfig {
            max_retries: 4,
            backoff_factor: 1.0,
            backoff_max_seconds: None,
            ..FetchConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.backoff_cap, Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(4));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("-3"), None);
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("999999"), Some(MAX_RETRY_AFTER));
        // A date in the past means "now".
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[tokio::test]
    async fn test_success_captures_validators() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .insert_header("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT")
                    .insert_header("Content-Type", "text/html")
                    .set_body_string("<html></html>"),
            )
            .mount(&server)
            .await;

        let sleeper = RecordingSleeper::new();
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let outcome = client(&sleeper).fetch(&url, None).await;

        assert_eq!(outcome.kind, OutcomeKind::Success);
        assert_eq!(outcome.etag.as_deref(), Some("\"v1\""));
        assert_eq!(
            outcome.last_modified.as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
        assert_eq!(outcome.body.as_deref(), Some(&b"<html></html>"[..]));
        assert_eq!(outcome.attempts, 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_conditional_headers_yield_not_modified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("If-None-Match", "\"abc\""))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let mut prior = sample_record(url.as_str());
        prior.etag = Some("\"abc\"".to_string());

        let outcome = client(&RecordingSleeper::new())
            .fetch(&url, Some(&prior))
            .await;

        assert!(outcome.is_not_modified());
        assert!(outcome.body.is_none());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let sleeper = RecordingSleeper::new();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let outcome = client(&sleeper).fetch(&url, None).await;

        assert_eq!(outcome.kind, OutcomeKind::ClientError);
        assert_eq!(outcome.status_code, Some(404));
        assert_eq!(outcome.attempts, 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_exhausts_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let sleeper = RecordingSleeper::new();
        let url = Url::parse(&format!("{}/flaky", server.uri())).unwrap();
        let outcome = client(&sleeper).fetch(&url, None).await;

        assert_eq!(outcome.kind, OutcomeKind::RetryableFailure);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            outcome.error.as_ref().map(|e| e.kind),
            Some(ErrorKind::ServerError)
        );
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_millis(500), Duration::from_secs(1)]
        );
    }

    #[tokio::test]
    async fn test_retry_after_overrides_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "5"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let sleeper = RecordingSleeper::new();
        let url = Url::parse(&format!("{}/limited", server.uri())).unwrap();
        let outcome = client(&sleeper).fetch(&url, None).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/dump.zip"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", "600"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/dump.zip", server.uri())).unwrap();
        let outcome = client(&RecordingSleeper::new()).head(&url, None).await;

        assert!(outcome.is_success());
        assert!(outcome.body.is_none());
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried() {
        let sleeper = RecordingSleeper::new();
        // Nothing listens on port 9 locally.
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let outcome = client(&sleeper).fetch(&url, None).await;

        assert_eq!(outcome.kind, OutcomeKind::RetryableFailure);
        assert_eq!(outcome.status_code, None);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(sleeper.recorded().len(), 2);
    }
}
