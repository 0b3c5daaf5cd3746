use async_trait::async_trait;
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

/// Errors that can occur while retrieving a feed document.
///
/// Every variant is a transport problem; documents that arrive but do not
/// parse are reported by the parser instead.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Capability to retrieve the raw document behind an address.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, address: &str) -> Result<String, FetchError>;
}

/// Limits applied by [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub request_timeout: Duration,
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub retry_base_delay: Duration,
    pub max_feed_bytes: usize,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            max_feed_bytes: 10 * 1024 * 1024,
            user_agent: concat!("feedline/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl From<&Config> for FetchSettings {
    fn from(config: &Config) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries,
            max_feed_bytes: config.max_feed_bytes,
            user_agent: config.user_agent.clone(),
            ..Self::default()
        }
    }
}

/// Create a redirect policy with loop detection and limited hops.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// [`Fetch`] implementation over HTTP(S).
///
/// # Behavior
///
/// - Each attempt is bounded by `request_timeout`
/// - 429 and 5xx responses, as well as truncated bodies, are retried with
///   exponential backoff up to `max_retries` times
/// - Other non-2xx statuses fail immediately
/// - Bodies over `max_feed_bytes` are rejected, checked against
///   Content-Length first and then while streaming
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl HttpFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(create_redirect_policy())
            .user_agent(settings.user_agent.clone())
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, settings })
    }

    /// Use a caller-configured client.
    pub fn with_client(client: reqwest::Client, settings: FetchSettings) -> Self {
        Self { client, settings }
    }

    fn backoff(&self, retry: u32) -> Duration {
        self.settings.retry_base_delay.saturating_mul(2u32.saturating_pow(retry))
    }

    async fn attempt(&self, address: &str) -> Result<Attempt, FetchError> {
        let response = tokio::time::timeout(
            self.settings.request_timeout,
            self.client.get(address).send(),
        )
        .await
        .map_err(|_| FetchError::Timeout)??;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Ok(Attempt::Retry(status));
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = tokio::time::timeout(
            self.settings.request_timeout,
            read_limited_bytes(response, self.settings.max_feed_bytes),
        )
        .await
        .map_err(|_| FetchError::Timeout)??;
        Ok(Attempt::Body(body))
    }
}

enum Attempt {
    Body(Vec<u8>),
    Retry(reqwest::StatusCode),
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, address: &str) -> Result<String, FetchError> {
        let mut retry_count = 0;

        let bytes = loop {
            let error = match self.attempt(address).await {
                Ok(Attempt::Body(bytes)) => break bytes,
                Ok(Attempt::Retry(status)) if status == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    FetchError::RateLimited(retry_count)
                }
                Ok(Attempt::Retry(status)) => FetchError::HttpStatus(status.as_u16()),
                Err(e @ FetchError::IncompleteResponse { .. }) => e,
                Err(e) => return Err(e),
            };

            if retry_count >= self.settings.max_retries {
                return Err(error);
            }

            let delay = self.backoff(retry_count);
            tracing::warn!(
                feed = %address,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying feed fetch after delay"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
        };

        tracing::debug!(feed = %address, bytes = bytes.len(), "Fetched feed document");
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
