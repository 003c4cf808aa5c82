//! Shared HTTP client for the research tools.
//!
//! Every request is preceded by a randomized polite delay and carries
//! browser-like headers. Sites that reject obvious bots are the norm for
//! the pages the tools read.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::{Client, Response};
use tracing::{debug, trace};
use url::Url;

use scout_core::Error;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const TRUNCATION_MARKER: &str = "...[truncated]";

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Fixed part of the delay slept before every request.
    pub min_delay: Duration,
    /// Upper bound of the random part of the delay.
    pub jitter: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            jitter: Duration::from_secs(1),
            timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// No delay between requests.
    pub fn impolite(self) -> Self {
        self.with_min_delay(Duration::ZERO).with_jitter(Duration::ZERO)
    }
}

pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// The delay to sleep before the next request.
    pub fn polite_delay(&self) -> Duration {
        let jitter_ms = self.config.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.config.min_delay + Duration::from_millis(extra)
    }

    /// GET a URL with browser headers, after the polite delay.
    ///
    /// Non-success statuses are errors.
    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        let parsed = parse_url(url)?;

        let delay = self.polite_delay();
        if !delay.is_zero() {
            trace!(delay_ms = delay.as_millis() as u64, "Polite delay");
            tokio::time::sleep(delay).await;
        }

        debug!(url = %parsed, "HTTP GET");
        let response = self
            .client
            .get(parsed.clone())
            .headers(browser_headers(&parsed))
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::api(
                status.as_u16(),
                format!("{} for url: {}", status, parsed),
            ));
        }
        Ok(response)
    }

    pub async fn get_text(&self, url: &str) -> Result<String, Error> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| Error::network(e.to_string()))
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, Error> {
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| Error::network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value, Error> {
        let text = self.get_text(url).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Parse an absolute http(s) URL.
pub fn parse_url(input: &str) -> Result<Url, Error> {
    let url = Url::parse(input.trim())
        .map_err(|e| Error::invalid_request(format!("invalid URL '{}': {}", input.trim(), e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::invalid_request(format!(
            "unsupported URL scheme '{}'",
            other
        ))),
    }
}

/// Headers sent with every request, adjusted per domain.
pub fn browser_headers(url: &Url) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(REFERER, HeaderValue::from_static("https://www.google.com/"));
    headers.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));

    let host = url.host_str().unwrap_or_default();
    if host == "github.com" || host.ends_with(".github.com") {
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    }
    headers
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &text[..idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}
