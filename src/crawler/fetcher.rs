//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings and proxy
//! - GET requests for profile pages and images
//! - Retry with exponential backoff for transport failures
//! - Per-host circuit breaking
//!
//! Any HTTP response, whatever its status, counts as a successful fetch.
//! Deciding whether a page is worth keeping belongs to the extraction step.

use crate::config::{Config, NetworkConfig, UserAgentConfig};
use crate::crawler::retry::{CircuitBreaker, RetryPolicy};
use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors returned once a fetch has given up
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed after {attempts} attempts: {source}")]
    Transport {
        url: String,
        attempts: u32,
        source: reqwest::Error,
    },

    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
}

/// A completed HTTP exchange
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,

    /// Raw body bytes
    pub body: Vec<u8>,
}

/// Formats the client identifier sent with every request
///
/// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `network` - Timeouts and proxies; the first proxy carries all traffic
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client (e.g. bad proxy URL)
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    network: &NetworkConfig,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(user_agent_string(user_agent))
        .timeout(Duration::from_secs(network.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = network.proxies.first() {
        tracing::info!("Routing requests through proxy {}", proxy);
        builder = builder.proxy(Proxy::all(proxy.as_str())?);
    } else {
        tracing::info!("No proxies set");
    }

    builder.build()
}

/// Fetches URLs with retry and circuit breaking
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl Fetcher {
    pub fn new(client: Client, policy: RetryPolicy, breaker: CircuitBreaker) -> Self {
        Self {
            client,
            policy,
            breaker,
        }
    }

    /// Builds a fetcher from the crawler configuration
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent, &config.network)?;
        Ok(Self::new(
            client,
            RetryPolicy::from_config(&config.network),
            CircuitBreaker::from_config(&config.network),
        ))
    }

    /// Fetches a URL, retrying transport failures
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Any HTTP response | Return it, whatever the status |
    /// | Connect / timeout / body read error | Back off, retry up to `max_attempts` |
    /// | Host circuit open | Wait out the cooldown, then try; waiting is not an attempt |
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    pub async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let host = host_key(&parsed);

        let mut attempt = 0;
        loop {
            if let Some(remaining) = self.breaker.check(&host) {
                tracing::debug!("Circuit open for {}, waiting {:?}", host, remaining);
                tokio::time::sleep(remaining).await;
                continue;
            }

            attempt += 1;
            match self.try_fetch(parsed.clone()).await {
                Ok(response) => {
                    self.breaker.record_success(&host);
                    tracing::debug!(
                        "Fetched {} bytes from {} (HTTP {})",
                        response.body.len(),
                        url,
                        response.status
                    );
                    return Ok(response);
                }
                Err(source) => {
                    self.breaker.record_failure(&host);

                    if !self.policy.should_retry(attempt) {
                        return Err(FetchError::Transport {
                            url: url.to_string(),
                            attempts: attempt,
                            source,
                        });
                    }

                    let delay = self.policy.calculate_backoff(attempt);
                    tracing::debug!(
                        "Attempt {} for {} failed ({}), retrying in {:?}",
                        attempt,
                        url,
                        source,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn try_fetch(&self, url: Url) -> Result<FetchResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(FetchResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Circuit breaker key: host plus effective port
fn host_key(url: &Url) -> String {
    match (url.host_str(), url.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => url.as_str().to_string(),
    }
}
