//! HTTP Client - Rate-limited REST Client
//!
//! Wraps reqwest with a concurrency semaphore, a request-rate limiter and
//! retries on transient errors. Shared by every REST-backed adapter.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
  /// Base URL, without trailing slash.
  pub base_url: String,
  /// Request timeout.
  pub timeout: Duration,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Maximum retries on transient errors.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
  /// Request-rate ceiling (0 = unlimited).
  pub requests_per_second: u32,
}

impl Default for HttpClientConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api.binance.com".to_string(),
      timeout: Duration::from_secs(10),
      max_concurrent: 10,
      max_retries: 3,
      retry_base_delay: Duration::from_millis(200),
      requests_per_second: 10,
    }
  }
}

/// Rate-limited JSON-over-HTTP client.
pub struct HttpClient {
  /// Underlying HTTP client.
  http: Client,
  /// Client configuration.
  config: HttpClientConfig,
  /// Concurrency limiter.
  semaphore: Arc<Semaphore>,
  /// Request-rate limiter.
  limiter: Option<DefaultDirectRateLimiter>,
}

impl HttpClient {
  /// Create a new client.
  pub fn new(mut config: HttpClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    config.base_url = config.base_url.trim_end_matches('/').to_string();
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    let limiter = NonZeroU32::new(config.requests_per_second).map(|rps| RateLimiter::direct(Quota::per_second(rps)));

    Ok(Self {
      http,
      config,
      semaphore,
      limiter,
    })
  }

  /// Base URL this client talks to.
  pub fn base_url(&self) -> &str {
    &self.config.base_url
  }

  /// GET `path` with query parameters and decode the JSON body.
  pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
    let url = format!("{}{}", self.config.base_url, path);
    let request = self.http.get(&url).query(query);
    let body = self.execute_with_retry(request, path).await?;
    serde_json::from_str(&body).with_context(|| format!("Invalid JSON from {path}"))
  }

  /// POST a JSON body to `path` and decode the JSON answer.
  pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
    let url = format!("{}{}", self.config.base_url, path);
    let request = self.http.post(&url).json(body);
    let body = self.execute_with_retry(request, path).await?;
    serde_json::from_str(&body).with_context(|| format!("Invalid JSON from {path}"))
  }

  /// Execute request with rate limiting and retries; returns the body text.
  async fn execute_with_retry(&self, request: RequestBuilder, path: &str) -> Result<String> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .context("Semaphore closed")?;

    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
        debug!(attempt, delay_ms = delay.as_millis(), path, "Retrying request");
        sleep(delay).await;
      }

      if let Some(limiter) = &self.limiter {
        limiter.until_ready().await;
      }

      let req = request
        .try_clone()
        .context("Failed to clone request")?;

      match req.send().await {
        Ok(response) => match response.status() {
          status if status.is_success() => {
            return response.text().await.context("Failed to read response body");
          }
          StatusCode::TOO_MANY_REQUESTS => {
            warn!(path, "Rate limited, backing off");
            last_error = Some(anyhow::anyhow!("Rate limited"));
          }
          status if status.is_server_error() => {
            warn!(status = %status, path, "Server error, retrying");
            last_error = Some(anyhow::anyhow!("Server error: {status}"));
          }
          status => {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("API error {status} on {path}: {body}"));
          }
        },
        Err(e) => {
          warn!(error = %e, attempt, path, "Request failed");
          last_error = Some(e.into());
        }
      }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Max retries exceeded")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_base_url_trailing_slash_is_trimmed() {
    let client = HttpClient::new(HttpClientConfig {
      base_url: "https://api.example.com/".to_string(),
      ..Default::default()
    })
    .unwrap();
    assert_eq!(client.base_url(), "https://api.example.com");
  }

  #[test]
  fn test_zero_rate_disables_limiter() {
    let client = HttpClient::new(HttpClientConfig {
      requests_per_second: 0,
      ..Default::default()
    })
    .unwrap();
    assert!(client.limiter.is_none());
  }
}
