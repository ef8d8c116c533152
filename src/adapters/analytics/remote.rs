//! Remote Sentiment - HTTP Analytics Service Client
//!
//! POSTs candles to an external indicator service and returns its
//! verdict. The service answers `LOADING...` with zero votes while it has
//! too little history.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::adapters::exchange::client::{HttpClient, HttpClientConfig};
use crate::domain::market::Candle;
use crate::domain::message::AnalysisResult;
use crate::ports::analytics::SentimentAnalyzer;

/// Path of the sentiment endpoint on the analytics service.
const SENTIMENT_PATH: &str = "/sentiment";

#[derive(Debug, Serialize)]
struct SentimentRequest<'a> {
  candles: &'a [Candle],
}

/// [`SentimentAnalyzer`] backed by a remote HTTP service.
pub struct RemoteSentiment {
  http: HttpClient,
}

impl RemoteSentiment {
  /// Create a client for the service at `url`.
  pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
    let http = HttpClient::new(HttpClientConfig {
      base_url: url.into(),
      timeout,
      max_concurrent: 2,
      max_retries: 1,
      requests_per_second: 0,
      ..Default::default()
    })?;
    Ok(Self { http })
  }
}

#[async_trait]
impl SentimentAnalyzer for RemoteSentiment {
  #[instrument(skip_all, fields(candles = candles.len()))]
  async fn compute_sentiment(&self, candles: &[Candle]) -> Result<AnalysisResult> {
    let result: AnalysisResult = self
      .http
      .post_json(SENTIMENT_PATH, &SentimentRequest { candles })
      .await?;
    debug!(verdict = %result.verdict, score = result.score, "Sentiment computed");
    Ok(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_request_body_shape() {
    let candles = [Candle {
      t: 1,
      o: 1.0,
      h: 2.0,
      l: 0.5,
      c: 1.5,
      v: 10.0,
    }];
    let value = serde_json::to_value(SentimentRequest { candles: &candles }).unwrap();
    assert_eq!(value["candles"][0]["c"], 1.5);
  }

  #[test]
  fn test_loading_answer_decodes() {
    let result: AnalysisResult = serde_json::from_str(
      r##"{"verdict":"LOADING...","color":"#8b949e","score":0,"summary":{"buy":0,"sell":0,"neutral":0},"details":[]}"##,
    )
    .unwrap();
    assert_eq!(result.verdict, "LOADING...");
    assert!(result.details.is_empty());
  }
}
