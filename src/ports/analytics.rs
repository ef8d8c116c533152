//! Analytics Port - Sentiment Computation
//!
//! The indicator math is owned by an external analytics component; the
//! engine only hands it candles and forwards the verdict.

use async_trait::async_trait;

use crate::domain::market::Candle;
use crate::domain::message::AnalysisResult;

/// Computes an indicator-vote sentiment from recent candles.
#[async_trait]
pub trait SentimentAnalyzer: Send + Sync + 'static {
  /// Analyze candles (oldest first) and return a verdict.
  async fn compute_sentiment(&self, candles: &[Candle]) -> anyhow::Result<AnalysisResult>;
}
