//! Push Strategy - Streaming Session with Immediate Reconnect
//!
//! Keeps one session open against a [`PushFeed`]. Every tick becomes an
//! observation. A lost session is reopened right away; only a failing
//! `connect` call is paced.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::domain::market::{Pair, PriceObservation};
use crate::ports::push_feed::{PushFeed, TickStream};

use super::{ObservationSink, RunLoop};

/// Timing knobs for the push run-loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushSettings {
  /// Upper bound on a single receive before re-checking cancellation.
  pub recv_timeout: Duration,
  /// Pause after a failed `connect` call.
  pub connect_retry: Duration,
}

impl Default for PushSettings {
  fn default() -> Self {
    Self {
      recv_timeout: Duration::from_secs(5),
      connect_retry: Duration::from_secs(1),
    }
  }
}

/// Ingestion from a streaming push channel.
pub struct PushFeedStrategy {
  exchange: String,
  feed: Arc<dyn PushFeed>,
  settings: PushSettings,
  pub(super) run: Option<RunLoop>,
}

/// How a single session ended.
enum SessionEnd {
  Cancelled,
  Lost,
}

impl PushFeedStrategy {
  pub fn new(exchange: impl Into<String>, feed: Arc<dyn PushFeed>, settings: PushSettings) -> Self {
    Self {
      exchange: exchange.into(),
      feed,
      settings,
      run: None,
    }
  }

  pub fn exchange(&self) -> &str {
    &self.exchange
  }

  pub(super) fn spawn(&self, pair: Pair, sink: ObservationSink) -> JoinHandle<()> {
    let span = info_span!("push_strategy", exchange = %self.exchange, pair = %pair);
    let exchange = self.exchange.clone();
    let feed = Arc::clone(&self.feed);
    let settings = self.settings;

    tokio::spawn(run(exchange, feed, pair, sink, settings).instrument(span))
  }
}

async fn run(
  exchange: String,
  feed: Arc<dyn PushFeed>,
  pair: Pair,
  sink: ObservationSink,
  settings: PushSettings,
) {
  let _live = sink.gauge().enter();
  let token = sink.token().clone();
  info!("Push strategy started");

  loop {
    let connected = tokio::select! {
      () = token.cancelled() => break,
      res = feed.connect(&pair) => res,
    };

    let stream = match connected {
      Ok(stream) => stream,
      Err(e) => {
        warn!(error = %e, retry_ms = settings.connect_retry.as_millis(), "Push connect failed");
        tokio::select! {
          () = token.cancelled() => break,
          () = tokio::time::sleep(settings.connect_retry) => continue,
        }
      }
    };

    info!("Push session established");
    match session(&exchange, &pair, stream, &sink, settings.recv_timeout).await {
      SessionEnd::Cancelled => break,
      SessionEnd::Lost => debug!("Reconnecting push session"),
    }
  }

  info!("Push strategy stopped");
}

/// Drain one session until it is lost or the sink is closed.
async fn session(
  exchange: &str,
  pair: &Pair,
  mut stream: TickStream,
  sink: &ObservationSink,
  recv_timeout: Duration,
) -> SessionEnd {
  let token = sink.token();

  loop {
    let next = tokio::select! {
      () = token.cancelled() => return SessionEnd::Cancelled,
      next = tokio::time::timeout(recv_timeout, stream.next()) => next,
    };

    match next {
      // Quiet channel; loop to re-check cancellation.
      Err(_) => debug!(timeout_ms = recv_timeout.as_millis(), "No push traffic"),
      Ok(Some(Ok(tick))) => {
        sink.emit(PriceObservation::now(exchange, pair.clone(), tick.price));
      }
      Ok(Some(Err(e))) => {
        warn!(error = %e, "Push session error");
        return SessionEnd::Lost;
      }
      Ok(None) => {
        warn!("Push session ended");
        return SessionEnd::Lost;
      }
    }
  }
}
