//! Config Hot-Reload - Watch config.toml for Changes
//!
//! Periodically re-reads config.toml and compares with the last seen
//! contents. If changes are detected and the new file validates, the new
//! config is published via a `tokio::sync::watch` channel. `main` uses it
//! to switch the stream without a restart.

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::AppConfig;

/// Default interval between checks.
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(60);

/// Watches config.toml for changes and publishes updates.
///
/// Polls the config file (not a filesystem watcher, which has portability
/// issues across Linux/macOS/Docker volumes).
pub struct ConfigWatcher {
    /// Path to config.toml.
    config_path: String,
    /// Time between checks.
    interval: Duration,
    /// Watch channel sender for config updates.
    config_tx: watch::Sender<AppConfig>,
    /// Hash of the last loaded file contents.
    last_hash: Option<u64>,
}

impl ConfigWatcher {
    /// Create a new config watcher.
    ///
    /// Returns the watcher and a receiver that consumers use to get
    /// notified of config changes.
    pub fn new(
        config_path: &str,
        initial_config: AppConfig,
        interval: Duration,
    ) -> (Self, watch::Receiver<AppConfig>) {
        let (config_tx, config_rx) = watch::channel(initial_config);

        let watcher = Self {
            config_path: config_path.to_string(),
            interval,
            config_tx,
            last_hash: None,
        };

        (watcher, config_rx)
    }

    /// Run the watcher loop until `shutdown` is cancelled.
    #[instrument(skip(self, shutdown), fields(path = %self.config_path))]
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval_s = self.interval.as_secs(),
            "Config watcher started"
        );

        self.last_hash = self.compute_hash().await;

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("Config watcher shutting down");
                    return;
                }
                () = tokio::time::sleep(self.interval) => {
                    self.check_and_reload().await;
                }
            }
        }
    }

    /// Check if config has changed and reload if so.
    ///
    /// Returns whether a new config was published.
    pub async fn check_and_reload(&mut self) -> bool {
        let new_hash = self.compute_hash().await;

        if new_hash == self.last_hash {
            debug!("Config unchanged");
            return false;
        }

        info!("Config change detected, reloading");

        match super::loader::load_config(&self.config_path) {
            Ok(new_config) => {
                self.last_hash = new_hash;
                if *self.config_tx.borrow() == new_config {
                    debug!("Config reformatted without semantic change");
                    return false;
                }
                self.config_tx.send_replace(new_config);
                info!("Config reloaded successfully");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to reload config, keeping current");
                false
            }
        }
    }

    /// Hash of the config file contents for diff detection.
    async fn compute_hash(&self) -> Option<u64> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let content = tokio::fs::read_to_string(&self.config_path)
            .await
            .ok()?;

        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Some(hasher.finish())
    }
}
