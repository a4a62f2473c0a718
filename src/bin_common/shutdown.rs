//! Graceful shutdown management

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::sleep;
use tracing::info;

/// Poll period of [`ShutdownManager::interruptible_sleep`]
const CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Tracks whether the process should keep running
///
/// Cloning shares the same flag.
#[derive(Debug, Clone)]
pub struct ShutdownManager {
    running: Arc<AtomicBool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Spawn a Ctrl+C handler that flips the flag
    pub fn spawn_signal_handler(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("[Shutdown] Received Ctrl+C, shutting down gracefully...");
                manager.trigger();
            }
        });
    }

    /// Request shutdown
    pub fn trigger(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, waking early once shutdown is requested
    pub async fn interruptible_sleep(&self, duration: Duration) {
        let mut elapsed = Duration::ZERO;

        while elapsed < duration && self.is_running() {
            let step = CHECK_INTERVAL.min(duration - elapsed);
            sleep(step).await;
            elapsed += step;
        }
    }

    /// Wait until shutdown is requested
    pub async fn wait(&self) {
        while self.is_running() {
            sleep(CHECK_INTERVAL).await;
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_full_duration_while_running() {
        let shutdown = ShutdownManager::new();
        let start = tokio::time::Instant::now();

        shutdown.interruptible_sleep(Duration::from_millis(120)).await;

        assert_eq!(start.elapsed(), Duration::from_millis(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_wakes_sleep_early() {
        let shutdown = ShutdownManager::new();
        let remote = shutdown.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            remote.trigger();
        });

        let start = tokio::time::Instant::now();
        shutdown.interruptible_sleep(Duration::from_secs(60)).await;

        assert!(!shutdown.is_running());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_after_trigger() {
        let shutdown = ShutdownManager::new();
        let remote = shutdown.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            remote.trigger();
        });

        shutdown.wait().await;
        assert!(!shutdown.is_running());
    }
}
