//! Keep-alive and server timeout for hub connections
//!
//! # Architecture
//!
//! The connection task owns one `KeepAlive` and polls it alongside the
//! socket and the command channel:
//!
//! ```text
//! ┌──────────────────────────── connection task ───────────────────────────┐
//! │ select! {                                                               │
//! │   frame   = read.next()       => keep_alive.record_received(); ...     │
//! │   command = commands.recv()   => write.send(...)                       │
//! │   tick    = keep_alive.next() => SendPing  -> write.send({"type":6})   │
//! │                                  TimedOut  -> treat connection as lost │
//! │ }                                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A ping goes out every `interval`. If nothing at all has been received
//! for `server_timeout`, the connection is considered dead even though
//! the socket has not reported an error (half-open TCP).

use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// What the connection task should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveTick {
    /// Send a ping frame to the hub
    SendPing,
    /// Server timeout elapsed without any inbound frame
    TimedOut,
}

/// Ping schedule plus inbound-silence tracking
pub struct KeepAlive {
    ticker: Interval,
    server_timeout: Duration,
    last_received: Instant,
}

impl KeepAlive {
    /// Create a keep-alive that starts counting now
    ///
    /// The first ping is sent one full `interval` from now.
    pub fn new(interval: Duration, server_timeout: Duration) -> Self {
        let now = Instant::now();
        let mut ticker = tokio::time::interval_at(now + interval, interval);
        // If we miss ticks due to slow processing, skip them rather than bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(
            "Keep-alive started: ping every {:?}, server timeout {:?}",
            interval, server_timeout
        );

        Self {
            ticker,
            server_timeout,
            last_received: now,
        }
    }

    /// Record that a frame was just received
    pub fn record_received(&mut self) {
        self.last_received = Instant::now();
    }

    /// Time since the last inbound frame
    pub fn time_since_last_received(&self) -> Duration {
        self.last_received.elapsed()
    }

    /// Check the server has been heard from within the timeout
    pub fn is_healthy(&self) -> bool {
        self.time_since_last_received() < self.server_timeout
    }

    /// Wait for the next keep-alive action
    ///
    /// Cancel-safe: dropping the future before completion loses nothing.
    pub async fn next(&mut self) -> KeepAliveTick {
        let deadline = self.last_received + self.server_timeout;

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => KeepAliveTick::TimedOut,
            _ = self.ticker.tick() => KeepAliveTick::SendPing,
        }
    }
}
