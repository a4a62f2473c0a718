//! Connection State
//!
//! `ConnectionState` is the caller-facing snapshot; `Phase` is the
//! controller's internal position in the lifecycle. Every snapshot is
//! derived from a phase, so `is_connected` and `is_connecting` can
//! never both be true.
//!
//! ```text
//! Idle ─connect()─> Connecting ──ok──> Connected ──reconnecting──> Reconnecting
//!                      │  ▲                │  ▲                        │
//!                   fail │ timer         close │ reconnected ──────────┘
//!                      ▼  │                ▼
//!                  RetryPending <──────────┘
//!                      │
//!                  cap reached
//!                      ▼
//!                    Failed ─connect()─> Connecting
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle phase of the single logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Never connected, or disconnected by the caller
    Idle,
    /// Negotiating or opening the transport
    Connecting,
    /// Transport open
    Connected,
    /// Transport is running its own built-in recovery
    Reconnecting,
    /// Disconnected with a retry timer pending
    RetryPending,
    /// Retry cap reached; waiting for an explicit connect
    Failed,
}

impl Phase {
    #[inline]
    pub fn is_connected(self) -> bool {
        matches!(self, Phase::Connected)
    }

    #[inline]
    pub fn is_connecting(self) -> bool {
        matches!(self, Phase::Connecting | Phase::Reconnecting)
    }
}

/// Snapshot of the connection as seen by the caller
///
/// Replaced wholesale on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub is_connected: bool,
    pub is_connecting: bool,
    pub error: Option<String>,
    pub last_retry_attempt: Option<DateTime<Utc>>,
}

impl ConnectionState {
    /// Build the snapshot for a phase
    pub fn from_phase(
        phase: Phase,
        error: Option<String>,
        last_retry_attempt: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            is_connected: phase.is_connected(),
            is_connecting: phase.is_connecting(),
            error,
            last_retry_attempt,
        }
    }

    /// Initial state: not connected, no error
    pub fn idle() -> Self {
        Self::from_phase(Phase::Idle, None, None)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PHASES: [Phase; 6] = [
        Phase::Idle,
        Phase::Connecting,
        Phase::Connected,
        Phase::Reconnecting,
        Phase::RetryPending,
        Phase::Failed,
    ];

    #[test]
    fn test_connected_and_connecting_are_exclusive() {
        for phase in ALL_PHASES {
            let state = ConnectionState::from_phase(phase, None, None);
            assert!(
                !(state.is_connected && state.is_connecting),
                "{:?} produced both flags",
                phase
            );
        }
    }

    #[test]
    fn test_reconnecting_reports_connecting() {
        let state = ConnectionState::from_phase(Phase::Reconnecting, None, None);
        assert!(state.is_connecting);
        assert!(!state.is_connected);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(ConnectionState::idle()).unwrap();
        assert_eq!(json["isConnected"], false);
        assert_eq!(json["isConnecting"], false);
        assert!(json["error"].is_null());
        assert!(json["lastRetryAttempt"].is_null());
    }
}
