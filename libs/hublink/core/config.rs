use crate::traits::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a hub connection manager
///
/// Every section has defaults, so a partial YAML/JSON document (or
/// none at all) yields a working configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Hub method names, inbound and outbound
    pub methods: HubMethods,

    /// Outer retry policy used after a terminal close or failed connect
    pub retry: RetryPolicy,

    /// WebSocket transport settings
    pub transport: TransportConfig,
}

/// Names of the hub methods the manager invokes and listens for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubMethods {
    // Inbound (hub -> client)
    pub receive_message: String,
    pub user_typing: String,
    pub user_stopped_typing: String,
    pub message_read: String,

    // Outbound (client -> hub)
    pub send_message: String,
    pub start_typing: String,
    pub stop_typing: String,
    pub mark_read: String,
    pub join_group: String,
}

impl Default for HubMethods {
    fn default() -> Self {
        Self {
            receive_message: "ReceiveMessage".to_string(),
            user_typing: "UserTyping".to_string(),
            user_stopped_typing: "UserStoppedTyping".to_string(),
            message_read: "MessageRead".to_string(),
            send_message: "SendMessage".to_string(),
            start_typing: "StartTyping".to_string(),
            stop_typing: "StopTyping".to_string(),
            mark_read: "MarkMessagesAsRead".to_string(),
            join_group: "JoinUserGroup".to_string(),
        }
    }
}

/// Outer retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Fixed delay table (see [`DelayTable`])
    Table {
        delays_ms: Vec<u64>,
        max_attempts: usize,
    },
    /// Doubling delay capped at `max_delay_ms`
    Exponential {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        max_attempts: usize,
    },
    /// Give up after the first failure
    Never,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Table {
            delays_ms: DEFAULT_RETRY_DELAYS
                .iter()
                .map(|d| d.as_millis() as u64)
                .collect(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Build the strategy this policy describes
    pub fn strategy(&self) -> Box<dyn ReconnectionStrategy> {
        match self {
            RetryPolicy::Table {
                delays_ms,
                max_attempts,
            } => Box::new(DelayTable::new(
                delays_ms
                    .iter()
                    .map(|ms| Duration::from_millis(*ms))
                    .collect::<Vec<_>>(),
                *max_attempts,
            )),
            RetryPolicy::Exponential {
                initial_delay_ms,
                max_delay_ms,
                max_attempts,
            } => Box::new(ExponentialBackoff::new(
                Duration::from_millis(*initial_delay_ms),
                Duration::from_millis(*max_delay_ms),
                *max_attempts,
            )),
            RetryPolicy::Never => Box::new(NeverReconnect),
        }
    }
}

/// WebSocket transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Interval between keep-alive pings sent to the hub
    pub keep_alive_interval_ms: u64,

    /// Connection is considered dead after this long without any inbound frame
    pub server_timeout_ms: u64,

    /// Maximum time to wait for the handshake response
    pub handshake_timeout_ms: u64,

    /// Delays for the transport's own reconnect attempts (empty = disabled)
    pub reconnect_delays_ms: Vec<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_ms: 15_000,
            server_timeout_ms: 30_000,
            handshake_timeout_ms: 15_000,
            reconnect_delays_ms: vec![0, 2_000, 10_000, 30_000],
        }
    }
}

impl TransportConfig {
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_millis(self.server_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn reconnect_delays(&self) -> Vec<Duration> {
        self.reconnect_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.keep_alive_interval_ms == 0 {
            return Err(HubError::Configuration(
                "keep_alive_interval_ms must be greater than zero".into(),
            ));
        }
        if self.server_timeout_ms <= self.keep_alive_interval_ms {
            return Err(HubError::Configuration(format!(
                "server_timeout_ms ({}) must exceed keep_alive_interval_ms ({})",
                self.server_timeout_ms, self.keep_alive_interval_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_matches_default_table() {
        let strategy = RetryPolicy::default().strategy();
        for (attempt, expected) in DEFAULT_RETRY_DELAYS.iter().enumerate() {
            assert_eq!(strategy.next_delay(attempt), Some(*expected));
        }
        assert_eq!(strategy.next_delay(DEFAULT_MAX_ATTEMPTS), None);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config: ManagerConfig = serde_json::from_str(
            r#"{"methods": {"join_group": "JoinGroup"}, "retry": {"kind": "never"}}"#,
        )
        .unwrap();

        assert_eq!(config.methods.join_group, "JoinGroup");
        assert_eq!(config.methods.start_typing, "StartTyping");
        assert_eq!(config.retry, RetryPolicy::Never);
        assert_eq!(config.transport, TransportConfig::default());
    }

    #[test]
    fn test_exponential_policy() {
        let config: ManagerConfig = serde_json::from_str(
            r#"{"retry": {"kind": "exponential", "initial_delay_ms": 100, "max_delay_ms": 250, "max_attempts": 3}}"#,
        )
        .unwrap();
        let strategy = config.retry.strategy();

        assert_eq!(strategy.next_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(strategy.next_delay(2), Some(Duration::from_millis(250)));
        assert_eq!(strategy.next_delay(3), None);
    }

    #[test]
    fn test_transport_validation() {
        assert!(TransportConfig::default().validate().is_ok());

        let bad = TransportConfig {
            server_timeout_ms: 1_000,
            keep_alive_interval_ms: 5_000,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(HubError::Configuration(_))));
    }
}
