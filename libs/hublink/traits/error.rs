use thiserror::Error;

/// Main error type for hublink
#[derive(Error, Debug)]
pub enum HubError {
    /// Could not obtain a connection credential
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// Open/close/send failure at the connection layer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invocation attempted while no connection is live
    #[error("Not connected")]
    NotConnected,

    /// The hub rejected the protocol handshake
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Malformed hub frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server completed an invocation with an error
    #[error("Invocation '{target}' failed: {reason}")]
    InvocationFailed { target: String, reason: String },

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        HubError::Protocol(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for HubError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        HubError::Transport(e.to_string())
    }
}

/// Result type for hublink operations
pub type Result<T> = std::result::Result<T, HubError>;
