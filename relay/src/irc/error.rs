use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrcError {
    #[error("IRC configuration incomplete: {0}")]
    ConfigIncomplete(String),
    #[error("Could not resolve IRC server {host}: {reason}")]
    DnsResolutionFailed { host: String, reason: String },
    #[error("Creating the socket failed: {0}")]
    SocketCreateFailed(#[source] std::io::Error),
    #[error("Connection to IRC server {address} failed: {reason}")]
    ConnectFailed { address: String, reason: String },
    #[error("Connection lost to IRC server: {0}")]
    ConnectionLost(String),
    #[error("Handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("A connection to the IRC server is already established")]
    AlreadyConnected,
    /// The handle was closed by `stop` while an operation was using it.
    #[error("Not connected to the IRC server")]
    NotConnected,
    #[error("Shutdown requested")]
    ShutdownRequested,
}

impl IrcError {
    /// Whether the reconnect scheduler should back off and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IrcError::DnsResolutionFailed { .. }
                | IrcError::SocketCreateFailed(_)
                | IrcError::ConnectFailed { .. }
                | IrcError::ConnectionLost(_)
                | IrcError::HandshakeTimeout(_)
        )
    }
}

impl From<std::io::Error> for IrcError {
    fn from(err: std::io::Error) -> Self {
        IrcError::ConnectionLost(err.to_string())
    }
}

impl From<crate::error::ConfigError> for IrcError {
    fn from(err: crate::error::ConfigError) -> Self {
        IrcError::ConfigIncomplete(err.to_string())
    }
}

pub type Result<T, E = IrcError> = std::result::Result<T, E>;
