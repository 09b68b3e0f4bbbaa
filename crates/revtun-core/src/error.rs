//! Error types for the revtun ecosystem

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for agent operations
#[derive(Error, Debug)]
pub enum AgentError {
    /// Misconfiguration discovered at connect time; never retried internally
    #[error("bad parameter {name}: {message}")]
    BadParameter {
        name: &'static str,
        message: String,
    },

    /// Transport-level failure (handshake, host key, channel plumbing)
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Credential/authority store failure
    #[error("authority error: {0}")]
    Authority(#[from] AuthorityError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The agent was closed before the operation could complete
    #[error("agent is closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// The remote endpoint could not be reached
    #[error("connection refused: {0}")]
    Refused(String),

    /// Handshake or host-key verification failure
    #[error("authentication failed: {0}")]
    Auth(String),

    /// No configured authority signs the presented host certificate
    #[error("not found: {0}")]
    NotFound(String),

    /// The peer closed the session or channel
    #[error("peer closed the connection")]
    PeerClosed,

    /// I/O error on the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Credential/authority store errors
#[derive(Error, Debug)]
pub enum AuthorityError {
    /// The store could not be reached
    #[error("authority store unavailable: {0}")]
    Unavailable(String),

    /// The store returned data the agent cannot use
    #[error("malformed authority data: {0}")]
    Malformed(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
