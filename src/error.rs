//! Switchyard Error Types

use thiserror::Error;

/// Result type alias for Switchyard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Switchyard error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Membership errors
    #[error("Broker not found: {0}")]
    BrokerNotFound(u32),

    #[error("No broker registered at address {0}")]
    UnknownBrokerAddress(String),

    // Elastic address errors
    #[error("No elastic IP allocation held")]
    NoAllocation,

    #[error("Instance {0} is not a registered broker")]
    InstanceNotRegistered(String),

    #[error("No address association found for instance {0}")]
    AssociationNotFound(String),

    // Cloud provider errors
    #[error("Cloud provider call '{op}' failed: {reason}")]
    Cloud { op: &'static str, reason: String },

    #[error("Cloud transport error: {0}")]
    CloudTransport(#[from] reqwest::Error),

    // Peer errors
    #[error("Peer {address} unreachable: {reason}")]
    PeerUnreachable { address: String, reason: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a failed cloud provider call
    pub fn cloud(op: &'static str, reason: impl Into<String>) -> Self {
        Error::Cloud {
            op,
            reason: reason.into(),
        }
    }

    /// Check if this error originated at the cloud provider boundary
    pub fn is_cloud(&self) -> bool {
        matches!(self, Error::Cloud { .. } | Error::CloudTransport(_))
    }
}
