//! Error taxonomy for orchestrator operations.
//!
//! Callers branch on these variants rather than parsing message strings; the
//! HTTP surface maps each kind to a distinct status code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The provider never established a connection to the cluster platform.
    #[error("Provider not initialized: {0}")]
    NotInitialized(String),

    /// The instance's entry point or readiness probe never came up in time.
    #[error("Instance for tenant '{user_id}' did not become ready: {reason}")]
    CreationTimeout { user_id: String, reason: String },

    /// The tenant id cannot be embedded in platform resource names.
    #[error("Invalid tenant id '{user_id}': {reason}")]
    InvalidTenant { user_id: String, reason: String },

    /// Any other failure talking to the cluster platform.
    #[error("Cluster platform error: {0}")]
    Platform(#[from] kube::Error),

    /// The instance was addressable but the forwarded call failed in transport.
    #[error("Failed to reach instance: {0}")]
    Proxy(#[from] reqwest::Error),

    #[error("Manifest serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;
