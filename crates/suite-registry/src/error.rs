//! Error types for suite-registry

use thiserror::Error;

/// Errors that can occur while talking to the package metadata registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The registry endpoint could not be reached or the request failed in transit
    #[error("registry transport failed: {0}")]
    Transport(String),

    /// The registry answered with an explicit error for a call
    #[error("registry call '{call}' failed: {message}")]
    Rpc { call: String, message: String },

    /// The response body could not be decoded into the expected shape
    #[error("registry response could not be decoded: {0}")]
    Decode(String),

    /// The registry endpoint is not configured
    #[error("registry is not configured: {0}")]
    NotConfigured(String),
}

impl RegistryError {
    /// Transport and configuration failures are worth retrying later;
    /// decode and explicit RPC errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotConfigured(_))
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        RegistryError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Decode(err.to_string())
    }
}
