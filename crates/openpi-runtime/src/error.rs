//! Error types for openpi-runtime

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the policy runtime collaborators
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No training config is registered under the name
    #[error("Training config not found: {0}")]
    ConfigNotFound(String),

    /// Norm stats file exists but could not be read or parsed
    #[error("Failed to load norm stats from {path}: {reason}")]
    NormStats { path: PathBuf, reason: String },

    /// Checkpoint location could not be found by the runtime
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// The runtime refused to construct the policy
    #[error("Policy load rejected: {0}")]
    LoadRejected(String),

    /// A single inference call failed
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Transport to the model runtime failed
    #[error("Runtime transport failed: {0}")]
    Transport(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for RuntimeError {
    fn from(err: reqwest::Error) -> Self {
        RuntimeError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        RuntimeError::Serialization(err.to_string())
    }
}
