//! Error taxonomy for policy resolution and serving.

use std::path::PathBuf;

use openpi_runtime::RuntimeError;

use super::args::EnvironmentMode;

/// Errors that stop the serving pipeline.
///
/// Resolution and construction errors are fatal at startup. Per-request
/// inference failures never surface here; they are answered on the wire.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("unsupported environment mode: {0}")]
    UnsupportedEnvironment(EnvironmentMode),

    #[error("unknown training config: {0}")]
    UnknownConfig(String),

    #[error("failed to derive data config for {config}")]
    DataConfig {
        config: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to construct policy {config} from {dir}")]
    PolicyConstruction {
        config: String,
        dir: String,
        #[source]
        source: RuntimeError,
    },

    #[error("invalid checkpoint catalog {path}: {reason}")]
    Catalog { path: PathBuf, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors writing a policy record. Logged by the recorder, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("failed to encode record for step {step}: {source}")]
    Encode {
        step: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write record {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for serving operations.
pub type Result<T> = std::result::Result<T, ServeError>;
