//! openpi-runtime: collaborator seams for policy serving
//!
//! This crate owns everything the serving layer treats as external:
//! how a training configuration is looked up, how normalization statistics
//! are found, and how a trained policy is constructed and queried.
//!
//! ## Layer 0 - Runtime
//!
//! ## Key Components
//!
//! - `Policy`: runtime object exposing inference and metadata
//! - `PolicyLoader`: constructs a `Policy` from a training config and checkpoint
//! - `ConfigRegistry`: resolves training configs and their data configs
//! - `BuiltinConfigRegistry`: compiled-in configs, norm stats read from an assets dir
//! - `HttpPolicyLoader`: delegates construction and inference to a model-runtime service
//!
//! In-memory fakes for tests live in [`fakes`].

pub mod config;
mod error;
pub mod fakes;
pub mod http;
pub mod policy;

pub use config::{
    AssetsConfig, BuiltinConfigRegistry, ConfigRegistry, DataConfig, DataSpec, ModelConfig,
    ModelKind, NormStats, NormStatsEntry, TrainConfig,
};
pub use error::RuntimeError;
pub use http::{HttpPolicy, HttpPolicyLoader, HttpRuntimeConfig};
pub use policy::{
    apply_default_prompt, Actions, Observation, Policy, PolicyLoader, PolicyMetadata,
    PolicyRequest,
};

/// Result type for runtime operations
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
