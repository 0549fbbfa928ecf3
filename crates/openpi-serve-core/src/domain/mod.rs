//! Domain models for policy serving.
//!
//! Canonical definitions for the core entities:
//! - `EnvironmentMode` / `LiberoModelVariant`: closed sets of deployment targets
//! - `CheckpointDescriptor`: a loadable training config + checkpoint location
//! - `ServingArguments`: user input, fixed at startup
//! - `ResolvedPolicySpec`: the single checkpoint chosen for this process

pub mod args;
pub mod error;
pub mod resolved;

pub use args::{
    CheckpointDescriptor, EnvironmentMode, LiberoModelVariant, ParseModeError, ServingArguments,
    DEFAULT_PORT,
};
pub use error::{RecordingError, Result, ServeError};
pub use resolved::{ResolutionSource, ResolvedPolicySpec};
