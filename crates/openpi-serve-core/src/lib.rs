//! openpi-serve core library
//!
//! Resolves which trained policy to serve, constructs it, optionally records
//! its behavior, and serves it to robot controllers and simulators.
//!
//! Data flow:
//! `ServingArguments` → [`PolicySpecResolver`] → [`PolicyFactory`] →
//! [`PolicyRecorder`] (optional) → [`PolicyServer`].

pub mod catalog;
pub mod domain;
pub mod factory;
pub mod metrics;
pub mod obs;
pub mod orchestration;
pub mod recording;
pub mod resolver;
pub mod server;
pub mod telemetry;
pub mod wire;

pub use catalog::{CheckpointCatalog, LiberoCheckpoints};
pub use domain::{
    CheckpointDescriptor, EnvironmentMode, LiberoModelVariant, ParseModeError, RecordingError,
    ResolutionSource, ResolvedPolicySpec, Result, ServeError, ServingArguments, DEFAULT_PORT,
};
pub use factory::PolicyFactory;
pub use metrics::METRICS;
pub use orchestration::{PreparedPolicy, ServingPipeline};
pub use recording::{read_records, PolicyRecord, PolicyRecorder, DEFAULT_RECORD_DIR};
pub use resolver::PolicySpecResolver;
pub use server::{BoundServer, PolicyServer, DEFAULT_MAX_FRAME_BYTES};
pub use telemetry::{init_tracing, LogFormat};
pub use wire::ServerFrame;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
