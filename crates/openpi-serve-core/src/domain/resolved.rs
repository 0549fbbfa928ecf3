//! The outcome of policy resolution.

use std::fmt;

use openpi_runtime::{NormStats, TrainConfig};
use serde::Serialize;

use super::args::CheckpointDescriptor;

/// Which rule selected the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Explicit checkpoint supplied by the caller.
    Explicit,
    /// LIBERO variant table.
    LiberoVariant,
    /// Environment default table.
    EnvironmentDefault,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolutionSource::Explicit => "explicit",
            ResolutionSource::LiberoVariant => "libero_variant",
            ResolutionSource::EnvironmentDefault => "environment_default",
        })
    }
}

/// A single, fully resolved policy choice.
///
/// `norm_stats` is only ever set for catalog-selected checkpoints whose data
/// config exposes statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPolicySpec {
    pub checkpoint: CheckpointDescriptor,
    pub train_config: TrainConfig,
    pub default_prompt: Option<String>,
    pub norm_stats: Option<NormStats>,
    pub source: ResolutionSource,
}

impl ResolvedPolicySpec {
    pub fn has_norm_stats_override(&self) -> bool {
        self.norm_stats.is_some()
    }
}
