//! Policy resolution: serving arguments → one concrete checkpoint.
//!
//! Rules, first match wins:
//! 1. An explicit checkpoint is used as-is, with no normalization override.
//! 2. LIBERO picks from the LIBERO variant table.
//! 3. Any other environment uses its catalog default, or fails with
//!    `UnsupportedEnvironment`.
//!
//! For rules 2 and 3 the training config's data config is derived and its
//! normalization statistics, when present, become the override.

use openpi_runtime::{ConfigRegistry, RuntimeError, TrainConfig};

use crate::catalog::CheckpointCatalog;
use crate::domain::{
    CheckpointDescriptor, EnvironmentMode, ResolutionSource, ResolvedPolicySpec, Result,
    ServeError, ServingArguments,
};

/// Resolves [`ServingArguments`] against a catalog and a config registry.
pub struct PolicySpecResolver<R> {
    catalog: CheckpointCatalog,
    configs: R,
}

impl<R> PolicySpecResolver<R>
where
    R: ConfigRegistry,
{
    pub fn new(catalog: CheckpointCatalog, configs: R) -> Self {
        Self { catalog, configs }
    }

    pub fn catalog(&self) -> &CheckpointCatalog {
        &self.catalog
    }

    /// Pick the checkpoint without touching the config registry.
    pub fn select_checkpoint(
        &self,
        args: &ServingArguments,
    ) -> Result<(CheckpointDescriptor, ResolutionSource)> {
        if let Some(explicit) = &args.policy {
            return Ok((explicit.clone(), ResolutionSource::Explicit));
        }
        if args.env == EnvironmentMode::Libero {
            let checkpoint = self.catalog.lookup_libero(args.libero_model_variant);
            return Ok((checkpoint.clone(), ResolutionSource::LiberoVariant));
        }
        let checkpoint = self.catalog.lookup_default(args.env)?;
        Ok((checkpoint.clone(), ResolutionSource::EnvironmentDefault))
    }

    /// Resolve the arguments into a single policy spec.
    pub fn resolve(&self, args: &ServingArguments) -> Result<ResolvedPolicySpec> {
        let (checkpoint, source) = self.select_checkpoint(args)?;
        let train_config = self.train_config(&checkpoint.config)?;

        let norm_stats = match source {
            ResolutionSource::Explicit => None,
            ResolutionSource::LiberoVariant | ResolutionSource::EnvironmentDefault => {
                self.configs
                    .data_config(&train_config)
                    .map_err(|source| ServeError::DataConfig {
                        config: train_config.name.clone(),
                        source,
                    })?
                    .norm_stats
            }
        };

        let spec = ResolvedPolicySpec {
            checkpoint,
            train_config,
            default_prompt: args.default_prompt.clone(),
            norm_stats,
            source,
        };
        crate::obs::emit_policy_resolved(&spec);
        Ok(spec)
    }

    fn train_config(&self, name: &str) -> Result<TrainConfig> {
        self.configs.get_config(name).map_err(|err| match err {
            RuntimeError::ConfigNotFound(name) => ServeError::UnknownConfig(name),
            source => ServeError::DataConfig {
                config: name.to_string(),
                source,
            },
        })
    }
}
