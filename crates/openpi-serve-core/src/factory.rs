//! Policy construction from a resolved spec.

use std::sync::Arc;

use openpi_runtime::{Policy, PolicyLoader, PolicyRequest};

use crate::domain::{ResolvedPolicySpec, Result, ServeError};

/// Builds live policies by delegating to a [`PolicyLoader`].
///
/// The checkpoint location is handed over verbatim; whether it is a remote
/// URI or a local path is the loader's concern.
pub struct PolicyFactory<L> {
    loader: L,
}

impl<L> PolicyFactory<L>
where
    L: PolicyLoader,
{
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Construct the policy. Loader failures become `PolicyConstruction`; no retry.
    pub async fn build(&self, spec: ResolvedPolicySpec) -> Result<Arc<dyn Policy>> {
        let config = spec.train_config.name.clone();
        let dir = spec.checkpoint.dir.clone();
        let request = PolicyRequest {
            train_config: spec.train_config,
            checkpoint_dir: spec.checkpoint.dir,
            default_prompt: spec.default_prompt,
            norm_stats: spec.norm_stats,
        };

        let policy = self
            .loader
            .create_trained_policy(request)
            .await
            .map_err(|source| ServeError::PolicyConstruction {
                config: config.clone(),
                dir,
                source,
            })?;

        crate::obs::emit_policy_built(&config, policy.metadata().action_horizon);
        Ok(policy)
    }
}
