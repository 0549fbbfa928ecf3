//! Policy and loader trait definitions.
//!
//! - `Policy`: maps an observation to actions, and describes itself via metadata
//! - `PolicyLoader`: builds a `Policy` from a training config and checkpoint
//!
//! Both traits are async and backend-agnostic. Observations and actions are
//! opaque JSON values at this layer.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{ModelKind, NormStats, TrainConfig};
use crate::RuntimeResult;

/// Observation sent by a robot controller or simulator.
pub type Observation = Value;

/// Actions returned by a policy for one observation.
pub type Actions = Value;

/// Description of a served policy, handed to clients before the first exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub config_name: String,
    pub model_kind: ModelKind,
    pub action_dim: usize,
    pub action_horizon: usize,
    pub checkpoint_dir: String,
    /// Runtime-specific extras, passed through untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl PolicyMetadata {
    /// Metadata derived from a training config and checkpoint location.
    pub fn for_config(config: &TrainConfig, checkpoint_dir: &str) -> Self {
        Self {
            config_name: config.name.clone(),
            model_kind: config.model.kind,
            action_dim: config.model.action_dim,
            action_horizon: config.model.action_horizon,
            checkpoint_dir: checkpoint_dir.to_string(),
            extra: Map::new(),
        }
    }
}

/// A runtime policy.
///
/// Implementations must tolerate concurrent `infer` calls: one instance
/// serves every connection.
#[async_trait]
pub trait Policy: Send + Sync {
    /// Run inference for a single observation.
    async fn infer(&self, observation: &Observation) -> RuntimeResult<Actions>;

    /// Describe the policy (model identity, action shapes).
    fn metadata(&self) -> &PolicyMetadata;
}

/// Everything a loader needs to construct a trained policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyRequest {
    pub train_config: TrainConfig,
    /// Remote URI or local path; passed through verbatim.
    pub checkpoint_dir: String,
    /// Prompt used when an observation carries none.
    pub default_prompt: Option<String>,
    /// Statistics to use instead of those stored with the checkpoint.
    pub norm_stats: Option<NormStats>,
}

/// Constructs trained policies.
#[async_trait]
pub trait PolicyLoader: Send + Sync {
    /// Build a policy. Errors are returned as-is; callers do not retry.
    async fn create_trained_policy(
        &self,
        request: PolicyRequest,
    ) -> RuntimeResult<Arc<dyn Policy>>;
}

/// Insert `default_prompt` under `prompt` when the observation has none.
///
/// Non-object observations are left untouched.
pub fn apply_default_prompt(observation: &mut Observation, default_prompt: Option<&str>) {
    let (Some(prompt), Some(fields)) = (default_prompt, observation.as_object_mut()) else {
        return;
    };
    if !fields.contains_key("prompt") {
        fields.insert("prompt".to_string(), Value::String(prompt.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use serde_json::json;

    #[test]
    fn default_prompt_fills_missing_key() {
        let mut obs = json!({"state": [0.0, 1.0]});
        apply_default_prompt(&mut obs, Some("pick up the cube"));
        assert_eq!(obs["prompt"], "pick up the cube");
    }

    #[test]
    fn default_prompt_does_not_override_client_prompt() {
        let mut obs = json!({"prompt": "open the drawer"});
        apply_default_prompt(&mut obs, Some("pick up the cube"));
        assert_eq!(obs["prompt"], "open the drawer");
    }

    #[test]
    fn default_prompt_ignores_non_objects() {
        let mut obs = json!([1, 2, 3]);
        apply_default_prompt(&mut obs, Some("pick up the cube"));
        assert_eq!(obs, json!([1, 2, 3]));

        let mut obs = json!({"state": []});
        apply_default_prompt(&mut obs, None);
        assert!(obs.get("prompt").is_none());
    }

    #[test]
    fn metadata_mirrors_model_config() {
        let config = TrainConfig::new("pi0_aloha_sim", ModelConfig::pi0());
        let meta = PolicyMetadata::for_config(&config, "gs://bucket/pi0_aloha_sim");
        assert_eq!(meta.config_name, "pi0_aloha_sim");
        assert_eq!(meta.model_kind, ModelKind::Pi0);
        assert_eq!(meta.action_horizon, 50);

        let value = serde_json::to_value(&meta).unwrap();
        assert!(value.get("extra").is_none());
        assert_eq!(value["model_kind"], "pi0");
    }
}
