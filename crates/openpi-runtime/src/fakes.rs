//! In-memory fakes for runtime traits (testing only)
//!
//! Provides `EchoPolicy`, `MemoryConfigRegistry`, and `MemoryPolicyLoader`
//! that satisfy the trait contracts without a model runtime or assets on disk.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::config::{ConfigRegistry, DataConfig, NormStats, NormStatsEntry, TrainConfig};
use crate::error::RuntimeError;
use crate::policy::{Actions, Observation, Policy, PolicyLoader, PolicyMetadata, PolicyRequest};
use crate::RuntimeResult;

// ---------------------------------------------------------------------------
// EchoPolicy
// ---------------------------------------------------------------------------

/// Deterministic policy that echoes its input.
///
/// Returns `{"call": n, "echo": <observation>}` where `n` counts calls from zero.
/// An observation with `"fail": true` produces an inference error instead.
#[derive(Debug)]
pub struct EchoPolicy {
    metadata: PolicyMetadata,
    default_prompt: Option<String>,
    calls: AtomicU64,
}

impl EchoPolicy {
    pub fn new(metadata: PolicyMetadata) -> Self {
        Self {
            metadata,
            default_prompt: None,
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_default_prompt(mut self, prompt: Option<String>) -> Self {
        self.default_prompt = prompt;
        self
    }

    /// Number of successful and failed calls so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Policy for EchoPolicy {
    async fn infer(&self, observation: &Observation) -> RuntimeResult<Actions> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if observation.get("fail").and_then(|v| v.as_bool()) == Some(true) {
            return Err(RuntimeError::Inference("observation requested failure".into()));
        }
        let mut echo = observation.clone();
        crate::policy::apply_default_prompt(&mut echo, self.default_prompt.as_deref());
        Ok(json!({ "call": call, "echo": echo }))
    }

    fn metadata(&self) -> &PolicyMetadata {
        &self.metadata
    }
}

// ---------------------------------------------------------------------------
// MemoryConfigRegistry
// ---------------------------------------------------------------------------

/// Config registry backed by a `HashMap<name, (config, stats)>`.
#[derive(Debug, Default)]
pub struct MemoryConfigRegistry {
    configs: HashMap<String, (TrainConfig, Option<NormStats>)>,
}

impl MemoryConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a config and the statistics its data config should expose.
    pub fn with_config(mut self, config: TrainConfig, norm_stats: Option<NormStats>) -> Self {
        self.configs
            .insert(config.name.clone(), (config, norm_stats));
        self
    }
}

impl ConfigRegistry for MemoryConfigRegistry {
    fn get_config(&self, name: &str) -> RuntimeResult<TrainConfig> {
        self.configs
            .get(name)
            .map(|(config, _)| config.clone())
            .ok_or_else(|| RuntimeError::ConfigNotFound(name.to_string()))
    }

    fn data_config(&self, config: &TrainConfig) -> RuntimeResult<DataConfig> {
        let norm_stats = self
            .configs
            .get(&config.name)
            .and_then(|(_, stats)| stats.clone());
        Ok(DataConfig {
            repo_id: config.data.repo_id.clone(),
            asset_id: config.data.assets.asset_id.clone(),
            norm_stats,
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryPolicyLoader
// ---------------------------------------------------------------------------

/// Loader that builds `EchoPolicy` instances and remembers every request.
#[derive(Debug, Default)]
pub struct MemoryPolicyLoader {
    requests: Mutex<Vec<PolicyRequest>>,
    fail_with: Option<String>,
}

impl MemoryPolicyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader whose every construction attempt is rejected with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_with: Some(reason.to_string()),
        }
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<PolicyRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PolicyLoader for MemoryPolicyLoader {
    async fn create_trained_policy(
        &self,
        request: PolicyRequest,
    ) -> RuntimeResult<Arc<dyn Policy>> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(reason) = &self.fail_with {
            return Err(RuntimeError::LoadRejected(reason.clone()));
        }
        let metadata = PolicyMetadata::for_config(&request.train_config, &request.checkpoint_dir);
        Ok(Arc::new(
            EchoPolicy::new(metadata).with_default_prompt(request.default_prompt),
        ))
    }
}

/// Small, fixed statistics for tests.
pub fn sample_norm_stats() -> NormStats {
    let mut map = BTreeMap::new();
    map.insert(
        "state".to_string(),
        NormStatsEntry {
            mean: vec![0.1, 0.2, 0.3],
            std: vec![1.0, 1.0, 1.0],
            q01: Some(vec![-1.0, -1.0, -1.0]),
            q99: Some(vec![1.0, 1.0, 1.0]),
        },
    );
    map.insert(
        "actions".to_string(),
        NormStatsEntry {
            mean: vec![0.0; 7],
            std: vec![0.5; 7],
            q01: None,
            q99: None,
        },
    );
    NormStats(map)
}
