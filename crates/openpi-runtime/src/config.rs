//! Training and data configuration.
//!
//! A [`TrainConfig`] names a model and the assets its data pipeline was
//! trained against. Deriving its [`DataConfig`] is where normalization
//! statistics are discovered: `DataConfig::norm_stats` is an explicit
//! `Option`, so callers never have to probe for the capability.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RuntimeError;
use crate::RuntimeResult;

/// File name holding normalization statistics inside an asset directory.
pub const NORM_STATS_FILE: &str = "norm_stats.json";

/// Model family a training config was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Pi0,
    Pi0Fast,
    Pi05,
}

/// Shape-level description of the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub kind: ModelKind,
    /// Width of a single action vector.
    pub action_dim: usize,
    /// Number of actions predicted per inference call.
    pub action_horizon: usize,
    /// Maximum prompt length in tokens.
    pub max_token_len: usize,
}

impl ModelConfig {
    pub fn pi0() -> Self {
        Self {
            kind: ModelKind::Pi0,
            action_dim: 32,
            action_horizon: 50,
            max_token_len: 48,
        }
    }

    pub fn pi05() -> Self {
        Self {
            kind: ModelKind::Pi05,
            action_dim: 32,
            action_horizon: 50,
            max_token_len: 200,
        }
    }

    pub fn with_action_horizon(mut self, action_horizon: usize) -> Self {
        self.action_horizon = action_horizon;
        self
    }
}

/// Where a config's normalization assets live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Config whose asset directory should be read instead of this config's own.
    ///
    /// Lets a base checkpoint borrow another environment's statistics.
    pub source_config: Option<String>,
    /// Asset id (usually the dataset repo id) under the asset directory.
    pub asset_id: Option<String>,
}

/// Data pipeline description attached to a training config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSpec {
    /// Dataset the config was trained on.
    pub repo_id: Option<String>,
    pub assets: AssetsConfig,
}

/// A named training configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub name: String,
    pub model: ModelConfig,
    pub data: DataSpec,
}

impl TrainConfig {
    pub fn new(name: impl Into<String>, model: ModelConfig) -> Self {
        Self {
            name: name.into(),
            model,
            data: DataSpec::default(),
        }
    }

    /// Set the dataset repo id, also used as the asset id.
    pub fn with_repo(mut self, repo_id: impl Into<String>) -> Self {
        let repo_id = repo_id.into();
        self.data.assets.asset_id = Some(repo_id.clone());
        self.data.repo_id = Some(repo_id);
        self
    }

    /// Read normalization assets from another config's asset directory.
    pub fn with_assets_from(mut self, source_config: impl Into<String>) -> Self {
        self.data.assets.source_config = Some(source_config.into());
        self
    }

    /// Name of the asset directory this config reads from.
    pub fn assets_name(&self) -> &str {
        self.data
            .assets
            .source_config
            .as_deref()
            .unwrap_or(&self.name)
    }
}

/// Per-key normalization statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormStatsEntry {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q01: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q99: Option<Vec<f32>>,
}

/// Normalization statistics keyed by feature name (e.g. `state`, `actions`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormStats(pub BTreeMap<String, NormStatsEntry>);

impl NormStats {
    pub fn get(&self, key: &str) -> Option<&NormStatsEntry> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Load statistics from a `norm_stats.json` file.
    ///
    /// The file wraps the map in a top-level `norm_stats` key.
    pub fn load(path: &Path) -> RuntimeResult<Self> {
        #[derive(Deserialize)]
        struct NormStatsFile {
            norm_stats: NormStats,
        }

        let bytes = std::fs::read(path).map_err(|e| RuntimeError::NormStats {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let file: NormStatsFile =
            serde_json::from_slice(&bytes).map_err(|e| RuntimeError::NormStats {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(file.norm_stats)
    }

    /// Write statistics in the same wrapped layout [`NormStats::load`] reads.
    pub fn save(&self, path: &Path) -> RuntimeResult<()> {
        let body = serde_json::json!({ "norm_stats": self });
        let json = serde_json::to_vec_pretty(&body)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RuntimeError::NormStats {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        std::fs::write(path, json).map_err(|e| RuntimeError::NormStats {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Data configuration derived from a [`TrainConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataConfig {
    pub repo_id: Option<String>,
    pub asset_id: Option<String>,
    /// Present only when statistics were found for this config's assets.
    pub norm_stats: Option<NormStats>,
}

/// Resolves training configs by name and derives their data configs.
pub trait ConfigRegistry: Send + Sync {
    /// Look up a training config. Fails with `ConfigNotFound` if unknown.
    fn get_config(&self, name: &str) -> RuntimeResult<TrainConfig>;

    /// Derive the data config, loading normalization statistics if available.
    fn data_config(&self, config: &TrainConfig) -> RuntimeResult<DataConfig>;
}

impl<T: ConfigRegistry + ?Sized> ConfigRegistry for &T {
    fn get_config(&self, name: &str) -> RuntimeResult<TrainConfig> {
        (**self).get_config(name)
    }

    fn data_config(&self, config: &TrainConfig) -> RuntimeResult<DataConfig> {
        (**self).data_config(config)
    }
}

impl<T: ConfigRegistry + ?Sized> ConfigRegistry for std::sync::Arc<T> {
    fn get_config(&self, name: &str) -> RuntimeResult<TrainConfig> {
        (**self).get_config(name)
    }

    fn data_config(&self, config: &TrainConfig) -> RuntimeResult<DataConfig> {
        (**self).data_config(config)
    }
}

/// Compiled-in training configs with statistics read from an assets directory.
///
/// Layout: `<assets_root>/<assets_name>/<asset_id>/norm_stats.json`
#[derive(Debug, Clone)]
pub struct BuiltinConfigRegistry {
    configs: BTreeMap<String, TrainConfig>,
    assets_root: PathBuf,
}

impl BuiltinConfigRegistry {
    /// Registry holding the stock configs, reading assets under `assets_root`.
    pub fn new(assets_root: impl Into<PathBuf>) -> Self {
        let stock = [
            TrainConfig::new("pi0_aloha_sim", ModelConfig::pi0())
                .with_repo("lerobot/aloha_sim_transfer_cube_human"),
            TrainConfig::new("pi05_aloha", ModelConfig::pi05()).with_repo("trossen"),
            TrainConfig::new("pi05_droid", ModelConfig::pi05().with_action_horizon(15))
                .with_repo("droid"),
            TrainConfig::new("pi05_libero", ModelConfig::pi05().with_action_horizon(10))
                .with_repo("physical-intelligence/libero"),
            TrainConfig::new(
                "pi05_base_libero_norm",
                ModelConfig::pi05().with_action_horizon(10),
            )
            .with_repo("physical-intelligence/libero")
            .with_assets_from("pi05_libero"),
        ];

        Self {
            configs: stock
                .into_iter()
                .map(|config| (config.name.clone(), config))
                .collect(),
            assets_root: assets_root.into(),
        }
    }

    /// Register an additional config, replacing any with the same name.
    pub fn with_config(mut self, config: TrainConfig) -> Self {
        self.configs.insert(config.name.clone(), config);
        self
    }

    /// Names of all registered configs, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn assets_root(&self) -> &Path {
        &self.assets_root
    }

    /// Path where statistics for `config` are expected, if it names an asset id.
    pub fn norm_stats_path(&self, config: &TrainConfig) -> Option<PathBuf> {
        let asset_id = config.data.assets.asset_id.as_deref()?;
        Some(
            self.assets_root
                .join(config.assets_name())
                .join(asset_id)
                .join(NORM_STATS_FILE),
        )
    }
}

impl ConfigRegistry for BuiltinConfigRegistry {
    fn get_config(&self, name: &str) -> RuntimeResult<TrainConfig> {
        self.configs
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::ConfigNotFound(name.to_string()))
    }

    fn data_config(&self, config: &TrainConfig) -> RuntimeResult<DataConfig> {
        let norm_stats = match self.norm_stats_path(config) {
            Some(path) if path.exists() => Some(NormStats::load(&path)?),
            Some(path) => {
                debug!(config = %config.name, path = %path.display(), "no norm stats on disk");
                None
            }
            None => None,
        };

        Ok(DataConfig {
            repo_id: config.data.repo_id.clone(),
            asset_id: config.data.assets.asset_id.clone(),
            norm_stats,
        })
    }
}
