//! Checkpoint catalog: which checkpoint each environment serves by default.
//!
//! The catalog is plain data handed to the resolver. [`CheckpointCatalog::builtin`]
//! holds the published checkpoints; [`CheckpointCatalog::from_path`] loads an
//! alternate table from TOML or JSON.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{
    CheckpointDescriptor, EnvironmentMode, LiberoModelVariant, Result, ServeError,
};

const ASSETS_BUCKET: &str = "gs://openpi-assets/checkpoints";

fn published(config: &str, checkpoint: &str) -> CheckpointDescriptor {
    CheckpointDescriptor::new(config, format!("{}/{}", ASSETS_BUCKET, checkpoint))
}

/// LIBERO checkpoints, one per [`LiberoModelVariant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiberoCheckpoints {
    pub libero: CheckpointDescriptor,
    pub base: CheckpointDescriptor,
}

impl LiberoCheckpoints {
    pub fn get(&self, variant: LiberoModelVariant) -> &CheckpointDescriptor {
        match variant {
            LiberoModelVariant::Libero => &self.libero,
            LiberoModelVariant::Base => &self.base,
        }
    }
}

/// Immutable environment → checkpoint tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointCatalog {
    #[serde(default)]
    defaults: BTreeMap<EnvironmentMode, CheckpointDescriptor>,
    libero: LiberoCheckpoints,
}

impl CheckpointCatalog {
    pub fn new(
        defaults: BTreeMap<EnvironmentMode, CheckpointDescriptor>,
        libero: LiberoCheckpoints,
    ) -> Self {
        Self { defaults, libero }
    }

    /// The published checkpoints.
    pub fn builtin() -> Self {
        let defaults = BTreeMap::from([
            (EnvironmentMode::Aloha, published("pi05_aloha", "pi05_base")),
            (
                EnvironmentMode::AlohaSim,
                published("pi0_aloha_sim", "pi0_aloha_sim"),
            ),
            (EnvironmentMode::Droid, published("pi05_droid", "pi05_droid")),
            (EnvironmentMode::Libero, published("pi05_libero", "pi05_libero")),
        ]);
        let libero = LiberoCheckpoints {
            libero: published("pi05_libero", "pi05_libero"),
            base: published("pi05_base_libero_norm", "pi05_base"),
        };
        Self { defaults, libero }
    }

    /// Load a catalog from a `.toml` or `.json` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let catalog_err = |reason: String| ServeError::Catalog {
            path: path.to_path_buf(),
            reason,
        };

        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&text).map_err(|e| catalog_err(e.to_string())),
            Some("json") => serde_json::from_str(&text).map_err(|e| catalog_err(e.to_string())),
            other => Err(catalog_err(format!(
                "unsupported catalog format {:?}, expected .toml or .json",
                other.unwrap_or("")
            ))),
        }
    }

    /// Default checkpoint for `env`.
    pub fn lookup_default(&self, env: EnvironmentMode) -> Result<&CheckpointDescriptor> {
        self.defaults
            .get(&env)
            .ok_or(ServeError::UnsupportedEnvironment(env))
    }

    /// LIBERO checkpoint for `variant`. Total over the variant set.
    pub fn lookup_libero(&self, variant: LiberoModelVariant) -> &CheckpointDescriptor {
        self.libero.get(variant)
    }

    /// Environments with a default checkpoint, in sorted order.
    pub fn environments(&self) -> impl Iterator<Item = EnvironmentMode> + '_ {
        self.defaults.keys().copied()
    }

    /// Copy of this catalog with `env`'s default removed.
    pub fn without_default(mut self, env: EnvironmentMode) -> Self {
        self.defaults.remove(&env);
        self
    }

    /// Copy of this catalog with `env`'s default replaced.
    pub fn with_default(mut self, env: EnvironmentMode, checkpoint: CheckpointDescriptor) -> Self {
        self.defaults.insert(env, checkpoint);
        self
    }
}

impl Default for CheckpointCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
