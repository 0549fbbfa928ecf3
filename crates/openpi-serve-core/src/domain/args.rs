//! Serving arguments and the enumerations they select from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Port the server listens on when none is given.
pub const DEFAULT_PORT: u16 = 8000;

/// Error returned when a mode or variant name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseModeError {
    kind: &'static str,
    value: String,
    expected: String,
}

/// Deployment environment a policy is served for.
///
/// Serialized through its string form so it can key catalog tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EnvironmentMode {
    Aloha,
    AlohaSim,
    Droid,
    Libero,
}

impl EnvironmentMode {
    pub const ALL: [EnvironmentMode; 4] = [
        EnvironmentMode::Aloha,
        EnvironmentMode::AlohaSim,
        EnvironmentMode::Droid,
        EnvironmentMode::Libero,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentMode::Aloha => "aloha",
            EnvironmentMode::AlohaSim => "aloha_sim",
            EnvironmentMode::Droid => "droid",
            EnvironmentMode::Libero => "libero",
        }
    }
}

impl fmt::Display for EnvironmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseModeError {
                kind: "environment",
                value: s.to_string(),
                expected: Self::ALL.map(|m| m.as_str()).join(", "),
            })
    }
}

impl TryFrom<String> for EnvironmentMode {
    type Error = ParseModeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EnvironmentMode> for String {
    fn from(mode: EnvironmentMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Which checkpoint to serve for the LIBERO environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiberoModelVariant {
    /// LIBERO fine-tuned checkpoint.
    Libero,
    /// Base checkpoint served with LIBERO normalization statistics.
    #[default]
    Base,
}

impl LiberoModelVariant {
    pub const ALL: [LiberoModelVariant; 2] = [LiberoModelVariant::Libero, LiberoModelVariant::Base];

    pub fn as_str(&self) -> &'static str {
        match self {
            LiberoModelVariant::Libero => "libero",
            LiberoModelVariant::Base => "base",
        }
    }
}

impl fmt::Display for LiberoModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LiberoModelVariant {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|variant| variant.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseModeError {
                kind: "LIBERO model type",
                value: s.to_string(),
                expected: Self::ALL.map(|v| v.as_str()).join(", "),
            })
    }
}

/// A training config paired with the checkpoint to restore it from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointDescriptor {
    /// Training config name (e.g. `pi0_aloha_sim`).
    pub config: String,
    /// Checkpoint location, a URI (`gs://...`) or a local path.
    pub dir: String,
}

impl CheckpointDescriptor {
    pub fn new(config: impl Into<String>, dir: impl Into<String>) -> Self {
        Self {
            config: config.into(),
            dir: dir.into(),
        }
    }
}

impl fmt::Display for CheckpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.config, self.dir)
    }
}

/// User input for one serving process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingArguments {
    /// Environment to serve for; only consulted when `policy` is `None`.
    pub env: EnvironmentMode,
    /// Checkpoint choice within LIBERO.
    pub libero_model_variant: LiberoModelVariant,
    /// Prompt used when an observation carries none.
    pub default_prompt: Option<String>,
    pub port: u16,
    /// Record every inference exchange for debugging.
    pub record: bool,
    /// Explicit checkpoint; when set it replaces environment-based selection entirely.
    pub policy: Option<CheckpointDescriptor>,
}

impl Default for ServingArguments {
    fn default() -> Self {
        Self {
            env: EnvironmentMode::AlohaSim,
            libero_model_variant: LiberoModelVariant::default(),
            default_prompt: None,
            port: DEFAULT_PORT,
            record: false,
            policy: None,
        }
    }
}

impl ServingArguments {
    pub fn for_env(env: EnvironmentMode) -> Self {
        Self {
            env,
            ..Self::default()
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: CheckpointDescriptor) -> Self {
        self.policy = Some(checkpoint);
        self
    }

    pub fn with_libero_variant(mut self, variant: LiberoModelVariant) -> Self {
        self.libero_model_variant = variant;
        self
    }

    pub fn with_default_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.default_prompt = Some(prompt.into());
        self
    }
}
