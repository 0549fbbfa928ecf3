//! serve-policy - serve a trained policy to robot controllers and simulators
//!
//! Picks the checkpoint for the requested environment (or an explicit one),
//! asks the model runtime to load it, and serves it on `0.0.0.0:<port>`.
//!
//! ## Examples
//!
//! - `serve-policy --env aloha_sim`
//! - `serve-policy --env libero --libero-model-type base --record`
//! - `serve-policy --policy-config pi05_droid --policy-dir ./checkpoints/pi05_droid/exp/30000`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use openpi_runtime::http::DEFAULT_RUNTIME_URL;
use openpi_runtime::{BuiltinConfigRegistry, HttpPolicyLoader, HttpRuntimeConfig};
use openpi_serve_core::{
    init_tracing, CheckpointCatalog, CheckpointDescriptor, EnvironmentMode, LiberoModelVariant,
    LogFormat, PolicyFactory, PolicySpecResolver, ServingArguments, ServingPipeline,
    DEFAULT_RECORD_DIR,
};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "serve-policy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serve a trained robot-control policy for real-time inference", long_about = None)]
struct Cli {
    /// Environment to serve the default policy for (ignored with --policy-config)
    #[arg(long, env = "OPENPI_ENV", default_value = "aloha_sim")]
    env: EnvironmentMode,

    /// Checkpoint to use for the LIBERO environment (libero | base)
    #[arg(long = "libero-model-type", default_value = "base")]
    libero_model_type: LiberoModelVariant,

    /// Prompt used when an observation carries none
    #[arg(long)]
    default_prompt: Option<String>,

    /// Port to serve the policy on
    #[arg(long, env = "OPENPI_PORT", default_value_t = openpi_serve_core::DEFAULT_PORT)]
    port: u16,

    /// Record every inference exchange for debugging
    #[arg(long)]
    record: bool,

    /// Directory records are written to
    #[arg(long, default_value = DEFAULT_RECORD_DIR)]
    record_dir: PathBuf,

    /// Training config of an explicit checkpoint (e.g. pi0_aloha_sim)
    #[arg(long, requires = "policy_dir")]
    policy_config: Option<String>,

    /// Explicit checkpoint directory or URI
    #[arg(long, requires = "policy_config")]
    policy_dir: Option<String>,

    /// Alternate checkpoint catalog (.toml or .json)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Root directory holding normalization assets
    #[arg(long, env = "OPENPI_ASSETS_DIR", default_value = "assets")]
    assets_dir: PathBuf,

    /// Base URL of the model-runtime service
    #[arg(long, env = "OPENPI_RUNTIME_URL", default_value = DEFAULT_RUNTIME_URL)]
    runtime_url: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn serving_arguments(&self) -> ServingArguments {
        let policy = match (&self.policy_config, &self.policy_dir) {
            (Some(config), Some(dir)) => Some(CheckpointDescriptor::new(config, dir)),
            _ => None,
        };
        ServingArguments {
            env: self.env,
            libero_model_variant: self.libero_model_type,
            default_prompt: self.default_prompt.clone(),
            port: self.port,
            record: self.record,
            policy,
        }
    }

    fn checkpoint_catalog(&self) -> Result<CheckpointCatalog> {
        match &self.catalog {
            Some(path) => CheckpointCatalog::from_path(path)
                .with_context(|| format!("Failed to load checkpoint catalog {}", path.display())),
            None => Ok(CheckpointCatalog::builtin()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_json_flag(cli.json), level);

    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let args = cli.serving_arguments();
    let catalog = cli.checkpoint_catalog()?;
    let registry = BuiltinConfigRegistry::new(&cli.assets_dir);
    let loader = HttpPolicyLoader::new(HttpRuntimeConfig::new(&cli.runtime_url))
        .context("Failed to create model-runtime client")?;

    let pipeline = ServingPipeline::new(
        PolicySpecResolver::new(catalog, registry),
        PolicyFactory::new(loader),
    )
    .with_record_dir(&cli.record_dir);

    info!(
        env = %args.env,
        port = args.port,
        record = args.record,
        runtime = %cli.runtime_url,
        "Starting policy server"
    );
    pipeline
        .run(&args)
        .await
        .context("Policy server stopped")
}
