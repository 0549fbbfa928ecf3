//! HTTP model-runtime client
//!
//! Delegates policy construction and inference to a separate model-runtime
//! service, so checkpoint restoration and the forward pass stay out of this
//! process.
//!
//! - `POST {base}/v1/policies` with a [`PolicyRequest`] returns a policy id and metadata
//! - `POST {base}/v1/policies/{id}/infer` with an observation returns actions

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::RuntimeError;
use crate::policy::{
    apply_default_prompt, Actions, Observation, Policy, PolicyLoader, PolicyMetadata,
    PolicyRequest,
};
use crate::RuntimeResult;

/// Default model-runtime endpoint.
pub const DEFAULT_RUNTIME_URL: &str = "http://127.0.0.1:8080";

/// Model-runtime connection settings
#[derive(Debug, Clone)]
pub struct HttpRuntimeConfig {
    /// Base URL of the model-runtime service
    pub base_url: String,
    /// User agent sent with every request
    pub user_agent: String,
}

fn default_user_agent() -> String {
    format!("openpi-runtime/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpRuntimeConfig {
    fn default() -> Self {
        HttpRuntimeConfig {
            base_url: std::env::var("OPENPI_RUNTIME_URL")
                .unwrap_or_else(|_| DEFAULT_RUNTIME_URL.to_string()),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpRuntimeConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific runtime
    pub fn new(base_url: &str) -> Self {
        HttpRuntimeConfig {
            base_url: base_url.to_string(),
            user_agent: default_user_agent(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Deserialize)]
struct LoadResponse {
    policy_id: String,
    metadata: PolicyMetadata,
}

/// Loader that asks the model runtime to restore a checkpoint.
pub struct HttpPolicyLoader {
    config: HttpRuntimeConfig,
    client: reqwest::Client,
}

impl HttpPolicyLoader {
    pub fn new(config: HttpRuntimeConfig) -> RuntimeResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(HttpPolicyLoader { config, client })
    }

    /// Create a loader from environment variables
    pub fn from_env() -> RuntimeResult<Self> {
        Self::new(HttpRuntimeConfig::from_env())
    }

    pub fn config(&self) -> &HttpRuntimeConfig {
        &self.config
    }
}

#[async_trait]
impl PolicyLoader for HttpPolicyLoader {
    async fn create_trained_policy(
        &self,
        request: PolicyRequest,
    ) -> RuntimeResult<Arc<dyn Policy>> {
        let url = self.config.endpoint("v1/policies");
        info!(
            config = %request.train_config.name,
            checkpoint_dir = %request.checkpoint_dir,
            runtime = %self.config.base_url,
            "Requesting policy load"
        );

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RuntimeError::CheckpointNotFound(request.checkpoint_dir));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RuntimeError::LoadRejected(format!("{}: {}", status, body)));
        }

        let loaded: LoadResponse = response.json().await?;
        debug!(policy_id = %loaded.policy_id, "Policy loaded by runtime");

        Ok(Arc::new(HttpPolicy {
            infer_url: self
                .config
                .endpoint(&format!("v1/policies/{}/infer", loaded.policy_id)),
            client: self.client.clone(),
            default_prompt: request.default_prompt,
            metadata: loaded.metadata,
        }))
    }
}

/// A policy whose inference runs inside the model runtime.
pub struct HttpPolicy {
    infer_url: String,
    client: reqwest::Client,
    default_prompt: Option<String>,
    metadata: PolicyMetadata,
}

impl HttpPolicy {
    pub fn infer_url(&self) -> &str {
        &self.infer_url
    }
}

#[async_trait]
impl Policy for HttpPolicy {
    async fn infer(&self, observation: &Observation) -> RuntimeResult<Actions> {
        let mut observation = observation.clone();
        apply_default_prompt(&mut observation, self.default_prompt.as_deref());

        let response = self
            .client
            .post(&self.infer_url)
            .json(&observation)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RuntimeError::Inference(format!("{}: {}", status, body)));
        }

        Ok(response.json().await?)
    }

    fn metadata(&self) -> &PolicyMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = HttpRuntimeConfig::new("http://runtime:8080/");
        assert_eq!(
            config.endpoint("v1/policies"),
            "http://runtime:8080/v1/policies"
        );
    }

    #[test]
    fn loader_builds_from_explicit_config() {
        let loader = HttpPolicyLoader::new(HttpRuntimeConfig::new("http://runtime:9000")).unwrap();
        assert_eq!(loader.config().base_url, "http://runtime:9000");
        assert!(loader.config().user_agent.starts_with("openpi-runtime/"));
    }

    #[test]
    fn explicit_config_uses_given_url_and_stock_agent() {
        let config = HttpRuntimeConfig::new("http://gpu-box:8080");
        assert_eq!(config.base_url, "http://gpu-box:8080");
        assert_eq!(config.user_agent, default_user_agent());
    }
}
