//! Trait contract tests for Policy, PolicyLoader, and ConfigRegistry.
//!
//! These tests verify the behavioral contracts of the runtime traits
//! using in-memory fakes and the builtin registry.

use std::sync::Arc;

use openpi_runtime::fakes::{sample_norm_stats, EchoPolicy, MemoryConfigRegistry, MemoryPolicyLoader};
use openpi_runtime::{
    BuiltinConfigRegistry, ConfigRegistry, ModelConfig, Policy, PolicyLoader, PolicyMetadata,
    PolicyRequest, RuntimeError, TrainConfig,
};
use serde_json::json;

fn request(config: TrainConfig) -> PolicyRequest {
    PolicyRequest {
        train_config: config,
        checkpoint_dir: "/tmp/ckpt".to_string(),
        default_prompt: Some("fold the towel".to_string()),
        norm_stats: None,
    }
}

// ===========================================================================
// Policy contract tests
// ===========================================================================

#[tokio::test]
async fn policy_is_deterministic_for_same_input_and_call_index() {
    let meta = PolicyMetadata::for_config(
        &TrainConfig::new("pi0_aloha_sim", ModelConfig::pi0()),
        "/tmp/ckpt",
    );
    let a = EchoPolicy::new(meta.clone());
    let b = EchoPolicy::new(meta);
    let obs = json!({"state": [1.0, 2.0]});

    assert_eq!(a.infer(&obs).await.unwrap(), b.infer(&obs).await.unwrap());
}

#[tokio::test]
async fn policy_failure_is_an_inference_error() {
    let meta = PolicyMetadata::for_config(
        &TrainConfig::new("pi0_aloha_sim", ModelConfig::pi0()),
        "/tmp/ckpt",
    );
    let policy = EchoPolicy::new(meta);
    let err = policy.infer(&json!({"fail": true})).await.unwrap_err();

    assert!(matches!(err, RuntimeError::Inference(_)));
    assert_eq!(policy.calls(), 1);
}

#[tokio::test]
async fn policy_is_usable_behind_shared_trait_object() {
    let meta = PolicyMetadata::for_config(
        &TrainConfig::new("pi05_droid", ModelConfig::pi05()),
        "gs://bucket/pi05_droid",
    );
    let policy: Arc<dyn Policy> = Arc::new(EchoPolicy::new(meta));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let policy = Arc::clone(&policy);
            tokio::spawn(async move { policy.infer(&json!({ "i": i })).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(policy.metadata().config_name, "pi05_droid");
}

// ===========================================================================
// PolicyLoader contract tests
// ===========================================================================

#[tokio::test]
async fn loader_builds_policy_with_request_metadata() {
    let loader = MemoryPolicyLoader::new();
    let config = TrainConfig::new("custom", ModelConfig::pi0());
    let policy = loader.create_trained_policy(request(config)).await.unwrap();

    assert_eq!(policy.metadata().config_name, "custom");
    assert_eq!(policy.metadata().checkpoint_dir, "/tmp/ckpt");
    assert_eq!(loader.requests().len(), 1);
}

#[tokio::test]
async fn loaded_policy_applies_default_prompt() {
    let loader = MemoryPolicyLoader::new();
    let config = TrainConfig::new("custom", ModelConfig::pi0());
    let policy = loader.create_trained_policy(request(config)).await.unwrap();

    let out = policy.infer(&json!({"state": []})).await.unwrap();
    assert_eq!(out["echo"]["prompt"], "fold the towel");
}

#[tokio::test]
async fn failing_loader_rejects_and_still_records_request() {
    let loader = MemoryPolicyLoader::failing("checkpoint corrupt");
    let config = TrainConfig::new("custom", ModelConfig::pi0());
    let err = loader
        .create_trained_policy(request(config))
        .await
        .err()
        .expect("load should fail");

    assert!(matches!(err, RuntimeError::LoadRejected(reason) if reason == "checkpoint corrupt"));
    assert_eq!(loader.requests().len(), 1);
}

// ===========================================================================
// ConfigRegistry contract tests
// ===========================================================================

#[test]
fn registries_agree_on_not_found() {
    let memory = MemoryConfigRegistry::new();
    let builtin = BuiltinConfigRegistry::new("assets");

    assert!(matches!(
        memory.get_config("missing"),
        Err(RuntimeError::ConfigNotFound(_))
    ));
    assert!(matches!(
        builtin.get_config("missing"),
        Err(RuntimeError::ConfigNotFound(_))
    ));
}

#[test]
fn memory_registry_exposes_configured_stats() {
    let config = TrainConfig::new("pi05_base_libero_norm", ModelConfig::pi05())
        .with_repo("physical-intelligence/libero");
    let registry = MemoryConfigRegistry::new().with_config(config, Some(sample_norm_stats()));

    let config = registry.get_config("pi05_base_libero_norm").unwrap();
    let data = registry.data_config(&config).unwrap();
    assert_eq!(data.norm_stats, Some(sample_norm_stats()));
    assert_eq!(data.repo_id.as_deref(), Some("physical-intelligence/libero"));
}

#[test]
fn norm_stats_file_layout_roundtrips_through_builtin_registry() {
    let dir = tempfile::tempdir().unwrap();
    let registry = BuiltinConfigRegistry::new(dir.path());
    let config = registry.get_config("pi05_libero").unwrap();
    let path = registry.norm_stats_path(&config).unwrap();
    sample_norm_stats().save(&path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert!(raw["norm_stats"]["state"]["mean"].is_array());

    let data = registry.data_config(&config).unwrap();
    let stats = data.norm_stats.expect("stats present");
    assert_eq!(stats.keys().collect::<Vec<_>>(), vec!["actions", "state"]);
}
