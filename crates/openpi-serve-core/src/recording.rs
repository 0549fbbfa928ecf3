//! Policy recording decorator.
//!
//! [`PolicyRecorder`] wraps any [`Policy`] and writes every successful
//! inference exchange to `<record_dir>/step_<n>.json` before handing the
//! result back. Writing is best-effort: a failed write is logged and counted,
//! and the caller still receives the inner policy's output unchanged. The same
//! holds for creating the record directory when the recorder is built.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use openpi_runtime::{Actions, Observation, Policy, PolicyMetadata, RuntimeResult};
use serde::{Deserialize, Serialize};

use crate::domain::RecordingError;
use crate::metrics::METRICS;

/// Directory records go to when none is configured.
pub const DEFAULT_RECORD_DIR: &str = "policy_records";

/// One recorded inference exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Zero-based position of this exchange in the recording.
    pub step: u64,
    pub recorded_at: DateTime<Utc>,
    pub inputs: Observation,
    pub outputs: Actions,
}

/// Recording wrapper around a policy.
pub struct PolicyRecorder {
    inner: Arc<dyn Policy>,
    record_dir: PathBuf,
    next_step: AtomicU64,
}

impl PolicyRecorder {
    /// Wrap `inner`, recording into `record_dir`.
    ///
    /// The directory is created here. Failing to create it is logged and the
    /// recorder is returned anyway; each write retries the creation.
    pub fn wrap(inner: Arc<dyn Policy>, record_dir: impl Into<PathBuf>) -> Self {
        let record_dir = record_dir.into();
        tracing::info!(record_dir = %record_dir.display(), "Recording policy behavior");
        if let Err(err) = std::fs::create_dir_all(&record_dir) {
            crate::obs::emit_record_dir_unavailable(&record_dir, &err);
        }
        Self {
            inner,
            record_dir,
            next_step: AtomicU64::new(0),
        }
    }

    pub fn record_dir(&self) -> &Path {
        &self.record_dir
    }

    /// Path of the record for `step`.
    pub fn record_path(&self, step: u64) -> PathBuf {
        self.record_dir.join(format!("step_{}.json", step))
    }

    /// Number of exchanges that have been assigned a step so far.
    pub fn steps(&self) -> u64 {
        self.next_step.load(Ordering::SeqCst)
    }

    async fn write_record(&self, record: &PolicyRecord) -> Result<PathBuf, RecordingError> {
        let path = self.record_path(record.step);
        let json = serde_json::to_vec_pretty(record).map_err(|source| RecordingError::Encode {
            step: record.step,
            source,
        })?;

        tokio::fs::create_dir_all(&self.record_dir)
            .await
            .map_err(|source| RecordingError::Write {
                path: self.record_dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| RecordingError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

#[async_trait]
impl Policy for PolicyRecorder {
    async fn infer(&self, observation: &Observation) -> RuntimeResult<Actions> {
        let outputs = self.inner.infer(observation).await?;

        let record = PolicyRecord {
            step: self.next_step.fetch_add(1, Ordering::SeqCst),
            recorded_at: Utc::now(),
            inputs: observation.clone(),
            outputs,
        };
        match self.write_record(&record).await {
            Ok(path) => {
                METRICS.inc_records_written();
                tracing::debug!(step = record.step, path = %path.display(), "Recorded exchange");
            }
            Err(err) => {
                METRICS.inc_record_failures();
                crate::obs::emit_record_write_failed(record.step, &err);
            }
        }
        Ok(record.outputs)
    }

    fn metadata(&self) -> &PolicyMetadata {
        self.inner.metadata()
    }
}

/// Read back every record in `record_dir`, ordered by step.
pub fn read_records(record_dir: &Path) -> crate::domain::Result<Vec<PolicyRecord>> {
    let mut records = Vec::new();
    for entry in std::fs::read_dir(record_dir)? {
        let path = entry?.path();
        let is_record = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("step_") && name.ends_with(".json"))
            .unwrap_or(false);
        if !is_record {
            continue;
        }
        let record: PolicyRecord = serde_json::from_slice(&std::fs::read(&path)?)?;
        records.push(record);
    }
    records.sort_by_key(|record| record.step);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpi_runtime::fakes::EchoPolicy;
    use openpi_runtime::{ModelConfig, TrainConfig};
    use serde_json::json;

    fn echo() -> Arc<dyn Policy> {
        let config = TrainConfig::new("pi0_aloha_sim", ModelConfig::pi0());
        Arc::new(EchoPolicy::new(PolicyMetadata::for_config(
            &config,
            "gs://openpi-assets/checkpoints/pi0_aloha_sim",
        )))
    }

    #[tokio::test]
    async fn records_one_file_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = PolicyRecorder::wrap(echo(), dir.path().join("records"));

        recorder.infer(&json!({"t": 0})).await.unwrap();
        recorder.infer(&json!({"t": 1})).await.unwrap();

        assert!(recorder.record_path(0).exists());
        assert!(recorder.record_path(1).exists());
        assert!(!recorder.record_path(2).exists());
        assert_eq!(recorder.steps(), 2);
    }

    #[tokio::test]
    async fn metadata_is_delegated() {
        let inner = echo();
        let expected = inner.metadata().clone();
        let recorder = PolicyRecorder::wrap(inner, DEFAULT_RECORD_DIR);
        assert_eq!(recorder.metadata(), &expected);
    }

    #[tokio::test]
    async fn inner_failure_propagates_and_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = PolicyRecorder::wrap(echo(), dir.path());

        assert!(recorder.infer(&json!({"fail": true})).await.is_err());
        assert_eq!(recorder.steps(), 0);
        assert!(!recorder.record_path(0).exists());
    }

    #[test]
    fn read_records_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        let records = read_records(dir.path()).unwrap();
        assert!(records.is_empty());
    }
}
