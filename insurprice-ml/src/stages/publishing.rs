//! Publishing: upload an accepted model under the fixed remote key.

use crate::artifacts::{EvaluationResult, ModelArtifact, PublishArtifact};
use crate::remote::ModelStore;
use insurprice_core::config::RemoteStoreConfig;
use insurprice_core::{PipelineError, Result};
use tracing::info;

/// Returns `None` without touching the store when the model was not accepted.
pub async fn publish(
    model: &ModelArtifact,
    evaluation: &EvaluationResult,
    store: &dyn ModelStore,
    remote: &RemoteStoreConfig,
) -> Result<Option<PublishArtifact>> {
    if !evaluation.is_model_accepted {
        info!("Model not accepted, skipping publish");
        return Ok(None);
    }

    store
        .upload(&model.model_path, &remote.model_key, &remote.bucket)
        .await
        .map_err(|e| {
            PipelineError::publish(
                format!("uploading to {}/{}", remote.bucket, remote.model_key),
                e,
            )
        })?;

    info!(
        store = %store.describe(),
        bucket = %remote.bucket,
        key = %remote.model_key,
        digest = %model.model_digest,
        "Model published"
    );
    Ok(Some(PublishArtifact {
        bucket: remote.bucket.clone(),
        key: remote.model_key.clone(),
        model_digest: model.model_digest.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RegressionMetrics;
    use crate::remote::LocalObjectStore;
    use crate::stages::evaluation::decide;
    use insurprice_core::{AcceptancePolicy, ErrorKind};
    use tempfile::TempDir;

    fn model_artifact(dir: &TempDir) -> ModelArtifact {
        let model_path = dir.path().join("insurance_price_model.bin");
        std::fs::write(&model_path, b"model").unwrap();
        ModelArtifact {
            model_path,
            model_digest: "abc".into(),
            train_metrics: RegressionMetrics {
                mse: 0.0,
                rmse: 0.0,
                mae: 0.0,
                r_squared: 1.0,
                explained_variance: None,
            },
        }
    }

    #[tokio::test]
    async fn test_publish_accepted_model() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path().join("remote"));
        let remote = RemoteStoreConfig::default();
        let evaluation = decide(0.7, None, AcceptancePolicy::AlwaysAccept);

        let published = publish(&model_artifact(&dir), &evaluation, &store, &remote)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(published.bucket, "insurprice-io-files");
        assert_eq!(published.key, "insurance_price_model.bin");
        assert!(store.exists(&published.bucket, &published.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_model_is_not_uploaded() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path().join("remote"));
        let remote = RemoteStoreConfig::default();
        let evaluation = decide(0.5, Some(0.9), AcceptancePolicy::RequireImprovement);

        let published = publish(&model_artifact(&dir), &evaluation, &store, &remote)
            .await
            .unwrap();
        assert!(published.is_none());
        assert!(!store.exists(&remote.bucket, &remote.model_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_failure_is_publish_error() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path().join("remote"));
        let remote = RemoteStoreConfig::default();
        let mut artifact = model_artifact(&dir);
        artifact.model_path = dir.path().join("does-not-exist.bin");
        let evaluation = decide(0.7, None, AcceptancePolicy::AlwaysAccept);

        let err = publish(&artifact, &evaluation, &store, &remote)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Publish);
    }
}
