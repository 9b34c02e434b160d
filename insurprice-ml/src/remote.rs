//! Remote object store holding the published model.

use async_trait::async_trait;
use insurprice_core::config::{RemoteStoreConfig, RemoteStoreKind};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("object {bucket}/{key} does not exist")]
    NotFound { bucket: String, key: String },

    #[error("invalid object key {0:?}")]
    InvalidKey(String),

    #[error("{method} {url} returned status {status}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
    },
}

/// Bucket/key object storage for model files.
///
/// Uploads overwrite; the last writer wins.
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError>;

    async fn upload(&self, local_path: &Path, key: &str, bucket: &str) -> Result<(), StoreError>;

    /// Download an object into `dest_dir`, returning the local file path.
    async fn download(&self, key: &str, bucket: &str, dest_dir: &Path)
    -> Result<PathBuf, StoreError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Build the store selected by configuration.
pub fn build_model_store(config: &RemoteStoreConfig) -> Arc<dyn ModelStore> {
    match config.kind {
        RemoteStoreKind::LocalDir => Arc::new(LocalObjectStore::new(&config.location)),
        RemoteStoreKind::Http => Arc::new(HttpObjectStore::new(
            &config.location,
            config.auth_token.clone(),
        )),
    }
}

/// Keys are relative paths without `.` or `..` segments.
fn check_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

fn local_file_name(key: &str) -> Result<&str, StoreError> {
    key.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| StoreError::InvalidKey(key.to_string()))
}

// ---------------------------------------------------------------------------
// LocalObjectStore
// ---------------------------------------------------------------------------

/// Buckets are sub-directories of `root`.
pub struct LocalObjectStore {
    pub root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        check_key(bucket)?;
        check_key(key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ModelStore for LocalObjectStore {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.object_path(bucket, key)?).await?)
    }

    async fn upload(&self, local_path: &Path, key: &str, bucket: &str) -> Result<(), StoreError> {
        let target = self.object_path(bucket, key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = target.with_extension("tmp");
        tokio::fs::copy(local_path, &tmp).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }

    async fn download(
        &self,
        key: &str,
        bucket: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, StoreError> {
        let source = self.object_path(bucket, key)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(local_file_name(key)?);
        tokio::fs::copy(&source, &dest).await?;
        Ok(dest)
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}

// ---------------------------------------------------------------------------
// HttpObjectStore
// ---------------------------------------------------------------------------

/// Object storage over plain HTTP: `HEAD`, `PUT` and `GET` on
/// `{endpoint}/{bucket}/{key}`, with an optional bearer token.
pub struct HttpObjectStore {
    pub endpoint: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(endpoint: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            auth_token,
            client: reqwest::Client::new(),
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<String, StoreError> {
        check_key(bucket)?;
        check_key(key)?;
        Ok(format!("{}/{bucket}/{key}", self.endpoint))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ModelStore for HttpObjectStore {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        let url = self.object_url(bucket, key)?;
        let response = self.authorize(self.client.head(&url)).send().await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(StoreError::Status {
                method: "HEAD",
                url,
                status: s.as_u16(),
            }),
        }
    }

    async fn upload(&self, local_path: &Path, key: &str, bucket: &str) -> Result<(), StoreError> {
        let url = self.object_url(bucket, key)?;
        let body = tokio::fs::read(local_path).await?;
        let response = self
            .authorize(self.client.put(&url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StoreError::Status {
                method: "PUT",
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn download(
        &self,
        key: &str,
        bucket: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, StoreError> {
        let url = self.object_url(bucket, key)?;
        let response = self.authorize(self.client.get(&url)).send().await?;
        match response.status() {
            s if s.is_success() => {}
            reqwest::StatusCode::NOT_FOUND => {
                return Err(StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            s => {
                return Err(StoreError::Status {
                    method: "GET",
                    url,
                    status: s.as_u16(),
                });
            }
        }
        let bytes = response.bytes().await?;
        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(local_file_name(key)?);
        let tmp = dest.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &dest).await?;
        Ok(dest)
    }

    fn describe(&self) -> String {
        self.endpoint.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_store_upload_exists_download() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path().join("remote"));
        let local = dir.path().join("model.bin");
        std::fs::write(&local, b"v1").unwrap();

        assert!(!store.exists("bucket", "model.bin").await.unwrap());
        store.upload(&local, "model.bin", "bucket").await.unwrap();
        assert!(store.exists("bucket", "model.bin").await.unwrap());

        let fetched = store
            .download("model.bin", "bucket", &dir.path().join("cache"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(fetched).unwrap(), b"v1");
    }

    #[tokio::test]
    async fn test_local_store_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path().join("remote"));
        let local = dir.path().join("model.bin");

        std::fs::write(&local, b"first").unwrap();
        store.upload(&local, "models/price.bin", "b").await.unwrap();
        std::fs::write(&local, b"second").unwrap();
        store.upload(&local, "models/price.bin", "b").await.unwrap();

        let fetched = store
            .download("models/price.bin", "b", &dir.path().join("cache"))
            .await
            .unwrap();
        assert_eq!(fetched.file_name().unwrap(), "price.bin");
        assert_eq!(std::fs::read(fetched).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_local_store_download_missing() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let err = store
            .download("missing.bin", "bucket", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_bucket() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(matches!(
            store.exists("bucket", "../secret").await,
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            store.exists("bucket", "/etc/passwd").await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_http_store_object_url() {
        let store = HttpObjectStore::new("https://objects.example.com/", None);
        assert_eq!(
            store.object_url("insurprice-io-files", "insurance_price_model.bin").unwrap(),
            "https://objects.example.com/insurprice-io-files/insurance_price_model.bin"
        );
        assert_eq!(store.describe(), "https://objects.example.com");
    }

    #[test]
    fn test_build_model_store_by_kind() {
        let mut config = RemoteStoreConfig::default();
        assert!(build_model_store(&config).describe().starts_with("local:"));
        config.kind = RemoteStoreKind::Http;
        config.location = "http://localhost:9000".into();
        assert_eq!(build_model_store(&config).describe(), "http://localhost:9000");
    }
}
