//! Document-store clients returning raw records as a [`RecordBatch`].

use crate::data::batch::{DOCUMENT_ID_FIELD, NotAnObject, RecordBatch};
use async_trait::async_trait;
use insurprice_core::config::{DataSourceConfig, DataSourceKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Failure reaching or reading a document store.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("collection {database}.{collection} not found")]
    NotFound {
        database: String,
        collection: String,
    },

    #[error(transparent)]
    NotAnObject(#[from] NotAnObject),

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("background task failed: {0}")]
    Task(String),
}

/// Information about a data source for lineage tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub source_type: String,
    pub location: String,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
    pub row_count: Option<usize>,
}

/// A store holding the raw insurance records.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch every document of a collection as rows.
    ///
    /// The store's internal `_id` field never appears in the result.
    async fn fetch_all(&self, database: &str, collection: &str)
    -> Result<RecordBatch, SourceError>;

    /// Return metadata about this source for lineage tracking.
    fn source_info(&self) -> DataSourceInfo;
}

/// Build the source selected by configuration.
pub fn build_document_source(config: &DataSourceConfig) -> Arc<dyn DocumentSource> {
    match config.kind {
        DataSourceKind::JsonDir => Arc::new(JsonDirSource::new(&config.location)),
        DataSourceKind::Http => Arc::new(HttpDocumentSource::new(
            &config.location,
            config.api_key.clone(),
        )),
        DataSourceKind::Sqlite => Arc::new(SqliteSource::new(&config.location)),
    }
}

// ---------------------------------------------------------------------------
// JsonDirSource
// ---------------------------------------------------------------------------

/// Collection exports on disk: `<root>/<database>/<collection>.json` holding an
/// array of documents, or `<collection>.jsonl` with one document per line.
pub struct JsonDirSource {
    pub root: PathBuf,
}

impl JsonDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DocumentSource for JsonDirSource {
    async fn fetch_all(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<RecordBatch, SourceError> {
        let dir = self.root.join(database);
        let json_path = dir.join(format!("{collection}.json"));
        let jsonl_path = dir.join(format!("{collection}.jsonl"));

        let documents = if json_path.exists() {
            let content = tokio::fs::read_to_string(&json_path).await?;
            match serde_json::from_str::<Value>(&content)? {
                Value::Array(items) => items,
                _ => {
                    return Err(SourceError::Protocol(format!(
                        "{} must hold a JSON array",
                        json_path.display()
                    )));
                }
            }
        } else if jsonl_path.exists() {
            let content = tokio::fs::read_to_string(&jsonl_path).await?;
            let mut items = Vec::new();
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                items.push(serde_json::from_str(line)?);
            }
            items
        } else {
            return Err(SourceError::NotFound {
                database: database.to_string(),
                collection: collection.to_string(),
            });
        };

        Ok(RecordBatch::from_documents(&documents)?)
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "json_dir".to_string(),
            location: self.root.display().to_string(),
            accessed_at: chrono::Utc::now(),
            row_count: None,
        }
    }
}

// ---------------------------------------------------------------------------
// HttpDocumentSource
// ---------------------------------------------------------------------------

/// Document-store HTTP data API.
///
/// Sends `POST {base_url}/action/find` with `{database, collection, filter}`
/// and expects `{"documents": [...]}` back.
pub struct HttpDocumentSource {
    pub base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpDocumentSource {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch_all(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<RecordBatch, SourceError> {
        let url = format!("{}/action/find", self.base_url);
        let mut request = self.client.post(&url).json(&serde_json::json!({
            "database": database,
            "collection": collection,
            "filter": {},
        }));
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Protocol(format!(
                "find on {database}.{collection} returned status {}",
                response.status()
            )));
        }

        let mut body: Value = response.json().await?;
        let documents = match body.get_mut("documents").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(SourceError::Protocol(
                    "response has no `documents` array".to_string(),
                ));
            }
        };

        Ok(RecordBatch::from_documents(&documents)?)
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "http".to_string(),
            location: self.base_url.clone(),
            accessed_at: chrono::Utc::now(),
            row_count: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SqliteSource
// ---------------------------------------------------------------------------

/// SQLite mirror of the document store: `<dir>/<database>.db`, one table per
/// collection.
pub struct SqliteSource {
    pub dir: PathBuf,
}

impl SqliteSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl DocumentSource for SqliteSource {
    async fn fetch_all(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<RecordBatch, SourceError> {
        if !is_plain_identifier(collection) {
            return Err(SourceError::Protocol(format!(
                "invalid collection name {collection:?}"
            )));
        }
        let db_path = self.dir.join(format!("{database}.db"));
        if !db_path.exists() {
            return Err(SourceError::NotFound {
                database: database.to_string(),
                collection: collection.to_string(),
            });
        }
        let query = format!("SELECT * FROM \"{collection}\"");

        // Run blocking SQLite operations on a blocking thread
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
            )?;
            let mut stmt = conn.prepare(&query)?;
            let column_count = stmt.column_count();
            let columns: Vec<String> = (0..column_count)
                .map(|i| stmt.column_name(i).unwrap_or("?").to_string())
                .collect();

            let mut documents = Vec::new();
            let mut result_rows = stmt.query([])?;
            while let Some(row) = result_rows.next()? {
                let mut doc = Map::with_capacity(column_count);
                for (i, name) in columns.iter().enumerate() {
                    if name == DOCUMENT_ID_FIELD {
                        continue;
                    }
                    let val = match row.get_ref(i)? {
                        rusqlite::types::ValueRef::Null => Value::Null,
                        rusqlite::types::ValueRef::Integer(n) => Value::from(n),
                        rusqlite::types::ValueRef::Real(f) => serde_json::Number::from_f64(f)
                            .map(Value::Number)
                            .unwrap_or(Value::Null),
                        rusqlite::types::ValueRef::Text(t) => {
                            Value::String(String::from_utf8_lossy(t).into_owned())
                        }
                        rusqlite::types::ValueRef::Blob(_) => Value::String("<blob>".to_string()),
                    };
                    doc.insert(name.clone(), val);
                }
                documents.push(Value::Object(doc));
            }

            let mut batch = RecordBatch::from_documents(&documents)?;
            if documents.is_empty() {
                batch.columns = columns
                    .into_iter()
                    .filter(|c| c != DOCUMENT_ID_FIELD)
                    .collect();
            }
            Ok::<_, SourceError>(batch)
        })
        .await
        .map_err(|e| SourceError::Task(format!("SQLite task join error: {e}")))?
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "sqlite".to_string(),
            location: self.dir.display().to_string(),
            accessed_at: chrono::Utc::now(),
            row_count: None,
        }
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// In-memory collections, keyed by `(database, collection)`.
#[derive(Default)]
pub struct MemorySource {
    collections: HashMap<(String, String), Vec<Value>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(
        mut self,
        database: impl Into<String>,
        collection: impl Into<String>,
        documents: Vec<Value>,
    ) -> Self {
        self.collections
            .insert((database.into(), collection.into()), documents);
        self
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn fetch_all(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<RecordBatch, SourceError> {
        let documents = self
            .collections
            .get(&(database.to_string(), collection.to_string()))
            .ok_or_else(|| SourceError::NotFound {
                database: database.to_string(),
                collection: collection.to_string(),
            })?;
        Ok(RecordBatch::from_documents(documents)?)
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "memory".to_string(),
            location: format!("{} collections", self.collections.len()),
            accessed_at: chrono::Utc::now(),
            row_count: Some(self.collections.values().map(Vec::len).sum()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_json_dir_source_reads_array_export() {
        let dir = TempDir::new().unwrap();
        let db_dir = dir.path().join("insurance");
        std::fs::create_dir_all(&db_dir).unwrap();
        std::fs::write(
            db_dir.join("insurance_data.json"),
            r#"[{"_id": "a1", "age": 19, "region": "southwest"},
                {"_id": "a2", "age": 18, "region": "southeast"}]"#,
        )
        .unwrap();

        let src = JsonDirSource::new(dir.path());
        let batch = src.fetch_all("insurance", "insurance_data").await.unwrap();
        assert_eq!(batch.columns, vec!["age", "region"]);
        assert_eq!(batch.row_count(), 2);
    }

    #[tokio::test]
    async fn test_json_dir_source_falls_back_to_jsonl() {
        let dir = TempDir::new().unwrap();
        let db_dir = dir.path().join("insurance");
        std::fs::create_dir_all(&db_dir).unwrap();
        std::fs::write(
            db_dir.join("insurance_data.jsonl"),
            "{\"age\": 19}\n\n{\"age\": 33}\n",
        )
        .unwrap();

        let src = JsonDirSource::new(dir.path());
        let batch = src.fetch_all("insurance", "insurance_data").await.unwrap();
        assert_eq!(batch.rows, vec![vec![json!(19)], vec![json!(33)]]);
    }

    #[tokio::test]
    async fn test_json_dir_source_missing_collection() {
        let dir = TempDir::new().unwrap();
        let src = JsonDirSource::new(dir.path());
        let err = src.fetch_all("insurance", "nope").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_sqlite_source_reads_table_and_drops_id() {
        let dir = TempDir::new().unwrap();
        let conn = rusqlite::Connection::open(dir.path().join("insurance.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE insurance_data (_id TEXT, age INTEGER, bmi REAL, smoker TEXT);
             INSERT INTO insurance_data VALUES ('x1', 19, 27.9, 'yes');
             INSERT INTO insurance_data VALUES ('x2', 18, NULL, 'no');",
        )
        .unwrap();
        drop(conn);

        let src = SqliteSource::new(dir.path());
        let batch = src.fetch_all("insurance", "insurance_data").await.unwrap();
        assert_eq!(batch.columns, vec!["age", "bmi", "smoker"]);
        assert_eq!(batch.rows[0], vec![json!(19), json!(27.9), json!("yes")]);
        assert_eq!(batch.rows[1][1], Value::Null);
    }

    #[tokio::test]
    async fn test_sqlite_source_rejects_injected_table_name() {
        let dir = TempDir::new().unwrap();
        let src = SqliteSource::new(dir.path());
        let err = src
            .fetch_all("insurance", "t; DROP TABLE x")
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_sqlite_source_missing_database() {
        let dir = TempDir::new().unwrap();
        let src = SqliteSource::new(dir.path());
        let err = src.fetch_all("insurance", "insurance_data").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_memory_source() {
        let src = MemorySource::new().with_collection(
            "insurance",
            "insurance_data",
            vec![json!({"_id": 1, "age": 40})],
        );
        let batch = src.fetch_all("insurance", "insurance_data").await.unwrap();
        assert_eq!(batch.columns, vec!["age"]);
        assert!(src.fetch_all("insurance", "other").await.is_err());
        assert_eq!(src.source_info().row_count, Some(1));
    }

    #[test]
    fn test_http_source_info_trims_slash() {
        let src = HttpDocumentSource::new("https://data.example.com/api/", None);
        let info = src.source_info();
        assert_eq!(info.source_type, "http");
        assert_eq!(info.location, "https://data.example.com/api");
    }

    #[test]
    fn test_build_document_source_by_kind() {
        let mut config = DataSourceConfig::default();
        assert_eq!(build_document_source(&config).source_info().source_type, "json_dir");
        config.kind = DataSourceKind::Sqlite;
        assert_eq!(build_document_source(&config).source_info().source_type, "sqlite");
    }
}
