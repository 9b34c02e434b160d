//! Configuration system for insurprice.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides. The resulting
//! [`PipelineConfig`] is built once at startup and handed to each stage by
//! reference; nothing below the entry points reads ambient state.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace-local configuration file.
pub const WORKSPACE_CONFIG_FILE: &str = "insurprice.toml";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "INSURPRICE_";

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Path of the dataset schema YAML file.
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,
    #[serde(default)]
    pub data_source: DataSourceConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub training: Hyperparameters,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub remote: RemoteStoreConfig,
    #[serde(default)]
    pub serving: ServingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema_path: default_schema_path(),
            data_source: DataSourceConfig::default(),
            artifacts: ArtifactsConfig::default(),
            ingestion: IngestionConfig::default(),
            validation: ValidationConfig::default(),
            training: Hyperparameters::default(),
            evaluation: EvaluationConfig::default(),
            remote: RemoteStoreConfig::default(),
            serving: ServingConfig::default(),
        }
    }
}

/// Which document-store client to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    /// `<location>/<database>/<collection>.json` or `.jsonl` exports.
    JsonDir,
    /// Document-store HTTP data API rooted at `location`.
    Http,
    /// `<location>/<database>.db`, one table per collection.
    Sqlite,
}

/// Document store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    #[serde(default = "default_source_kind")]
    pub kind: DataSourceKind,
    #[serde(default = "default_source_location")]
    pub location: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// API key sent with HTTP data API requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            location: default_source_location(),
            database: default_database(),
            collection: default_collection(),
            api_key: None,
        }
    }
}

fn default_source_kind() -> DataSourceKind {
    DataSourceKind::JsonDir
}

fn default_source_location() -> String {
    "data".to_string()
}

fn default_database() -> String {
    "insurance".to_string()
}

fn default_collection() -> String {
    "insurance_data".to_string()
}

/// Local artifact area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Root under which a timestamped directory is created per run.
    #[serde(default = "default_artifacts_root")]
    pub root_dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            root_dir: default_artifacts_root(),
        }
    }
}

fn default_artifacts_root() -> PathBuf {
    PathBuf::from("artifacts")
}

/// Ingestion stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Fraction of complete rows assigned to the train partition.
    #[serde(default = "default_split_ratio")]
    pub split_ratio: f64,
    /// Fixed shuffle seed. A fresh random seed is drawn when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            split_ratio: default_split_ratio(),
            seed: None,
        }
    }
}

fn default_split_ratio() -> f64 {
    0.8
}

/// Validation stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// A numeric column drifts when its KS p-value falls below this value.
    #[serde(default = "default_drift_threshold")]
    pub drift_p_value_threshold: f64,
    /// Abort the run when validation status is false.
    #[serde(default)]
    pub halt_on_drift: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            drift_p_value_threshold: default_drift_threshold(),
            halt_on_drift: false,
        }
    }
}

fn default_drift_threshold() -> f64 {
    0.05
}

/// Regression hyperparameters supplied to the training stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    #[serde(default = "default_true")]
    pub fit_intercept: bool,
    /// L2 penalty. Zero means ordinary least squares.
    #[serde(default)]
    pub alpha: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            alpha: 0.0,
        }
    }
}

/// How the evaluation stage decides whether a new model replaces the deployed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptancePolicy {
    /// Accept every newly trained model; the score delta is reported only.
    AlwaysAccept,
    /// Accept only when the new score is strictly greater than the baseline.
    RequireImprovement,
}

impl AcceptancePolicy {
    /// Acceptance as a pure function of the two scores.
    pub fn accepts(self, new_score: f64, baseline_score: f64) -> bool {
        match self {
            Self::AlwaysAccept => true,
            Self::RequireImprovement => new_score > baseline_score,
        }
    }
}

/// Evaluation stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_policy")]
    pub acceptance_policy: AcceptancePolicy,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            acceptance_policy: default_policy(),
        }
    }
}

fn default_policy() -> AcceptancePolicy {
    AcceptancePolicy::AlwaysAccept
}

/// Which remote object store backs model publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStoreKind {
    /// Buckets are sub-directories of `location`.
    LocalDir,
    /// Objects live at `<location>/<bucket>/<key>` over HTTP.
    Http,
}

/// Remote model store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStoreConfig {
    #[serde(default = "default_remote_kind")]
    pub kind: RemoteStoreKind,
    #[serde(default = "default_remote_location")]
    pub location: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Fixed key the accepted model is published under.
    #[serde(default = "default_model_key")]
    pub model_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            kind: default_remote_kind(),
            location: default_remote_location(),
            bucket: default_bucket(),
            model_key: default_model_key(),
            auth_token: None,
        }
    }
}

fn default_remote_kind() -> RemoteStoreKind {
    RemoteStoreKind::LocalDir
}

fn default_remote_location() -> String {
    "remote".to_string()
}

fn default_bucket() -> String {
    "insurprice-io-files".to_string()
}

fn default_model_key() -> String {
    "insurance_price_model.bin".to_string()
}

/// Prediction server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Where the published model is downloaded to before serving.
    #[serde(default = "default_model_cache_dir")]
    pub model_cache_dir: PathBuf,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            model_cache_dir: default_model_cache_dir(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_model_cache_dir() -> PathBuf {
    PathBuf::from(".insurprice/models")
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("config/schema.yaml")
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    /// Reject settings no stage can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.ingestion.split_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(ConfigError::invalid(format!(
                "ingestion.split_ratio must be in (0, 1), got {ratio}"
            )));
        }
        let threshold = self.validation.drift_p_value_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(ConfigError::invalid(format!(
                "validation.drift_p_value_threshold must be in (0, 1), got {threshold}"
            )));
        }
        if !self.training.alpha.is_finite() || self.training.alpha < 0.0 {
            return Err(ConfigError::invalid(format!(
                "training.alpha must be a non-negative number, got {}",
                self.training.alpha
            )));
        }
        if self.remote.bucket.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "remote.bucket".into(),
            });
        }
        if self.remote.model_key.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "remote.model_key".into(),
            });
        }
        if self.data_source.collection.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "data_source.collection".into(),
            });
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `INSURPRICE_`)
/// 3. Workspace-local config (`insurprice.toml`)
/// 4. User config (`~/.config/insurprice/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&PipelineConfig>,
) -> Result<PipelineConfig, ConfigError> {
    let user_config = directories::ProjectDirs::from("dev", "insurprice", "insurprice")
        .map(|dirs| dirs.config_dir().join("config.toml"));
    // INSURPRICE_INGESTION__SPLIT_RATIO, INSURPRICE_REMOTE__BUCKET, etc.
    let env = Env::prefixed(ENV_PREFIX).split("__");
    load_layered(user_config.as_deref(), workspace, Some(env), overrides)
}

/// Load defaults, the workspace `insurprice.toml` and `overrides` only.
///
/// Neither the user config directory nor the process environment is read,
/// so the result depends on the workspace alone.
pub fn load_workspace_config(
    workspace: &Path,
    overrides: Option<&PipelineConfig>,
) -> Result<PipelineConfig, ConfigError> {
    load_layered(None, Some(workspace), None, overrides)
}

fn load_layered(
    user_config: Option<&Path>,
    workspace: Option<&Path>,
    env: Option<Env>,
    overrides: Option<&PipelineConfig>,
) -> Result<PipelineConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(user_config) = user_config.filter(|p| p.exists()) {
        figment = figment.merge(Toml::file(user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_CONFIG_FILE);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(env) = env {
        figment = figment.merge(env);
    }

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: PipelineConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a single explicit TOML file layered over defaults.
pub fn load_config_file(path: &Path) -> Result<PipelineConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let config: PipelineConfig = Figment::from(Serialized::defaults(PipelineConfig::default()))
        .merge(Toml::file(path))
        .extract()
        .map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.ingestion.split_ratio, 0.8);
        assert_eq!(config.data_source.database, "insurance");
        assert_eq!(config.data_source.collection, "insurance_data");
        assert_eq!(config.remote.bucket, "insurprice-io-files");
        assert_eq!(
            config.evaluation.acceptance_policy,
            AcceptancePolicy::AlwaysAccept
        );
        assert!(config.training.fit_intercept);
        assert_eq!(config.schema_path, PathBuf::from("config/schema.yaml"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_acceptance_policy() {
        assert!(AcceptancePolicy::AlwaysAccept.accepts(0.1, 0.9));
        assert!(!AcceptancePolicy::RequireImprovement.accepts(0.1, 0.9));
        assert!(!AcceptancePolicy::RequireImprovement.accepts(0.5, 0.5));
        assert!(AcceptancePolicy::RequireImprovement.accepts(0.6, 0.5));
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let mut config = PipelineConfig::default();
        config.ingestion.split_ratio = 1.0;
        assert!(config.validate().is_err());
        config.ingestion.split_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_bucket() {
        let mut config = PipelineConfig::default();
        config.remote.bucket = " ".into();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }));
    }

    #[test]
    fn test_load_config_file_layers_over_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("insurprice.toml");
        std::fs::write(
            &path,
            r#"
schema_path = "schema.yaml"

[ingestion]
split_ratio = 0.75
seed = 7

[remote]
bucket = "models-staging"

[evaluation]
acceptance_policy = "require_improvement"
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.ingestion.split_ratio, 0.75);
        assert_eq!(config.ingestion.seed, Some(7));
        assert_eq!(config.remote.bucket, "models-staging");
        assert_eq!(config.remote.model_key, "insurance_price_model.bin");
        assert_eq!(config.schema_path, PathBuf::from("schema.yaml"));
        assert_eq!(
            config.evaluation.acceptance_policy,
            AcceptancePolicy::RequireImprovement
        );
    }

    #[test]
    fn test_load_config_file_invalid_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[ingestion]\nsplit_ratio = 1.5\n").unwrap();
        assert!(matches!(
            load_config_file(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_workspace_config_ignores_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = load_workspace_config(dir.path(), None).unwrap();
        assert_eq!(config.ingestion.split_ratio, 0.8);
        assert_eq!(config.remote.bucket, "insurprice-io-files");
        assert_eq!(config.ingestion.seed, None);
    }

    #[test]
    fn test_workspace_config_overrides_win() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(WORKSPACE_CONFIG_FILE),
            "[ingestion]\nseed = 3\n\n[remote]\nbucket = \"from-file\"\n",
        )
        .unwrap();

        let config = load_workspace_config(dir.path(), None).unwrap();
        assert_eq!(config.ingestion.seed, Some(3));
        assert_eq!(config.remote.bucket, "from-file");

        let mut overrides = config.clone();
        overrides.remote.bucket = "from-override".into();
        let config = load_workspace_config(dir.path(), Some(&overrides)).unwrap();
        assert_eq!(config.remote.bucket, "from-override");
        assert_eq!(config.ingestion.seed, Some(3));
    }

    #[test]
    fn test_workspace_file_layers_over_user_file() {
        let dir = TempDir::new().unwrap();
        let user = dir.path().join("user.toml");
        std::fs::write(
            &user,
            "[remote]\nbucket = \"user-bucket\"\nmodel_key = \"user.bin\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(WORKSPACE_CONFIG_FILE),
            "[remote]\nbucket = \"workspace-bucket\"\n",
        )
        .unwrap();

        let config = load_layered(Some(&user), Some(dir.path()), None, None).unwrap();
        assert_eq!(config.remote.bucket, "workspace-bucket");
        assert_eq!(config.remote.model_key, "user.bin");
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.remote.model_key, config.remote.model_key);
        assert_eq!(parsed.serving.port, 8080);
    }
}
