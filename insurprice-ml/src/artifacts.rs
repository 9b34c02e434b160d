//! Run directory layout and the immutable artifact values stages hand on.

use crate::drift::DriftReport;
use crate::model::RegressionMetrics;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Format of the per-run directory name, e.g. `10_19_2026_14_03_59`.
pub const RUN_DIR_FORMAT: &str = "%m_%d_%Y_%H_%M_%S";

/// Every path a run reads or writes, derived from one run directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLayout {
    pub run_dir: PathBuf,
}

impl ArtifactLayout {
    /// Layout for a new run under `root`, named after the current local time.
    pub fn for_run(root: &Path) -> Self {
        Self::new(root.join(Local::now().format(RUN_DIR_FORMAT).to_string()))
    }

    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    pub fn ingestion_dir(&self) -> PathBuf {
        self.run_dir.join("DataIngestionArtifacts")
    }

    pub fn train_file(&self) -> PathBuf {
        self.ingestion_dir().join("Train").join("train.csv")
    }

    pub fn test_file(&self) -> PathBuf {
        self.ingestion_dir().join("Test").join("test.csv")
    }

    pub fn validation_dir(&self) -> PathBuf {
        self.run_dir.join("DataValidationArtifacts")
    }

    pub fn drift_report_file(&self) -> PathBuf {
        self.validation_dir().join("drift_report.yaml")
    }

    pub fn transformation_dir(&self) -> PathBuf {
        self.run_dir.join("DataTransformationArtifacts")
    }

    pub fn preprocessor_file(&self) -> PathBuf {
        self.transformation_dir().join("insurance_preprocessor.bin")
    }

    pub fn transformed_train_file(&self) -> PathBuf {
        self.transformation_dir()
            .join("TransformedTrain")
            .join("transformed_train_data.bin")
    }

    pub fn transformed_test_file(&self) -> PathBuf {
        self.transformation_dir()
            .join("TransformedTest")
            .join("transformed_test_data.bin")
    }

    pub fn trainer_dir(&self) -> PathBuf {
        self.run_dir.join("ModelTrainerArtifacts")
    }

    pub fn model_file(&self) -> PathBuf {
        self.trainer_dir().join("insurance_price_model.bin")
    }

    pub fn evaluation_dir(&self) -> PathBuf {
        self.run_dir.join("ModelEvaluationArtifacts")
    }

    pub fn evaluation_file(&self) -> PathBuf {
        self.evaluation_dir().join("evaluation.json")
    }

    /// Where the currently published model is downloaded to for comparison.
    pub fn baseline_dir(&self) -> PathBuf {
        self.evaluation_dir().join("PublishedModel")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionArtifact {
    pub train_file_path: PathBuf,
    pub test_file_path: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Rows discarded for having a missing field.
    pub dropped_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationArtifact {
    pub drift_report_path: PathBuf,
    pub validation_status: bool,
    pub report: DriftReport,
}

/// Encoded arrays have the encoder's features followed by the target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationArtifact {
    pub preprocessor_path: PathBuf,
    pub transformed_train_path: PathBuf,
    pub transformed_test_path: PathBuf,
    pub n_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_path: PathBuf,
    /// SHA-256 of the persisted model file.
    pub model_digest: String,
    pub train_metrics: RegressionMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub trained_model_score: f64,
    /// Score of the currently published model, if one exists.
    pub baseline_model_score: Option<f64>,
    pub is_model_accepted: bool,
    /// New score minus baseline score, with 0 standing in for no baseline.
    pub score_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishArtifact {
    pub bucket: String,
    pub key: String,
    pub model_digest: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = ArtifactLayout::new("artifacts/10_19_2026_14_03_59");
        assert_eq!(
            layout.train_file(),
            PathBuf::from("artifacts/10_19_2026_14_03_59/DataIngestionArtifacts/Train/train.csv")
        );
        assert_eq!(
            layout.test_file(),
            PathBuf::from("artifacts/10_19_2026_14_03_59/DataIngestionArtifacts/Test/test.csv")
        );
        assert!(layout.model_file().ends_with("ModelTrainerArtifacts/insurance_price_model.bin"));
        assert!(
            layout
                .transformed_test_file()
                .ends_with("TransformedTest/transformed_test_data.bin")
        );
    }

    #[test]
    fn test_run_dir_name_format() {
        let layout = ArtifactLayout::for_run(Path::new("artifacts"));
        let name = layout.run_dir.file_name().unwrap().to_str().unwrap();
        let parts: Vec<&str> = name.split('_').collect();
        assert_eq!(parts.len(), 6);
        assert_eq!(parts[2].len(), 4);
        assert!(parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())));
    }
}
