//! Single-record cost prediction with the published model.

use crate::data::RecordBatch;
use crate::model::{InsurancePriceModel, ModelError};
use crate::remote::{ModelStore, StoreError};
use insurprice_core::config::RemoteStoreConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("failed to load model: {0}")]
    Load(#[from] std::io::Error),

    #[error("failed to fetch published model: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("model returned no prediction")]
    NoOutput,
}

/// One applicant, as accepted by the prediction surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceData {
    pub age: u32,
    pub sex: String,
    pub bmi: f64,
    pub children: u32,
    pub smoker: String,
    pub region: String,
}

impl InsuranceData {
    /// Single-row batch with the raw dataset's column names.
    pub fn to_batch(&self) -> RecordBatch {
        RecordBatch::new(
            ["age", "sex", "bmi", "children", "smoker", "region"]
                .into_iter()
                .map(String::from)
                .collect(),
            vec![vec![
                json!(self.age),
                json!(self.sex),
                json!(self.bmi),
                json!(self.children),
                json!(self.smoker),
                json!(self.region),
            ]],
        )
    }
}

pub struct CostPredictor {
    model: InsurancePriceModel,
}

impl CostPredictor {
    pub fn new(model: InsurancePriceModel) -> Self {
        Self { model }
    }

    pub fn from_file(path: &Path) -> Result<Self, PredictError> {
        Ok(Self::new(InsurancePriceModel::load(path)?))
    }

    /// Download the published model into `cache_dir` and load it.
    pub async fn from_store(
        store: &dyn ModelStore,
        remote: &RemoteStoreConfig,
        cache_dir: &Path,
    ) -> Result<Self, PredictError> {
        let path = store
            .download(&remote.model_key, &remote.bucket, cache_dir)
            .await?;
        info!(path = %path.display(), source = %store.describe(), "Loaded published model");
        Self::from_file(&path)
    }

    pub fn model(&self) -> &InsurancePriceModel {
        &self.model
    }

    /// Predicted cost, rounded to two decimals.
    pub fn predict(&self, data: &InsuranceData) -> Result<f64, PredictError> {
        let predictions = self.model.predict(&data.to_batch())?;
        let value = predictions.first().copied().ok_or(PredictError::NoOutput)?;
        Ok((value * 100.0).round() / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{FeatureEncoder, OneHotBlock, ScaledColumn};
    use crate::model::LinearRegression;
    use ndarray::array;

    fn predictor() -> CostPredictor {
        let encoder = FeatureEncoder {
            categorical: vec![OneHotBlock {
                column: "smoker".into(),
                categories: vec!["no".into(), "yes".into()],
            }],
            numerical: vec![ScaledColumn {
                column: "age".into(),
                mean: 40.0,
                scale: 10.0,
            }],
        };
        let regressor = LinearRegression {
            coefficients: array![0.0, 20000.0, 3000.0],
            intercept: 9000.123,
            fit_intercept: true,
            alpha: 0.0,
        };
        CostPredictor::new(InsurancePriceModel::new(encoder, regressor, "expenses".into()))
    }

    fn applicant(smoker: &str) -> InsuranceData {
        InsuranceData {
            age: 30,
            sex: "male".into(),
            bmi: 28.5,
            children: 1,
            smoker: smoker.into(),
            region: "southeast".into(),
        }
    }

    #[test]
    fn test_predict_rounds_to_cents() {
        let p = predictor();
        // 9000.123 + 3000 * (30 - 40) / 10
        assert_eq!(p.predict(&applicant("no")).unwrap(), 6000.12);
        assert_eq!(p.predict(&applicant("yes")).unwrap(), 26000.12);
    }

    #[test]
    fn test_to_batch_columns() {
        let batch = applicant("no").to_batch();
        assert_eq!(batch.row_count(), 1);
        assert_eq!(batch.column_values("bmi").unwrap(), vec![&json!(28.5)]);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            CostPredictor::from_file(Path::new("/nonexistent/model.bin")),
            Err(PredictError::Load(_))
        ));
    }
}
