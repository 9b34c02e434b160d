//! Shared fixtures for the insurprice-ml integration tests.

#![allow(dead_code)]

use insurprice_core::{PipelineConfig, Schema};
use insurprice_ml::data::MemorySource;
use serde_json::{Value, json};
use std::path::Path;

pub const DATABASE: &str = "insurance";
pub const COLLECTION: &str = "insurance_data";

const REGIONS: [&str; 4] = ["northeast", "northwest", "southeast", "southwest"];

pub fn insurance_schema() -> Schema {
    Schema::from_yaml_str(include_str!("../../../config/schema.yaml")).unwrap()
}

/// Deterministic policy holders whose expenses follow a near-linear rule.
pub fn insurance_documents(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let age = 18 + (i * 7) % 47;
            let bmi = 20.0 + ((i * 13) % 150) as f64 / 10.0;
            let children = i % 4;
            let smoker = i % 5 == 0;
            let region = i % 4;
            let expenses = 250.0 * age as f64
                + 320.0 * bmi
                + 500.0 * children as f64
                + if smoker { 23_000.0 } else { 0.0 }
                + 400.0 * region as f64
                + ((i * 37) % 100) as f64;
            json!({
                "_id": format!("doc-{i}"),
                "age": age,
                "sex": if i % 2 == 0 { "female" } else { "male" },
                "bmi": bmi,
                "children": children,
                "smoker": if smoker { "yes" } else { "no" },
                "region": REGIONS[region],
                "expenses": (expenses * 100.0).round() / 100.0,
            })
        })
        .collect()
}

pub fn source_with(documents: Vec<Value>) -> MemorySource {
    MemorySource::new().with_collection(DATABASE, COLLECTION, documents)
}

/// Defaults with a fixed split seed and every path under `root`.
pub fn test_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.ingestion.seed = Some(42);
    config.artifacts.root_dir = root.join("artifacts");
    config.remote.location = root.join("remote").display().to_string();
    config.serving.model_cache_dir = root.join("models");
    config
}
