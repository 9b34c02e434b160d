//! Train/test drift detection.
//!
//! Each numeric column is compared across the two partitions with the
//! two-sample Kolmogorov-Smirnov test. A column drifts when the asymptotic
//! p-value falls below the configured threshold.

use chrono::{DateTime, Utc};
use insurprice_core::persistence::atomic_write;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Outcome of one two-sample KS test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KsOutcome {
    /// Largest absolute gap between the two empirical CDFs.
    pub statistic: f64,
    pub p_value: f64,
}

/// Two-sample Kolmogorov-Smirnov test.
///
/// Returns `None` when either sample is empty.
pub fn ks_two_sample(reference: &Array1<f64>, current: &Array1<f64>) -> Option<KsOutcome> {
    if reference.is_empty() || current.is_empty() {
        return None;
    }
    let mut a: Vec<f64> = reference.iter().copied().collect();
    let mut b: Vec<f64> = current.iter().copied().collect();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut statistic = 0.0f64;
    // Walk both sorted samples, stepping past ties together.
    while i < a.len() && j < b.len() {
        let (x, y) = (a[i], b[j]);
        if x <= y {
            while i < a.len() && a[i] == x {
                i += 1;
            }
        }
        if y <= x {
            while j < b.len() && b[j] == y {
                j += 1;
            }
        }
        statistic = statistic.max((i as f64 / n1 - j as f64 / n2).abs());
    }

    let en = (n1 * n2 / (n1 + n2)).sqrt();
    let p_value = kolmogorov_survival((en + 0.12 + 0.11 / en) * statistic);
    Some(KsOutcome { statistic, p_value })
}

/// Kolmogorov distribution survival function `Q_KS(lambda)`.
///
/// Alternating series; returns 1.0 when it fails to converge, which only
/// happens for lambda close to zero.
fn kolmogorov_survival(lambda: f64) -> f64 {
    const EPS_TERM: f64 = 1e-3;
    const EPS_SUM: f64 = 1e-8;

    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut previous = 0.0f64;
    for j in 1..=100 {
        let j = j as f64;
        let term = fac * (a2 * j * j).exp();
        sum += term;
        if term.abs() <= EPS_TERM * previous || term.abs() <= EPS_SUM * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        previous = term.abs();
    }
    1.0
}

/// Drift verdict for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub column: String,
    pub statistic: f64,
    pub p_value: f64,
    pub drift_detected: bool,
    pub reference_size: usize,
    pub current_size: usize,
}

impl ColumnDrift {
    /// Compare the train (`reference`) and test (`current`) values of a column.
    pub fn compute(
        column: impl Into<String>,
        reference: &Array1<f64>,
        current: &Array1<f64>,
        p_value_threshold: f64,
    ) -> Option<Self> {
        let outcome = ks_two_sample(reference, current)?;
        Some(Self {
            column: column.into(),
            statistic: outcome.statistic,
            p_value: outcome.p_value,
            drift_detected: outcome.p_value < p_value_threshold,
            reference_size: reference.len(),
            current_size: current.len(),
        })
    }
}

/// The validation stage's structured report, persisted as YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub generated_at: DateTime<Utc>,
    pub p_value_threshold: f64,
    pub schema_matches: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_issues: Vec<String>,
    pub columns: Vec<ColumnDrift>,
    pub drifted_columns: usize,
    /// Schema matched and no column drifted.
    pub validation_status: bool,
}

impl DriftReport {
    pub fn new(p_value_threshold: f64, schema_issues: Vec<String>, columns: Vec<ColumnDrift>) -> Self {
        let schema_matches = schema_issues.is_empty();
        let drifted_columns = columns.iter().filter(|c| c.drift_detected).count();
        Self {
            generated_at: Utc::now(),
            p_value_threshold,
            schema_matches,
            schema_issues,
            columns,
            drifted_columns,
            validation_status: schema_matches && drifted_columns == 0,
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let yaml = serde_yaml::to_string(self).map_err(io::Error::other)?;
        atomic_write(path, yaml.as_bytes())
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_identical_samples_do_not_drift() {
        let data = Array1::from_vec((1..=20).map(f64::from).collect());
        let outcome = ks_two_sample(&data, &data).unwrap();
        assert_eq!(outcome.statistic, 0.0);
        assert_eq!(outcome.p_value, 1.0);
    }

    #[test]
    fn test_shifted_samples_no_drift() {
        let reference = Array1::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        let current = Array1::from_vec(vec![1.5, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5, 8.5, 9.5, 10.5]);
        let drift = ColumnDrift::compute("age", &reference, &current, 0.05).unwrap();
        assert!((drift.statistic - 0.1).abs() < 1e-12);
        assert!(!drift.drift_detected);
    }

    #[test]
    fn test_disjoint_samples_drift() {
        let reference = Array1::from_vec((1..=10).map(f64::from).collect());
        let current = Array1::from_vec((100..110).map(f64::from).collect());
        let drift = ColumnDrift::compute("bmi", &reference, &current, 0.05).unwrap();
        assert_eq!(drift.statistic, 1.0);
        assert!(drift.p_value < 0.001);
        assert!(drift.drift_detected);
    }

    #[test]
    fn test_ties_across_samples() {
        let reference = Array1::from_vec(vec![0.0, 0.0, 1.0, 1.0]);
        let current = Array1::from_vec(vec![0.0, 1.0]);
        let outcome = ks_two_sample(&reference, &current).unwrap();
        assert_eq!(outcome.statistic, 0.0);
    }

    #[test]
    fn test_empty_sample() {
        let data = Array1::from_vec(vec![1.0]);
        assert!(ks_two_sample(&data, &Array1::from_vec(vec![])).is_none());
    }

    #[test]
    fn test_report_status_and_yaml_roundtrip() {
        let reference = Array1::from_vec((1..=10).map(f64::from).collect());
        let far = Array1::from_vec((100..110).map(f64::from).collect());
        let columns = vec![
            ColumnDrift::compute("age", &reference, &reference, 0.05).unwrap(),
            ColumnDrift::compute("bmi", &reference, &far, 0.05).unwrap(),
        ];
        let report = DriftReport::new(0.05, Vec::new(), columns);
        assert!(report.schema_matches);
        assert_eq!(report.drifted_columns, 1);
        assert!(!report.validation_status);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("drift_report.yaml");
        report.save(&path).unwrap();
        assert_eq!(DriftReport::load(&path).unwrap(), report);
    }

    #[test]
    fn test_schema_issue_fails_status() {
        let report = DriftReport::new(0.05, vec!["missing column bmi".into()], Vec::new());
        assert!(!report.schema_matches);
        assert!(!report.validation_status);
    }
}
