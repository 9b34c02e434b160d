//! Typed dataset schema, parsed once from YAML.
//!
//! The schema declares every column of the raw dataset together with its basic
//! type, and which columns are encoded as numbers, as categories, or used as
//! the regression target. All cross-references are checked at load time.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Basic column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Boolean,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// Declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: ColumnType,
}

/// Dataset schema consumed by validation and transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnSpec>,
    pub numerical_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub target_column: String,
}

impl Schema {
    /// Parse and check a schema from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let schema: Schema = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<schema>".into(),
            message: e.to_string(),
        })?;
        schema.check()?;
        Ok(schema)
    }

    /// Load and check a schema file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let schema: Schema = serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        schema.check()?;
        Ok(schema)
    }

    /// Look up the declared type of a column.
    pub fn dtype(&self, name: &str) -> Option<ColumnType> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.dtype)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.columns.is_empty() {
            return Err(ConfigError::MissingField {
                field: "columns".into(),
            });
        }
        if self.target_column.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "target_column".into(),
            });
        }

        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "column '{}' is declared more than once",
                    col.name
                )));
            }
        }

        let mut roles = HashSet::new();
        for name in self
            .numerical_columns
            .iter()
            .chain(self.categorical_columns.iter())
        {
            if !roles.insert(name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "column '{name}' is listed as both numerical and categorical or twice"
                )));
            }
            if self.dtype(name).is_none() {
                return Err(ConfigError::invalid(format!(
                    "feature column '{name}' is not declared in columns"
                )));
            }
        }

        for name in &self.numerical_columns {
            if let Some(dtype) = self.dtype(name) {
                if !dtype.is_numeric() {
                    return Err(ConfigError::invalid(format!(
                        "numerical column '{name}' is declared as {dtype}"
                    )));
                }
            }
        }

        match self.dtype(&self.target_column) {
            None => Err(ConfigError::invalid(format!(
                "target column '{}' is not declared in columns",
                self.target_column
            ))),
            Some(dtype) if !dtype.is_numeric() => Err(ConfigError::invalid(format!(
                "target column '{}' must be numeric, found {dtype}",
                self.target_column
            ))),
            Some(_) if roles.contains(self.target_column.as_str()) => {
                Err(ConfigError::invalid(format!(
                    "target column '{}' cannot also be a feature",
                    self.target_column
                )))
            }
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSURANCE_SCHEMA: &str = r#"
columns:
  - { name: age, dtype: integer }
  - { name: sex, dtype: string }
  - { name: bmi, dtype: float }
  - { name: children, dtype: integer }
  - { name: smoker, dtype: string }
  - { name: region, dtype: string }
  - { name: expenses, dtype: float }
numerical_columns: [age, bmi, children]
categorical_columns: [sex, smoker, region]
target_column: expenses
"#;

    #[test]
    fn test_parse_insurance_schema() {
        let schema = Schema::from_yaml_str(INSURANCE_SCHEMA).unwrap();
        assert_eq!(schema.columns.len(), 7);
        assert_eq!(schema.dtype("bmi"), Some(ColumnType::Float));
        assert_eq!(schema.categorical_columns, vec!["sex", "smoker", "region"]);
        assert_eq!(schema.numerical_columns, vec!["age", "bmi", "children"]);
    }

    #[test]
    fn test_missing_target_key_fails_fast() {
        let text = INSURANCE_SCHEMA.replace("target_column: expenses", "");
        let err = Schema::from_yaml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_undeclared_feature_rejected() {
        let text = INSURANCE_SCHEMA.replace("[age, bmi, children]", "[age, bmi, weight]");
        let err = Schema::from_yaml_str(&text).unwrap_err();
        assert!(err.to_string().contains("weight"));
    }

    #[test]
    fn test_string_numeric_column_rejected() {
        let text = INSURANCE_SCHEMA.replace("[age, bmi, children]", "[age, bmi, sex]");
        let text = text.replace("[sex, smoker, region]", "[smoker, region]");
        let err = Schema::from_yaml_str(&text).unwrap_err();
        assert!(err.to_string().contains("declared as string"));
    }

    #[test]
    fn test_target_as_feature_rejected() {
        let text = INSURANCE_SCHEMA.replace("[age, bmi, children]", "[age, bmi, children, expenses]");
        assert!(Schema::from_yaml_str(&text).is_err());
    }

    #[test]
    fn test_from_file_not_found() {
        let err = Schema::from_file(Path::new("/nonexistent/schema.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
