//! Persisted model artifacts and prediction-time feature reconstruction
//!
//! One JSON document per model lives at `<models_dir>/<model_id>.json`.
//! Artifacts without a `schema_version` are read as version 1: numeric-only
//! inputs, no encoders.

use crate::error::{BuilderError, Result};
use crate::metrics::Metrics;
use crate::preprocessing::{LabelEncoder, StandardScaler};
use crate::training::{Estimator, ProblemType, TrainedModel};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Newest artifact layout this build reads and the one it writes
pub const SCHEMA_VERSION: u32 = 2;

fn legacy_schema_version() -> u32 {
    1
}

/// The durable unit produced by a successful analyze call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub model_id: String,
    /// Display name of the winning algorithm
    pub algorithm: String,
    pub problem_type: ProblemType,
    /// Input columns in feature-matrix order
    pub input_columns: Vec<String>,
    pub output_column: String,
    pub metrics: Metrics,
    pub model: TrainedModel,
    #[serde(default)]
    pub encoders: BTreeMap<String, LabelEncoder>,
    #[serde(default)]
    pub scaler: Option<StandardScaler>,
    #[serde(default)]
    pub target_encoder: Option<LabelEncoder>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

/// Predicted value: a class code for classification, a float for regression
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionValue {
    Class(usize),
    Value(f64),
}

/// Output of [`ModelArtifact::predict_row`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPrediction {
    pub prediction: PredictionValue,
    pub predicted_label: Option<String>,
    pub probabilities: Option<Vec<f64>>,
}

impl ModelArtifact {
    /// Artifacts with no encoders expect every input to be numeric already
    pub fn is_legacy(&self) -> bool {
        self.schema_version < 2 || self.encoders.is_empty()
    }

    /// Parse an artifact document, rejecting layouts newer than [`SCHEMA_VERSION`]
    pub fn from_json(value: Value) -> Result<Self> {
        let found = match value.get("schema_version") {
            None | Some(Value::Null) => legacy_schema_version(),
            Some(v) => v
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| BuilderError::Serialization(format!("Invalid schema_version: {}", v)))?,
        };
        if found > SCHEMA_VERSION {
            return Err(BuilderError::UnsupportedSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Load an artifact file
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let value: Value = serde_json::from_reader(BufReader::new(file))?;
        Self::from_json(value)
    }

    /// Write to `path`, failing if the file already exists
    pub fn write_new(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = OpenOptions::new().write(true).create_new(true).open(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Rebuild the standardized feature row for a single prediction request
    pub fn build_feature_row(&self, features: &HashMap<String, Value>) -> Result<Array1<f64>> {
        let legacy = self.is_legacy();
        let mut row = Array1::zeros(self.input_columns.len());

        for (idx, column) in self.input_columns.iter().enumerate() {
            let value = match features.get(column) {
                Some(Value::Null) | None => {
                    return Err(BuilderError::InvalidInput(format!("Missing feature: {}", column)))
                }
                Some(v) => v,
            };

            row[idx] = match self.encoders.get(column) {
                Some(encoder) if !legacy => encoder.encode_checked(column, &value_as_text(value))? as f64,
                _ => coerce_numeric(column, value)?,
            };
        }

        match &self.scaler {
            Some(scaler) => scaler.transform_row(row.view()),
            None => Ok(row),
        }
    }

    /// Predict one row given raw feature values keyed by column name
    pub fn predict_row(&self, features: &HashMap<String, Value>) -> Result<RowPrediction> {
        let row = self.build_feature_row(features)?;
        let x: Array2<f64> = row.insert_axis(Axis(0));

        let raw = self
            .model
            .predict(&x)?
            .first()
            .copied()
            .ok_or_else(|| BuilderError::Computation("Model returned no prediction".to_string()))?;

        match self.problem_type {
            ProblemType::Regression => Ok(RowPrediction {
                prediction: PredictionValue::Value(raw),
                predicted_label: None,
                probabilities: None,
            }),
            ProblemType::Classification => {
                let code = raw.round().max(0.0) as usize;
                let probabilities = self
                    .model
                    .predict_proba(&x)?
                    .and_then(|p| p.rows().into_iter().next().map(|r| r.to_vec()));
                let predicted_label = self
                    .target_encoder
                    .as_ref()
                    .and_then(|enc| enc.decode(code))
                    .map(str::to_string);

                Ok(RowPrediction {
                    prediction: PredictionValue::Class(code),
                    predicted_label,
                    probabilities,
                })
            }
        }
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_numeric(column: &str, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).ok_or_else(|| {
        BuilderError::InvalidInput(format!(
            "Feature '{}' must be numeric, got {}",
            column,
            value
        ))
    })
}

/// Directory of artifact files keyed by model id
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    /// Open the store, creating the directory if needed
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for an id; ids that are not UUIDs never map to a file
    fn path_for(&self, model_id: &str) -> Option<PathBuf> {
        Uuid::parse_str(model_id)
            .ok()
            .map(|_| self.root.join(format!("{}.json", model_id)))
    }

    /// Persist under a fresh id and return that id
    pub fn save(&self, artifact: &mut ModelArtifact) -> Result<String> {
        let model_id = Uuid::new_v4().to_string();
        artifact.model_id = model_id.clone();
        artifact.schema_version = SCHEMA_VERSION;

        let path = self.root.join(format!("{}.json", model_id));
        artifact.write_new(&path)?;
        info!(model_id = %model_id, algorithm = %artifact.algorithm, "Saved model artifact");
        Ok(model_id)
    }

    pub fn exists(&self, model_id: &str) -> bool {
        self.path_for(model_id).is_some_and(|p| p.is_file())
    }

    pub fn load(&self, model_id: &str) -> Result<ModelArtifact> {
        let path = self
            .path_for(model_id)
            .filter(|p| p.is_file())
            .ok_or_else(|| BuilderError::NotFound("Model not found".to_string()))?;
        debug!(model_id = %model_id, "Loading model artifact");

        let mut artifact = ModelArtifact::read_from(path)?;
        if artifact.model_id.is_empty() {
            artifact.model_id = model_id.to_string();
        }
        Ok(artifact)
    }

    /// Remove an artifact; `false` when there was nothing to remove
    pub fn delete(&self, model_id: &str) -> Result<bool> {
        match self.path_for(model_id).filter(|p| p.is_file()) {
            Some(path) => {
                fs::remove_file(path)?;
                info!(model_id = %model_id, "Deleted model artifact");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RegressionMetrics;
    use crate::training::{DecisionTree, LinearRegression};
    use ndarray::array;
    use serde_json::json;

    fn regression_metrics() -> Metrics {
        Metrics::Regression(RegressionMetrics {
            r2_score: 1.0,
            mean_squared_error: 0.0,
            mean_absolute_error: 0.0,
            root_mean_squared_error: 0.0,
            mean_squared_log_error: None,
        })
    }

    fn legacy_artifact() -> ModelArtifact {
        let mut model = TrainedModel::LinearRegression(LinearRegression::new());
        model
            .fit(&array![[0.0], [1.0], [2.0], [3.0]], &array![1.0, 3.0, 5.0, 7.0])
            .unwrap();
        ModelArtifact {
            schema_version: 1,
            model_id: String::new(),
            algorithm: "Linear Regression".to_string(),
            problem_type: ProblemType::Regression,
            input_columns: vec!["x".to_string()],
            output_column: "y".to_string(),
            metrics: regression_metrics(),
            model,
            encoders: BTreeMap::new(),
            scaler: None,
            target_encoder: None,
            name: String::new(),
            description: None,
            created_at: Utc::now(),
        }
    }

    fn city_classifier() -> ModelArtifact {
        let encoder = LabelEncoder::fit(["berlin", "paris"]);
        let x = array![[0.0, 1.0], [0.0, 2.0], [1.0, 8.0], [1.0, 9.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = TrainedModel::DecisionTreeClassifier(DecisionTree::new_classifier());
        model.fit(&x, &y).unwrap();

        let mut encoders = BTreeMap::new();
        encoders.insert("city".to_string(), encoder);
        ModelArtifact {
            schema_version: SCHEMA_VERSION,
            input_columns: vec!["city".to_string(), "age".to_string()],
            problem_type: ProblemType::Classification,
            algorithm: "Decision Tree".to_string(),
            encoders,
            target_encoder: Some(LabelEncoder::fit(["no", "yes"])),
            model,
            ..legacy_artifact()
        }
    }

    fn features(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_legacy_numeric_prediction() {
        let artifact = legacy_artifact();
        let out = artifact.predict_row(&features(&[("x", json!("4"))])).unwrap();
        match out.prediction {
            PredictionValue::Value(v) => assert!((v - 9.0).abs() < 1e-6),
            PredictionValue::Class(_) => panic!("expected a regression value"),
        }
        assert!(out.probabilities.is_none());
    }

    #[test]
    fn test_legacy_rejects_text() {
        let err = legacy_artifact()
            .predict_row(&features(&[("x", json!("abc"))]))
            .unwrap_err();
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn test_missing_feature() {
        let err = legacy_artifact().predict_row(&HashMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "Missing feature: x");
    }

    #[test]
    fn test_encoded_prediction_decodes_label() {
        let artifact = city_classifier();
        let out = artifact
            .predict_row(&features(&[("city", json!("paris")), ("age", json!(9))]))
            .unwrap();
        assert_eq!(out.prediction, PredictionValue::Class(1));
        assert_eq!(out.predicted_label.as_deref(), Some("yes"));
        assert_eq!(out.probabilities.map(|p| p.len()), Some(2));
    }

    #[test]
    fn test_unseen_category_lists_vocabulary() {
        let err = city_classifier()
            .predict_row(&features(&[("city", json!("tokyo")), ("age", json!(3))]))
            .unwrap_err();
        let msg = err.to_string();
        assert!(err.is_client_error());
        assert!(msg.contains("city"));
        assert!(msg.contains("berlin"));
    }

    #[test]
    fn test_missing_schema_version_reads_as_legacy() {
        let mut value = serde_json::to_value(legacy_artifact()).unwrap();
        value.as_object_mut().unwrap().remove("schema_version");
        let artifact = ModelArtifact::from_json(value).unwrap();
        assert_eq!(artifact.schema_version, 1);
        assert!(artifact.is_legacy());
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut value = serde_json::to_value(legacy_artifact()).unwrap();
        value["schema_version"] = json!(SCHEMA_VERSION + 1);
        assert!(matches!(
            ModelArtifact::from_json(value),
            Err(BuilderError::UnsupportedSchema { .. })
        ));
    }

    #[test]
    fn test_store_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::open(dir.path()).unwrap();

        let mut artifact = city_classifier();
        let id = store.save(&mut artifact).unwrap();
        assert!(store.exists(&id));

        let loaded = store.load(&id).unwrap();
        assert_eq!(loaded.model_id, id);
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);

        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(matches!(store.load(&id), Err(BuilderError::NotFound(_))));
    }

    #[test]
    fn test_store_rejects_non_uuid_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::open(dir.path()).unwrap();
        assert!(matches!(store.load("../registry"), Err(BuilderError::NotFound(_))));
    }

    #[test]
    fn test_write_new_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let artifact = legacy_artifact();
        artifact.write_new(&path).unwrap();
        assert!(artifact.write_new(&path).is_err());
    }
}
