//! HTTP request handlers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::artifact::PredictionValue;
use crate::metrics::Metrics;
use crate::monitoring::ProcessUsage;
use crate::pipeline::{analyze as run_analysis, AnalysisOptions};
use crate::registry::{RegistryEntry, UsageSummary};
use crate::training::ProblemType;

use super::error::{Result, ServerError};
use super::state::{AppState, UploadInfo};

const PREDICT_ENDPOINT: &str = "/api/predict";

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "ML Model Builder API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "system": state.monitor.sample_system(),
    }))
}

// ============================================================================
// Upload
// ============================================================================

/// Store an uploaded CSV under a fresh upload id and parse it
pub async fn upload_csv(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if !filename.to_ascii_lowercase().ends_with(".csv") {
            return Err(ServerError::BadRequest("File must be a CSV file".to_string()));
        }
        let data = field.bytes().await.map_err(|e| ServerError::BadRequest(e.to_string()))?;

        let upload_id = AppState::generate_id();
        let path = state.upload_path(&upload_id);
        tokio::fs::write(&path, &data).await?;

        let loader = state.loader.clone();
        let parsed = tokio::task::spawn_blocking(move || loader.load_csv_bytes(&data)).await?;
        let df = match parsed {
            Ok(df) => df,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %rm, "Failed to remove rejected upload");
                }
                return Err(ServerError::BadRequest(format!("Error reading CSV: {}", e)));
            }
        };

        let upload = UploadInfo::new(upload_id.clone(), filename.clone(), path, df);
        info!(upload_id = %upload_id, filename = %filename, rows = upload.rows, columns = upload.columns.len(), "Stored upload");

        let response = json!({
            "uploadId": upload_id,
            "filename": filename,
            "columns": upload.columns,
            "rows": upload.rows,
            "message": "File uploaded successfully",
        });
        state.store_upload(upload).await;
        return Ok(Json(response));
    }

    Err(ServerError::BadRequest("No file uploaded".to_string()))
}

// ============================================================================
// Analyze
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub upload_id: String,
    pub problem_type: String,
    pub input_columns: Vec<String>,
    pub output_column: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn usage_example(model_id: &str, columns: &[String]) -> String {
    let first = columns.first().map_or("column1", String::as_str);
    let second = columns.get(1).map_or("column2", String::as_str);
    format!(
        "POST {}\n{{\n  \"modelId\": \"{}\",\n  \"features\": {{\n    \"{}\": \"value1\",\n    \"{}\": \"value2\"\n  }}\n}}",
        PREDICT_ENDPOINT, model_id, first, second
    )
}

/// Train the roster on an upload, persist the winner and describe the results
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<Value>> {
    let problem: ProblemType = request.problem_type.parse()?;
    let upload = state.upload(&request.upload_id).await?;
    info!(
        upload_id = %request.upload_id,
        problem = %problem,
        inputs = ?request.input_columns,
        output = %request.output_column,
        "Analyzing upload"
    );

    let store = state.store.clone();
    let options = AnalysisOptions {
        name: request.name,
        description: request.description,
    };
    let (report, model_id) = tokio::task::spawn_blocking(move || -> crate::error::Result<_> {
        let mut report = run_analysis(
            &upload.data,
            &request.input_columns,
            &request.output_column,
            problem,
            options,
        )?;
        let model_id = store.save(&mut report.artifact)?;
        Ok((report, model_id))
    })
    .await??;

    if let Err(e) = state
        .registry
        .insert(RegistryEntry::from_artifact(&report.artifact))
        .await
    {
        match state.store.delete(&model_id) {
            Ok(_) => warn!(model_id = %model_id, error = %e, "Registry insert failed, removed artifact"),
            Err(rm) => warn!(model_id = %model_id, error = %e, cleanup_error = %rm, "Registry insert failed, artifact left on disk"),
        }
        return Err(e.into());
    }

    let columns = &report.artifact.input_columns;
    let features: serde_json::Map<String, Value> =
        columns.iter().map(|c| (c.clone(), json!("value"))).collect();

    Ok(Json(json!({
        "modelId": model_id,
        "recommended": report.recommended,
        "results": report.results,
        "apiEndpoint": PREDICT_ENDPOINT,
        "apiUsage": {
            "method": "POST",
            "url": PREDICT_ENDPOINT,
            "body": {
                "modelId": model_id,
                "features": features,
            },
            "example": usage_example(&model_id, columns),
        },
    })))
}

// ============================================================================
// Predict
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    pub model_id: String,
    pub features: HashMap<String, Value>,
    #[serde(default)]
    pub caller_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    pub prediction: PredictionValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_label: Option<String>,
    pub probabilities: Option<Vec<f64>>,
    pub algorithm: String,
    pub problem_type: ProblemType,
    pub latency_ms: f64,
    pub resources: ProcessUsage,
}

/// Predict one row with a persisted model and record the call
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>> {
    let start = Instant::now();
    let store = state.store.clone();
    let model_id = request.model_id.clone();
    let features = request.features;

    let (artifact, row) = tokio::task::spawn_blocking(move || -> crate::error::Result<_> {
        let artifact = store.load(&model_id)?;
        let row = artifact.predict_row(&features)?;
        Ok((artifact, row))
    })
    .await??;

    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    let resources = state.monitor.sample_process();

    if let Err(e) = state
        .registry
        .record_prediction(&request.model_id, latency_ms, resources, request.caller_id.as_deref())
        .await
    {
        warn!(model_id = %request.model_id, error = %e, "Failed to record prediction in registry");
    }

    Ok(Json(PredictResponse {
        prediction: row.prediction,
        predicted_label: row.predicted_label,
        probabilities: row.probabilities,
        algorithm: artifact.algorithm,
        problem_type: artifact.problem_type,
        latency_ms,
        resources,
    }))
}

// ============================================================================
// Models
// ============================================================================

pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let models = state.registry.list().await?;
    Ok(Json(json!({
        "count": models.len(),
        "models": models,
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDetails {
    pub model_id: String,
    pub name: String,
    pub description: Option<String>,
    pub algorithm: String,
    pub problem_type: ProblemType,
    pub input_columns: Vec<String>,
    pub output_column: String,
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,
    pub schema_version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub usage: UsageSummary,
}

/// Artifact metadata merged with the registry usage summary
pub async fn get_model(
    Path(model_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ModelDetails>> {
    let store = state.store.clone();
    let id = model_id.clone();
    let artifact = tokio::task::spawn_blocking(move || store.load(&id)).await??;
    let usage = state
        .registry
        .get(&model_id)
        .await?
        .map(|entry| entry.summary())
        .unwrap_or_default();

    Ok(Json(ModelDetails {
        model_id,
        name: artifact.name,
        description: artifact.description,
        algorithm: artifact.algorithm,
        problem_type: artifact.problem_type,
        input_columns: artifact.input_columns,
        output_column: artifact.output_column,
        metrics: artifact.metrics,
        classes: artifact.target_encoder.map(|enc| enc.classes().to_vec()),
        schema_version: artifact.schema_version,
        created_at: artifact.created_at,
        usage,
    }))
}

/// Remove the artifact and the registry entry; 404 only when neither exists
pub async fn delete_model(
    Path(model_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>> {
    let removed_file = state.store.delete(&model_id)?;
    let removed_entry = state.registry.remove(&model_id).await?;

    if !removed_file && !removed_entry {
        return Err(ServerError::NotFound("Model not found".to_string()));
    }
    info!(model_id = %model_id, removed_file, removed_entry, "Deleted model");
    Ok(Json(json!({
        "success": true,
        "message": format!("Model '{}' deleted", model_id),
    })))
}
