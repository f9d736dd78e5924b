//! Application state management

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use polars::prelude::DataFrame;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::artifact::ModelStore;
use crate::error::BuilderError;
use crate::monitoring::ResourceMonitor;
use crate::registry::{ModelRegistry, RegistryConfig};
use crate::utils::DataLoader;

use super::error::{Result, ServerError};
use super::ServerConfig;

/// An uploaded dataset kept in memory
#[derive(Debug, Clone)]
pub struct UploadInfo {
    pub id: String,
    pub filename: String,
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub rows: usize,
    pub data: Arc<DataFrame>,
}

impl UploadInfo {
    pub fn new(id: String, filename: String, path: PathBuf, df: DataFrame) -> Self {
        let columns = df.get_column_names().iter().map(|s| s.to_string()).collect();
        Self {
            id,
            filename,
            path,
            columns,
            rows: df.height(),
            data: Arc::new(df),
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub uploads: RwLock<HashMap<String, UploadInfo>>,
    pub store: ModelStore,
    pub registry: ModelRegistry,
    pub monitor: ResourceMonitor,
    pub loader: DataLoader,
}

impl AppState {
    /// Create directories and open the model store and registry
    pub async fn new(config: ServerConfig) -> crate::error::Result<Self> {
        tokio::fs::create_dir_all(&config.upload_dir).await?;
        let store = ModelStore::open(&config.models_dir)?;
        let registry = ModelRegistry::open(
            RegistryConfig::new(&config.registry_path).with_max_samples(config.max_samples),
        )
        .await?;

        Ok(Self {
            config,
            uploads: RwLock::new(HashMap::new()),
            store,
            registry,
            monitor: ResourceMonitor::new(),
            loader: DataLoader::new(),
        })
    }

    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn upload_path(&self, upload_id: &str) -> PathBuf {
        self.config.upload_dir.join(format!("{}.csv", upload_id))
    }

    pub async fn store_upload(&self, info: UploadInfo) {
        self.uploads.write().await.insert(info.id.clone(), info);
    }

    /// Look up an upload, reloading it from `upload_dir` when it is not in memory
    pub async fn upload(&self, upload_id: &str) -> Result<UploadInfo> {
        if let Some(info) = self.uploads.read().await.get(upload_id) {
            return Ok(info.clone());
        }

        let not_found = || {
            ServerError::NotFound(format!(
                "Upload not found. UploadId: {}. Please upload your CSV file again.",
                upload_id
            ))
        };
        if Uuid::parse_str(upload_id).is_err() {
            return Err(not_found());
        }
        let path = self.upload_path(upload_id);
        if !path.is_file() {
            return Err(not_found());
        }

        let loader = self.loader.clone();
        let load_path = path.clone();
        let df = tokio::task::spawn_blocking(move || loader.load_csv(&load_path))
            .await?
            .map_err(|e: BuilderError| {
                ServerError::NotFound(format!("Upload not found and could not restore from file: {}", e))
            })?;

        let info = UploadInfo::new(upload_id.to_string(), format!("{}.csv", upload_id), path, df);
        info!(upload_id = %upload_id, rows = info.rows, "Restored upload from disk");
        self.store_upload(info.clone()).await;
        Ok(info)
    }
}
