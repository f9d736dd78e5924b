//! Model Builder Server Module
//!
//! REST API for uploading CSV files, running the model-selection pipeline
//! and serving predictions from persisted artifacts.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::{AppState, UploadInfo};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub models_dir: PathBuf,
    pub registry_path: PathBuf,
    pub max_upload_size: usize,
    /// `None` or `*` allows any origin
    pub cors_origin: Option<String>,
    /// Samples kept per registry list
    pub max_samples: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let models_dir = PathBuf::from(std::env::var("MODELS_DIR").unwrap_or_else(|_| "./models".to_string()));
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            upload_dir: PathBuf::from(std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string())),
            registry_path: std::env::var("REGISTRY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| models_dir.join("registry.json")),
            models_dir,
            max_upload_size: std::env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100 * 1024 * 1024), // 100MB
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty()),
            max_samples: 500,
        }
    }
}

impl ServerConfig {
    /// Keep uploads, artifacts and the registry under one directory
    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.upload_dir = root.join("uploads");
        self.models_dir = root.join("models");
        self.registry_path = self.models_dir.join("registry.json");
        self
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    info!(
        upload_dir = %config.upload_dir.display(),
        models_dir = %config.models_dir.display(),
        registry = %config.registry_path.display(),
        "Initializing server directories"
    );

    let state = Arc::new(AppState::new(config.clone()).await?);
    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        "Model Builder API starting"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl+c");
            return;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server gracefully");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_root_layout() {
        let config = ServerConfig::default().with_data_root("/tmp/mb");
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/mb/uploads"));
        assert_eq!(config.registry_path, PathBuf::from("/tmp/mb/models/registry.json"));
        assert_eq!(config.max_samples, 500);
    }
}
