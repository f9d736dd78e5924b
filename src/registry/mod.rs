//! JSON model registry with usage and resource statistics
//!
//! The registry is a single JSON document. Every read-modify-write cycle
//! holds an async mutex, and writes land in a temp file that is renamed over
//! the document.

use crate::artifact::ModelArtifact;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::monitoring::ProcessUsage;
use crate::training::ProblemType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Location of the registry document
    pub path: PathBuf,
    /// Newest samples kept per list
    pub max_samples: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./models/registry.json"),
            max_samples: 500,
        }
    }
}

impl RegistryConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySample {
    pub timestamp: DateTime<Utc>,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: Option<f64>,
    pub memory_mb: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub timestamp: DateTime<Utc>,
    pub latency_ms: f64,
    pub caller_id: Option<String>,
}

/// Artifact metadata plus mutable usage counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub model_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub algorithm: String,
    pub problem_type: ProblemType,
    pub input_columns: Vec<String>,
    pub output_column: String,
    pub metrics: Metrics,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub call_count: u64,
    #[serde(default)]
    pub callers: BTreeSet<String>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latency_samples: Vec<LatencySample>,
    #[serde(default)]
    pub resource_samples: Vec<ResourceSample>,
    #[serde(default)]
    pub performance_history: Vec<PerformanceRecord>,
}

/// Aggregates reported by the model detail endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub average_cpu_percent: Option<f64>,
    pub peak_memory_mb: Option<f64>,
    pub average_latency_ms: Option<f64>,
    pub call_count: u64,
    pub distinct_callers: usize,
    pub last_used: Option<DateTime<Utc>>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

fn keep_newest<T>(samples: &mut Vec<T>, max: usize) {
    if samples.len() > max {
        samples.drain(..samples.len() - max);
    }
}

impl RegistryEntry {
    pub fn from_artifact(artifact: &ModelArtifact) -> Self {
        Self {
            model_id: artifact.model_id.clone(),
            name: artifact.name.clone(),
            description: artifact.description.clone(),
            algorithm: artifact.algorithm.clone(),
            problem_type: artifact.problem_type,
            input_columns: artifact.input_columns.clone(),
            output_column: artifact.output_column.clone(),
            metrics: artifact.metrics.clone(),
            created_at: artifact.created_at,
            call_count: 0,
            callers: BTreeSet::new(),
            last_used: None,
            latency_samples: Vec::new(),
            resource_samples: Vec::new(),
            performance_history: Vec::new(),
        }
    }

    /// Count one prediction and append its samples, trimming to `max_samples`
    pub fn record(&mut self, latency_ms: f64, usage: ProcessUsage, caller_id: Option<&str>, max_samples: usize) {
        let now = Utc::now();
        self.call_count += 1;
        self.last_used = Some(now);
        if let Some(caller) = caller_id {
            self.callers.insert(caller.to_string());
        }

        self.latency_samples.push(LatencySample {
            timestamp: now,
            latency_ms,
        });
        self.resource_samples.push(ResourceSample {
            timestamp: now,
            cpu_percent: usage.cpu_percent,
            memory_mb: usage.memory_mb,
        });
        self.performance_history.push(PerformanceRecord {
            timestamp: now,
            latency_ms,
            caller_id: caller_id.map(str::to_string),
        });

        keep_newest(&mut self.latency_samples, max_samples);
        keep_newest(&mut self.resource_samples, max_samples);
        keep_newest(&mut self.performance_history, max_samples);
    }

    pub fn summary(&self) -> UsageSummary {
        UsageSummary {
            average_cpu_percent: mean(self.resource_samples.iter().filter_map(|s| s.cpu_percent)),
            peak_memory_mb: self
                .resource_samples
                .iter()
                .filter_map(|s| s.memory_mb)
                .fold(None, |peak: Option<f64>, m| Some(peak.map_or(m, |p| p.max(m)))),
            average_latency_ms: mean(self.latency_samples.iter().map(|s| s.latency_ms)),
            call_count: self.call_count,
            distinct_callers: self.callers.len(),
            last_used: self.last_used,
        }
    }
}

/// On-disk layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    models: BTreeMap<String, RegistryEntry>,
}

/// Registry handle; cheap to share behind an `Arc`
pub struct ModelRegistry {
    config: RegistryConfig,
    lock: Mutex<()>,
}

impl ModelRegistry {
    /// Open the registry, creating its parent directory if needed
    pub async fn open(config: RegistryConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            config,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    async fn read_document(&self) -> Result<RegistryDocument> {
        match tokio::fs::read(&self.config.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(RegistryDocument::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RegistryDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, doc: &RegistryDocument) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = self.config.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.config.path).await?;
        debug!(path = %self.config.path.display(), models = doc.models.len(), "Wrote registry");
        Ok(())
    }

    /// Add or replace an entry
    pub async fn insert(&self, entry: RegistryEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        doc.models.insert(entry.model_id.clone(), entry);
        self.write_document(&doc).await
    }

    pub async fn list(&self) -> Result<Vec<RegistryEntry>> {
        let _guard = self.lock.lock().await;
        let mut entries: Vec<RegistryEntry> = self.read_document().await?.models.into_values().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    pub async fn get(&self, model_id: &str) -> Result<Option<RegistryEntry>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document().await?.models.remove(model_id))
    }

    /// Remove an entry; `false` when it was not present
    pub async fn remove(&self, model_id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        let removed = doc.models.remove(model_id).is_some();
        if removed {
            self.write_document(&doc).await?;
        }
        Ok(removed)
    }

    /// Record one prediction; `false` when the model has no entry
    pub async fn record_prediction(
        &self,
        model_id: &str,
        latency_ms: f64,
        usage: ProcessUsage,
        caller_id: Option<&str>,
    ) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        let Some(entry) = doc.models.get_mut(model_id) else {
            warn!(model_id = %model_id, "Prediction for a model missing from the registry");
            return Ok(false);
        };
        entry.record(latency_ms, usage, caller_id, self.config.max_samples);
        self.write_document(&doc).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ClassificationMetrics;
    use std::sync::Arc;

    fn entry(id: &str) -> RegistryEntry {
        RegistryEntry {
            model_id: id.to_string(),
            name: "Random Forest model".to_string(),
            description: None,
            algorithm: "Random Forest".to_string(),
            problem_type: ProblemType::Classification,
            input_columns: vec!["age".to_string()],
            output_column: "label".to_string(),
            metrics: Metrics::Classification(ClassificationMetrics {
                accuracy: 0.9,
                precision: 0.9,
                recall: 0.9,
                f1_score: 0.9,
                roc_auc: None,
            }),
            created_at: Utc::now(),
            call_count: 0,
            callers: BTreeSet::new(),
            last_used: None,
            latency_samples: Vec::new(),
            resource_samples: Vec::new(),
            performance_history: Vec::new(),
        }
    }

    fn usage(cpu: f64, mem: f64) -> ProcessUsage {
        ProcessUsage {
            cpu_percent: Some(cpu),
            memory_mb: Some(mem),
        }
    }

    #[test]
    fn test_summary_aggregates() {
        let mut e = entry("a");
        e.record(10.0, usage(20.0, 100.0), Some("alice"), 500);
        e.record(30.0, usage(40.0, 150.0), Some("bob"), 500);
        e.record(20.0, ProcessUsage::default(), Some("alice"), 500);

        let s = e.summary();
        assert_eq!(s.call_count, 3);
        assert_eq!(s.distinct_callers, 2);
        assert_eq!(s.average_cpu_percent, Some(30.0));
        assert_eq!(s.peak_memory_mb, Some(150.0));
        assert_eq!(s.average_latency_ms, Some(20.0));
        assert!(s.last_used.is_some());
    }

    #[test]
    fn test_samples_are_capped() {
        let mut e = entry("a");
        for i in 0..10 {
            e.record(i as f64, usage(1.0, 1.0), None, 4);
        }
        assert_eq!(e.latency_samples.len(), 4);
        assert_eq!(e.performance_history.len(), 4);
        assert_eq!(e.latency_samples[0].latency_ms, 6.0);
        assert_eq!(e.call_count, 10);
    }

    #[test]
    fn test_empty_summary() {
        let s = entry("a").summary();
        assert_eq!(s.average_cpu_percent, None);
        assert_eq!(s.call_count, 0);
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::open(RegistryConfig::new(dir.path().join("registry.json")))
            .await
            .unwrap();

        registry.insert(entry("a")).await.unwrap();
        registry.insert(entry("b")).await.unwrap();
        assert_eq!(registry.list().await.unwrap().len(), 2);
        assert!(registry.get("a").await.unwrap().is_some());

        assert!(registry.remove("a").await.unwrap());
        assert!(!registry.remove("a").await.unwrap());
        assert!(registry.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_predictions_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(
            ModelRegistry::open(RegistryConfig::new(dir.path().join("registry.json")))
                .await
                .unwrap(),
        );
        registry.insert(entry("m")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let caller = format!("caller-{}", i % 5);
                registry
                    .record_prediction("m", 1.0, ProcessUsage::default(), Some(&caller))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let summary = registry.get("m").await.unwrap().unwrap().summary();
        assert_eq!(summary.call_count, 20);
        assert_eq!(summary.distinct_callers, 5);
    }

    #[tokio::test]
    async fn test_unknown_model_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::open(RegistryConfig::new(dir.path().join("registry.json")))
            .await
            .unwrap();
        assert!(!registry
            .record_prediction("missing", 1.0, ProcessUsage::default(), None)
            .await
            .unwrap());
    }
}
