//! Model Builder CLI Module
//!
//! Runs the HTTP server, or the analyze/predict flows offline against local files.

use clap::{Parser, Subcommand};
use colored::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::artifact::{ModelStore, ModelArtifact, PredictionValue};
use crate::metrics::Metrics;
use crate::pipeline::{analyze, AnalysisOptions};
use crate::server::{run_server, ServerConfig};
use crate::training::ProblemType;
use crate::utils::DataLoader;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "model-builder")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train a roster of models on a CSV, keep the best one and serve predictions")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API (default)
    Serve {
        /// Server host
        #[arg(long, env = "API_HOST")]
        host: Option<String>,

        /// Server port
        #[arg(short, long, env = "API_PORT")]
        port: Option<u16>,
    },

    /// Train every roster algorithm on a CSV and save the best model
    Analyze {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Output (target) column
        #[arg(short, long)]
        target: String,

        /// Comma-separated input columns
        #[arg(short, long, value_delimiter = ',', required = true)]
        inputs: Vec<String>,

        /// Problem type (classification, regression)
        #[arg(long)]
        problem: String,

        /// Directory the artifact is written to
        #[arg(long, env = "MODELS_DIR", default_value = "./models")]
        models_dir: PathBuf,

        /// Display name stored with the model
        #[arg(long)]
        name: Option<String>,
    },

    /// Predict one row with a saved artifact
    Predict {
        /// Artifact JSON file
        #[arg(short, long)]
        model: PathBuf,

        /// Feature values as a JSON object, e.g. '{"age": 31, "city": "paris"}'
        #[arg(short, long)]
        features: String,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    run_server(config).await
}

fn headline(metrics: &Metrics) -> String {
    match metrics {
        Metrics::Classification(m) => format!(
            "acc {:.4}  f1 {:.4}  auc {}",
            m.accuracy,
            m.f1_score,
            m.roc_auc.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v))
        ),
        Metrics::Regression(m) => format!(
            "r2 {:.4}  rmse {:.4}  mae {:.4}",
            m.r2_score, m.root_mean_squared_error, m.mean_absolute_error
        ),
    }
}

pub fn cmd_analyze(
    data_path: &Path,
    target: &str,
    inputs: &[String],
    problem: &str,
    models_dir: &Path,
    name: Option<String>,
) -> anyhow::Result<()> {
    section("Analyze");
    let problem: ProblemType = problem.parse()?;

    step_run("Loading data");
    let start = Instant::now();
    let df = DataLoader::new().load_csv(data_path)?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    step_run(&format!("Training {} roster", problem.as_str().cyan()));
    let start = Instant::now();
    let mut report = analyze(
        &df,
        inputs,
        target,
        problem,
        AnalysisOptions {
            name,
            description: None,
        },
    )?;
    step_done(&format!("{} algorithms in {:?}", report.results.len(), start.elapsed()));

    println!();
    println!("  {:<26} {:<40} {:>8}", muted("Algorithm"), muted("Metrics"), muted("Time"));
    println!("  {}", dim(&"─".repeat(76)));
    for result in &report.results {
        let marker = if result.algorithm == report.recommended.algorithm {
            ok("★").to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{} {:<26} {:<40} {:>7.3}s",
            marker,
            result.algorithm,
            headline(&result.metrics),
            result.training_time
        );
    }
    println!("  {}", dim(&"─".repeat(76)));

    let store = ModelStore::open(models_dir)?;
    let model_id = store.save(&mut report.artifact)?;

    println!();
    println!("  {} {}", ok("best"), report.recommended.algorithm.white().bold());
    println!("  {}", muted(&report.recommended.justification));
    println!();
    println!("  {:<10} {}", muted("Model id"), model_id.white());
    println!(
        "  {:<10} {}",
        muted("Saved to"),
        store.root().join(format!("{}.json", model_id)).display()
    );
    println!();
    Ok(())
}

pub fn cmd_predict(model_path: &Path, features: &str) -> anyhow::Result<()> {
    section("Predict");

    let artifact = ModelArtifact::read_from(model_path)?;
    let features: HashMap<String, serde_json::Value> = serde_json::from_str(features)
        .map_err(|e| anyhow::anyhow!("--features must be a JSON object: {}", e))?;

    let start = Instant::now();
    let row = artifact.predict_row(&features)?;
    let elapsed = start.elapsed();

    let value = match row.prediction {
        PredictionValue::Class(code) => match &row.predicted_label {
            Some(label) => format!("{} (class {})", label, code),
            None => format!("class {}", code),
        },
        PredictionValue::Value(v) => format!("{:.6}", v),
    };

    println!("  {:<14} {}", muted("Algorithm"), artifact.algorithm.white());
    println!("  {:<14} {}", muted("Prediction"), value.white().bold());
    if let Some(proba) = &row.probabilities {
        let formatted: Vec<String> = proba.iter().map(|p| format!("{:.4}", p)).collect();
        println!("  {:<14} [{}]", muted("Probabilities"), formatted.join(", "));
    }
    println!("  {:<14} {:?}", muted("Latency"), elapsed);
    println!();
    Ok(())
}
