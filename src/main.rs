//! Model Builder - Main Entry Point
//!
//! Serves the HTTP API by default; `analyze` and `predict` run offline.

use clap::Parser;
use model_builder::cli::{cmd_analyze, cmd_predict, cmd_serve, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "model_builder=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            cmd_serve(host, port).await?;
        }
        Some(Commands::Analyze { data, target, inputs, problem, models_dir, name }) => {
            tokio::task::spawn_blocking(move || {
                cmd_analyze(&data, &target, &inputs, &problem, &models_dir, name)
            })
            .await??;
        }
        Some(Commands::Predict { model, features }) => {
            cmd_predict(&model, &features)?;
        }
        None => {
            cmd_serve(None, None).await?;
        }
    }

    Ok(())
}
