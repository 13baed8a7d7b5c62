//! Model Packager - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use model_packager::{CommandArgs, DefaultClients, app};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "model-packager")]
#[command(about = "Package HuggingFace models to disk or S3 and register them with SageMaker", long_about = None)]
#[command(
    after_help = "Weights are stored as float16 safetensors. Repositories that ship only \
pickle checkpoints (pytorch_model.bin) cannot be packaged."
)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    command: CommandArgs,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for results
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    let outcome = app::execute(
        &cli.command,
        cli.config,
        |key| std::env::var(key).ok(),
        &DefaultClients,
    )
    .await
    .with_context(|| format!("{} failed", cli.command.operation))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("Failed to serialize result")?
    );

    Ok(())
}
