//! Kestrel batch entrypoint.

use std::path::{Path, PathBuf};

use anyhow::Context;
use mimalloc::MiMalloc;
use tokio::signal;

use kestrel::config::PipelineConfig;
use kestrel::pipeline::SupportPipeline;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const USAGE: &str = "usage: kestrel <input.json> [output.json]\n       kestrel --health-check";
const DEFAULT_OUTPUT: &str = "data/results.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = PipelineConfig::from_env()?;
    config.validate()?;
    let pipeline =
        SupportPipeline::from_config(&config).context("failed to build support pipeline")?;

    if args.iter().any(|arg| arg == "--health-check") {
        let health = pipeline.check_health().await;
        println!("{}", serde_json::to_string_pretty(&health)?);
        pipeline.shutdown();
        std::process::exit(if health.healthy { 0 } else { 1 });
    }

    let positional: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|arg| !arg.starts_with("--"))
        .collect();
    let Some(input) = positional.first() else {
        eprintln!("{USAGE}");
        pipeline.shutdown();
        std::process::exit(2);
    };
    let output = positional
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    if config.auto_warmup {
        pipeline.warmup().await;
    }

    tracing::info!(input = %input, output = %output.display(), "Processing batch");
    let summary = tokio::select! {
        result = pipeline.run_batch_file(Path::new(input), &output) => result?,
        _ = signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, abandoning batch");
            pipeline.shutdown();
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string(&summary)?);
    tracing::info!(status = ?pipeline.system_status().network.state, "Kestrel shutdown complete");
    pipeline.shutdown();
    Ok(())
}
