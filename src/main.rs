use anyhow::{Context, Result};
use clap::Parser;
use matte_pipeline::interrupt::{escalate_interrupts, INTERRUPTED_EXIT_CODE};
use matte_pipeline::logging::init_tracing;
use matte_pipeline::{build_pipeline, Config, WorkerPool};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    let pipeline = build_pipeline(&config).context("Failed to set up the pipeline")?;
    init_tracing(config.verbose, pipeline.progress());

    info!(
        "Segmenting {} into {} via {}",
        config.input_dir.display(),
        config.output_dir.display(),
        config.service_url
    );

    let cancellation_token = pipeline.pool().cancellation_token();
    tokio::spawn(async move {
        if escalate_interrupts(tokio::signal::ctrl_c, cancellation_token).await {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    let report = pipeline
        .run(&config.input_dir, &config.output_dir)
        .await
        .with_context(|| format!("Batch over {} failed", config.input_dir.display()))?;

    // per-image failures are in the log and never change the exit status
    if report.failed() > 0 {
        warn!("{} of {} images failed", report.failed(), report.total);
    }

    Ok(())
}
