pub mod backoff;
pub mod client;
pub mod config;
pub mod errors;
pub mod input;
pub mod interrupt;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod processor;
pub mod queue;
pub mod resize;
pub mod traits;
pub mod worker;

pub mod mocks;

pub use backoff::{ExponentialBackoff, FixedBackoff, RetryPolicy};
pub use client::{HttpSegmentationService, RemoteSegmenter};
pub use config::Config;
pub use errors::{ErrorKind, PipelineError, Result};
pub use output::OutputPaths;
pub use pipeline::{BatchPipeline, BatchReport};
pub use processor::{ItemProcessor, ProcessingOutcome};
pub use traits::*;
pub use worker::{FixedWorkerPool, JobHandler, WorkerPool};

/// Wires the HTTP service, retry policy and worker pool described by `config`.
pub fn build_pipeline(
    config: &Config,
) -> Result<BatchPipeline<HttpSegmentationService, FixedWorkerPool>> {
    let service = HttpSegmentationService::new(config.service_url.clone(), config.request_timeout())?;
    let segmenter =
        RemoteSegmenter::new(service, config.retry_policy()).with_jpeg_quality(config.jpeg_quality);

    Ok(BatchPipeline::new(segmenter, FixedWorkerPool::new(config.workers))
        .with_progress(!config.no_progress))
}
