use crate::client::RemoteSegmenter;
use crate::errors::{PipelineError, Result};
use crate::input::collect_image_files;
use crate::output::OutputPaths;
use crate::processor::{ItemProcessor, ProcessingOutcome};
use crate::queue::{InMemoryJobQueue, Job, JobQueue};
use crate::traits::SegmentationService;
use crate::worker::WorkerPool;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tally of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed_files: Vec<String>,
    /// Files never started because the run was interrupted.
    pub skipped: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.failed_files.len()
    }

    fn from_outcomes(
        total: usize,
        outcomes: &[ProcessingOutcome],
        skipped: usize,
        elapsed: Duration,
    ) -> Self {
        let mut failed_files: Vec<_> = outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| o.file_name.clone())
            .collect();
        failed_files.sort();

        Self {
            total,
            succeeded: outcomes.iter().filter(|o| o.succeeded()).count(),
            failed_files,
            skipped,
            elapsed,
        }
    }
}

/// Enumerates a directory and pushes every eligible file through the worker pool.
pub struct BatchPipeline<S: SegmentationService + 'static, P: WorkerPool> {
    segmenter: Arc<RemoteSegmenter<S>>,
    pool: P,
    progress: ProgressBar,
}

impl<S: SegmentationService + 'static, P: WorkerPool> BatchPipeline<S, P> {
    pub fn new(segmenter: RemoteSegmenter<S>, pool: P) -> Self {
        Self {
            segmenter: Arc::new(segmenter),
            pool,
            progress: ProgressBar::hidden(),
        }
    }

    /// Draws a progress bar on stderr while a batch runs.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.progress = if show_progress {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        self
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn segmenter(&self) -> &RemoteSegmenter<S> {
        &self.segmenter
    }

    /// The bar advanced once per finished file. Log output should be written
    /// through [`ProgressBar::suspend`] so it does not tear the bar.
    pub fn progress(&self) -> &ProgressBar {
        &self.progress
    }

    /// Processes every eligible file of `input_dir` into `output_root`.
    ///
    /// Only setup failures (listing the input, creating the output directories) are
    /// returned as errors; per-file failures are counted in the report.
    pub async fn run(&self, input_dir: &Path, output_root: &Path) -> Result<BatchReport> {
        let files = collect_image_files(input_dir)?;
        let outputs = Arc::new(OutputPaths::prepare(output_root)?);

        let start = Instant::now();
        let total = files.len();

        let (outcomes, skipped) = if total == 0 {
            info!("No image files found in {}", input_dir.display());
            (Vec::new(), 0)
        } else {
            info!(
                "Processing {} image files with {} workers",
                total,
                self.pool.worker_count()
            );
            self.dispatch(files.into_iter().map(Job::from).collect(), outputs)
                .await?
        };

        let report = BatchReport::from_outcomes(total, &outcomes, skipped, start.elapsed());
        if report.skipped > 0 {
            warn!("{} files were not started because the run was interrupted", report.skipped);
        }
        info!(
            "Total processing time: {:.2} seconds",
            report.elapsed.as_secs_f64()
        );
        info!(
            "{} succeeded, {} failed, {} skipped",
            report.succeeded,
            report.failed(),
            report.skipped
        );
        if !report.failed_files.is_empty() {
            warn!("Failed files: {}", report.failed_files.join(", "));
        }
        Ok(report)
    }

    /// Runs `jobs` through the pool. Returns the outcomes and the number of
    /// jobs still queued when the pool stopped.
    async fn dispatch(
        &self,
        jobs: Vec<Job>,
        outputs: Arc<OutputPaths>,
    ) -> Result<(Vec<ProcessingOutcome>, usize)> {
        let queue = Arc::new(InMemoryJobQueue::new());
        let total = jobs.len();
        queue.enqueue_batch(jobs).await?;
        debug!(queued = total, "jobs enqueued");

        let handler = Arc::new(ItemProcessor::new(Arc::clone(&self.segmenter), outputs));
        self.start_progress(total)?;
        let outcomes = self
            .pool
            .run(queue.clone(), handler, &|_: &ProcessingOutcome| {
                self.progress.inc(1)
            })
            .await;
        self.progress.finish_and_clear();

        // whatever the workers left behind was never started
        let skipped = queue.clear().await?;
        Ok((outcomes?, skipped))
    }

    fn start_progress(&self, len: usize) -> Result<()> {
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )
        .map_err(|e| PipelineError::Configuration {
            message: format!("progress template: {e}"),
        })?
        .progress_chars("#>-");

        self.progress.set_style(style);
        self.progress.set_length(len as u64);
        self.progress.reset();
        Ok(())
    }
}
