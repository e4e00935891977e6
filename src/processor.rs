use crate::client::RemoteSegmenter;
use crate::errors::{ErrorKind, PipelineError, Result};
use crate::output::OutputPaths;
use crate::queue::Job;
use crate::resize::autoresize;
use crate::traits::SegmentationService;
use crate::worker::JobHandler;
use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument};

/// How one file fared. Only used for aggregation and logging, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOutcome {
    pub job_id: String,
    pub file_name: String,
    pub failure: Option<ErrorKind>,
    pub elapsed: Duration,
}

impl ProcessingOutcome {
    pub fn success(job: &Job, elapsed: Duration) -> Self {
        Self {
            job_id: job.id.clone(),
            file_name: job.file_name.clone(),
            failure: None,
            elapsed,
        }
    }

    pub fn failure(job: &Job, kind: ErrorKind, elapsed: Duration) -> Self {
        Self {
            job_id: job.id.clone(),
            file_name: job.file_name.clone(),
            failure: Some(kind),
            elapsed,
        }
    }

    pub const fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Why a single item failed: the stage that broke plus the underlying error.
#[derive(Debug)]
pub struct ItemFailure {
    pub kind: ErrorKind,
    pub error: PipelineError,
}

impl ItemFailure {
    fn at(kind: ErrorKind) -> impl FnOnce(PipelineError) -> Self {
        move |error| Self { kind, error }
    }
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.error)
    }
}

/// Resize, segment and persist a single file.
pub struct ItemProcessor<S: SegmentationService> {
    segmenter: Arc<RemoteSegmenter<S>>,
    outputs: Arc<OutputPaths>,
}

impl<S: SegmentationService + 'static> ItemProcessor<S> {
    pub fn new(segmenter: Arc<RemoteSegmenter<S>>, outputs: Arc<OutputPaths>) -> Self {
        Self { segmenter, outputs }
    }

    /// Loads `job`'s file and runs [`Self::process`] on it.
    #[instrument(skip(self, job), fields(job_id = %job.id, file = %job.file_name))]
    pub async fn process_job(&self, job: &Job) -> std::result::Result<(), ItemFailure> {
        let path = job.input_path.clone();
        let image = tokio::task::spawn_blocking(move || load_image(&path))
            .await
            .map_err(|e| PipelineError::ImageProcessing {
                path: job.input_path.display().to_string(),
                operation: "image loading".to_string(),
                source: Box::new(e),
            })
            .and_then(|loaded| loaded)
            .map_err(ItemFailure::at(ErrorKind::InputRead))?;

        self.process(&job.file_name, image).await
    }

    /// Resizes `image`, submits it, then writes the resized image and its mask.
    ///
    /// Nothing is written unless submission succeeded, and a failed write leaves
    /// neither artifact behind.
    pub async fn process(
        &self,
        file_name: &str,
        image: DynamicImage,
    ) -> std::result::Result<(), ItemFailure> {
        let resized = tokio::task::spawn_blocking(move || autoresize(image))
            .await
            .map_err(PipelineError::from)
            .map_err(ItemFailure::at(ErrorKind::InputRead))?;

        let mask = self
            .segmenter
            .submit(file_name, &resized)
            .await
            .map_err(|error| {
                // an image the JPEG encoder rejects is an input problem, not a service one
                let kind = match error {
                    PipelineError::ImageProcessing { .. } => ErrorKind::InputRead,
                    _ => ErrorKind::TransientSubmission,
                };
                ItemFailure { kind, error }
            })?;

        let outputs = Arc::clone(&self.outputs);
        let name = file_name.to_string();
        tokio::task::spawn_blocking(move || write_outputs(&outputs, &name, &resized, &mask))
            .await
            .map_err(PipelineError::from)
            .and_then(|written| written)
            .map_err(ItemFailure::at(ErrorKind::OutputWrite))
    }
}

#[async_trait]
impl<S: SegmentationService + 'static> JobHandler for ItemProcessor<S> {
    async fn handle(&self, job: Job) -> ProcessingOutcome {
        let start = Instant::now();
        match self.process_job(&job).await {
            Ok(()) => {
                info!("Image {} processed successfully.", job.file_name);
                ProcessingOutcome::success(&job, start.elapsed())
            }
            Err(failure) => {
                error!("Error processing image {}: {}", job.file_name, failure);
                ProcessingOutcome::failure(&job, failure.kind, start.elapsed())
            }
        }
    }
}

/// Decodes an input file as 3-channel RGB; any alpha channel is dropped.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let image = image::open(path)
        .map_err(|e| PipelineError::image(path.display().to_string(), "image loading", e))?;
    Ok(DynamicImage::ImageRgb8(image.into_rgb8()))
}

/// Writes both artifacts under their shared file name, or neither.
pub fn write_outputs(
    outputs: &OutputPaths,
    file_name: &str,
    resized: &DynamicImage,
    mask: &GrayImage,
) -> Result<()> {
    let resized_path = outputs.resized_path(file_name);
    let mask_path = outputs.mask_path(file_name);
    let format = ImageFormat::from_path(&resized_path)
        .map_err(|e| PipelineError::image(file_name, "output format detection", e))?;

    let resized_partial = partial_path(&resized_path);
    let mask_partial = partial_path(&mask_path);

    let result = (|| -> Result<()> {
        resized
            .save_with_format(&resized_partial, format)
            .map_err(|e| {
                PipelineError::image(resized_path.display().to_string(), "resized image save", e)
            })?;
        mask.save_with_format(&mask_partial, format)
            .map_err(|e| PipelineError::image(mask_path.display().to_string(), "mask save", e))?;

        fs::rename(&resized_partial, &resized_path)
            .map_err(|e| PipelineError::file_system(&resized_path, "resized image rename", e))?;
        if let Err(e) = fs::rename(&mask_partial, &mask_path) {
            let _ = fs::remove_file(&resized_path);
            return Err(PipelineError::file_system(&mask_path, "mask rename", e));
        }
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&resized_partial);
        let _ = fs::remove_file(&mask_partial);
    }
    result
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}
