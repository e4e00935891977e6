use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the matte pipeline.
///
/// Each variant captures context specific to its error domain (filesystem, image codec,
/// the remote segmentation exchange, the worker pool), so callers can classify a failure
/// by matching on the variant instead of parsing error strings.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP error: {operation} failed")]
    Http {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Segmentation service answered with status {status}")]
    UnexpectedStatus { status: u16 },

    #[error("Malformed segmentation response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Mask is {actual:?} but the submitted image is {expected:?}")]
    MaskDimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Segmentation of {file_name} failed after {attempts} attempts")]
    SubmissionExhausted {
        file_name: String,
        attempts: u32,
        #[source]
        last_error: Box<PipelineError>,
    },

    #[error("Worker pool error: {operation} failed (pool: {pool_id})")]
    WorkerPool {
        pool_id: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Stage at which a single item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure, non-200 status or malformed body. Retried.
    TransientSubmission,
    /// Input file unreadable or undecodable.
    InputRead,
    /// Resized image or mask could not be persisted.
    OutputWrite,
}

impl PipelineError {
    pub(crate) fn image(
        path: impl Into<String>,
        operation: impl Into<String>,
        source: image::ImageError,
    ) -> Self {
        Self::ImageProcessing {
            path: path.into(),
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should build [`PipelineError::FileSystem`]
/// directly; this is the fallback for `?` on bare I/O calls.
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to image processing errors.
impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        Self::image("unknown", "image processing", err)
    }
}

/// A worker task that panicked or was aborted surfaces as a pool error.
impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::WorkerPool {
            pool_id: "blocking".to_string(),
            operation: "join task".to_string(),
            source: Box::new(err),
        }
    }
}
