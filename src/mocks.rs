use crate::errors::{PipelineError, Result};
use crate::traits::SegmentationService;
use async_trait::async_trait;
use image::{GrayImage, Luma};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scripted reply pattern for [`MockSegmentationService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    AlwaysSucceed,
    /// Fail the first `n` requests overall, then succeed.
    FailFirst(usize),
    AlwaysFail,
    /// Fail every request for these file names, succeed for the rest.
    FailFiles(Vec<String>),
    /// Answer with a mask one pixel wider than the upload.
    WrongSize,
}

/// In-process stand-in for the remote service.
///
/// Successful replies are masks with the dimensions of the uploaded JPEG, as a real
/// service returns.
#[derive(Debug)]
pub struct MockSegmentationService {
    behavior: MockBehavior,
    requests: AtomicUsize,
    seen_files: Mutex<Vec<String>>,
}

impl MockSegmentationService {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            requests: AtomicUsize::new(0),
            seen_files: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// File names in request order, one entry per request.
    pub fn seen_files(&self) -> Vec<String> {
        self.seen_files.lock().clone()
    }

    fn should_fail(&self, previous: usize, file_name: &str) -> bool {
        match &self.behavior {
            MockBehavior::AlwaysSucceed | MockBehavior::WrongSize => false,
            MockBehavior::FailFirst(n) => previous < *n,
            MockBehavior::AlwaysFail => true,
            MockBehavior::FailFiles(names) => names.iter().any(|n| n == file_name),
        }
    }
}

#[async_trait]
impl SegmentationService for MockSegmentationService {
    async fn request_mask(&self, file_name: &str, jpeg: &[u8]) -> Result<GrayImage> {
        let previous = self.requests.fetch_add(1, Ordering::SeqCst);
        self.seen_files.lock().push(file_name.to_string());

        if self.should_fail(previous, file_name) {
            return Err(PipelineError::UnexpectedStatus { status: 500 });
        }

        let upload = image::load_from_memory(jpeg).map_err(|e| PipelineError::MalformedResponse {
            reason: format!("mock could not decode upload: {e}"),
        })?;
        let (mut width, height) = (upload.width(), upload.height());
        if self.behavior == MockBehavior::WrongSize {
            width += 1;
        }
        Ok(GrayImage::from_pixel(width, height, Luma([255])))
    }
}
