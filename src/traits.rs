use crate::errors::Result;
use async_trait::async_trait;
use image::GrayImage;
use std::time::Duration;

/// One exchange with a remote background-segmentation service.
///
/// Implementations perform exactly one request per call and never retry; the retry
/// loop lives in [`crate::client::RemoteSegmenter`] so every service gets the same policy.
#[async_trait]
pub trait SegmentationService: Send + Sync {
    /// Uploads a JPEG-encoded image and returns the decoded single-channel mask.
    async fn request_mask(&self, file_name: &str, jpeg: &[u8]) -> Result<GrayImage>;
}

/// Delay to wait after a failed attempt.
pub trait Backoff: Send + Sync + std::fmt::Debug {
    /// `attempt` is 1-based: the delay after the first failure is `delay(1)`.
    fn delay(&self, attempt: u32) -> Duration;
}
