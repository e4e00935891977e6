use crate::backoff::RetryPolicy;
use crate::errors::{PipelineError, Result};
use crate::traits::SegmentationService;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, GrayImage, ImageEncoder};
use reqwest::header::{HeaderMap, HeaderValue, EXPIRES};
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_SERVICE_URL: &str = "http://10.20.0.152:5660/u2net";
pub const DEFAULT_JPEG_QUALITY: u8 = 95;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct MatteResponse {
    matte: String,
}

/// `SegmentationService` speaking multipart-in, JSON-out over HTTP.
///
/// The inner `reqwest::Client` pools connections, so one instance is shared by all workers.
#[derive(Debug, Clone)]
pub struct HttpSegmentationService {
    client: reqwest::Client,
    url: Url,
}

impl HttpSegmentationService {
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
            .build()
            .map_err(|e| PipelineError::Http {
                operation: "client construction".to_string(),
                source: e,
            })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn form(file_name: &str, jpeg: &[u8]) -> Result<Form> {
        let mut headers = HeaderMap::new();
        headers.insert(EXPIRES, HeaderValue::from_static("0"));

        let part = Part::bytes(jpeg.to_vec())
            .file_name(file_name.to_string())
            .mime_str("image/jpeg")
            .map_err(|e| PipelineError::Http {
                operation: "multipart construction".to_string(),
                source: e,
            })?
            .headers(headers);
        Ok(Form::new().part("file", part))
    }
}

#[async_trait]
impl SegmentationService for HttpSegmentationService {
    async fn request_mask(&self, file_name: &str, jpeg: &[u8]) -> Result<GrayImage> {
        let response = self
            .client
            .post(self.url.clone())
            .multipart(Self::form(file_name, jpeg)?)
            .send()
            .await
            .map_err(|e| PipelineError::Http {
                operation: "POST".to_string(),
                source: e,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(PipelineError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| PipelineError::Http {
            operation: "read response body".to_string(),
            source: e,
        })?;
        decode_matte(&body)
    }
}

/// Parses `{"matte": "<base64>"}` and decodes the embedded image as grayscale.
pub fn decode_matte(body: &[u8]) -> Result<GrayImage> {
    let response: MatteResponse =
        serde_json::from_slice(body).map_err(|e| PipelineError::MalformedResponse {
            reason: format!("invalid JSON body: {e}"),
        })?;

    let encoded = general_purpose::STANDARD
        .decode(response.matte.trim())
        .map_err(|e| PipelineError::MalformedResponse {
            reason: format!("matte is not valid base64: {e}"),
        })?;

    let mask = image::load_from_memory(&encoded).map_err(|e| PipelineError::MalformedResponse {
        reason: format!("matte is not a decodable image: {e}"),
    })?;
    Ok(mask.into_luma8())
}

pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| PipelineError::image("<memory>", "JPEG encoding", e))?;
    Ok(buf)
}

/// Remote segmentation with the retry policy wrapped around a single-shot service.
#[derive(Debug)]
pub struct RemoteSegmenter<S: SegmentationService> {
    service: S,
    policy: RetryPolicy,
    jpeg_quality: u8,
}

impl<S: SegmentationService> RemoteSegmenter<S> {
    pub fn new(service: S, policy: RetryPolicy) -> Self {
        Self {
            service,
            policy,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Submits an already resized image, retrying every failure identically.
    ///
    /// The returned mask always has the dimensions of `image`; a mask of any other size
    /// counts as a failed attempt.
    pub async fn submit(&self, file_name: &str, image: &DynamicImage) -> Result<GrayImage> {
        let jpeg = encode_jpeg(image, self.jpeg_quality)?;
        let expected = (image.width(), image.height());
        let max_attempts = self.policy.max_attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let result = self
                .service
                .request_mask(file_name, &jpeg)
                .await
                .and_then(|mask| check_dimensions(mask, expected));

            match result {
                Ok(mask) => {
                    debug!(file_name, attempt, "segmentation attempt succeeded");
                    return Ok(mask);
                }
                Err(e) => {
                    warn!(
                        "Error processing image {} (attempt {}/{}): {}",
                        file_name, attempt, max_attempts, e
                    );
                    last_error = Some(e);
                    tokio::time::sleep(self.policy.delay_after(attempt)).await;
                }
            }
        }

        Err(PipelineError::SubmissionExhausted {
            file_name: file_name.to_string(),
            attempts: max_attempts,
            last_error: Box::new(last_error.unwrap_or(PipelineError::MalformedResponse {
                reason: "no attempt was made".to_string(),
            })),
        })
    }
}

fn check_dimensions(mask: GrayImage, expected: (u32, u32)) -> Result<GrayImage> {
    let actual = mask.dimensions();
    if actual != expected {
        return Err(PipelineError::MaskDimensionMismatch { expected, actual });
    }
    Ok(mask)
}
