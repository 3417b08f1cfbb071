//! Shared state and response types for the HTTP layer.

use std::sync::Arc;

use base64::Engine;
use image::RgbImage;
use serde::Serialize;

use crate::config::DEFAULT_MAX_CONCURRENT_FILES;
use crate::pipeline::model::ModelSlot;
use crate::pipeline::preprocess::encode_png;
use crate::pipeline::{
    DetectionBox, DetectionResult, DetectionStatus, PdfPageRenderer, PipelineConfig, PipelineError,
    ProcessingError,
};

// ═══════════════════════════════════════════════════════════
// API context
// ═══════════════════════════════════════════════════════════

/// Shared context for all routes. Cheap to clone.
#[derive(Clone)]
pub struct ApiContext {
    pub pipeline: Arc<PipelineConfig>,
    pub renderer: Arc<dyn PdfPageRenderer>,
    pub model: Arc<ModelSlot>,
    /// Files of one request processed at the same time.
    pub max_concurrent_files: usize,
}

impl ApiContext {
    pub fn new(
        pipeline: PipelineConfig,
        renderer: Arc<dyn PdfPageRenderer>,
        model: Arc<ModelSlot>,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            renderer,
            model,
            max_concurrent_files: DEFAULT_MAX_CONCURRENT_FILES,
        }
    }

    /// Override the per-request file concurrency (at least 1).
    pub fn with_max_concurrent_files(mut self, limit: usize) -> Self {
        self.max_concurrent_files = limit.max(1);
        self
    }
}

// ═══════════════════════════════════════════════════════════
// Detection response
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub images: Vec<FileReport>,
}

/// Outcome for one uploaded file.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FileReport {
    Detected(DetectedImage),
    Failed(FailedImage),
}

#[derive(Debug, Serialize)]
pub struct DetectedImage {
    pub filename: String,
    /// Annotated image as a PNG data URL.
    pub image: String,
    /// Preprocessed image before annotation, as a PNG data URL.
    pub original_image: String,
    pub boxes: Vec<DetectionBox>,
    pub status: DetectionStatus,
}

#[derive(Debug, Serialize)]
pub struct FailedImage {
    pub filename: String,
    pub error: FileErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct FileErrorDetail {
    pub code: &'static str,
    pub status: u16,
    pub message: String,
}

impl FileReport {
    /// Build the report for a pipeline outcome, encoding both images.
    pub fn from_outcome(filename: &str, outcome: Result<DetectionResult, ProcessingError>) -> Self {
        match outcome.and_then(|result| {
            DetectedImage::encode(result).map_err(|e| {
                tracing::error!(filename, error = %e, "Encoding response images failed");
                ProcessingError::wrap(filename, e)
            })
        }) {
            Ok(detected) => FileReport::Detected(detected),
            Err(err) => FileReport::failed(&err),
        }
    }

    /// Error entry for a failed file. Internal details stay in the logs.
    pub fn failed(err: &ProcessingError) -> Self {
        let error = match err {
            ProcessingError::InputDecode { .. } => FileErrorDetail {
                code: "INPUT_DECODE",
                status: 422,
                message: err.to_string(),
            },
            ProcessingError::Unexpected { .. } => FileErrorDetail {
                code: "INTERNAL",
                status: 500,
                message: "An internal error occurred".to_string(),
            },
        };
        FileReport::Failed(FailedImage {
            filename: err.filename().to_string(),
            error,
        })
    }
}

impl DetectedImage {
    fn encode(result: DetectionResult) -> Result<Self, PipelineError> {
        Ok(Self {
            image: png_data_url(&result.annotated)?,
            original_image: png_data_url(&result.processed)?,
            filename: result.filename,
            boxes: result.boxes,
            status: result.status,
        })
    }
}

/// Encode an image as `data:image/png;base64,...`.
pub fn png_data_url(image: &RgbImage) -> Result<String, PipelineError> {
    let png = encode_png(image)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(png);
    Ok(format!("data:image/png;base64,{encoded}"))
}
