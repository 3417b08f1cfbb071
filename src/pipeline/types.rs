use std::collections::BTreeMap;

use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

use super::PipelineError;

/// Name of the only class the service reports.
pub const DOOR_CLASS_NAME: &str = "Door";

/// One uploaded file, consumed once by the pipeline.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
        }
    }
}

/// Absolute pixel box in (x1, y1, x2, y2) form, as produced by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union with another box. Zero when either box is empty.
    pub fn iou(&self, other: &Self) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// A single detection as returned by the model, before any filtering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: usize,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Class id -> class name mapping published by the model.
pub type ClassNames = BTreeMap<usize, String>;

/// Everything crossing the detector boundary for one image.
#[derive(Debug, Clone, Default)]
pub struct DetectorOutput {
    pub class_names: ClassNames,
    /// Detections in the order the detector returned them.
    pub detections: Vec<RawDetection>,
}

/// A retained door detection, shaped for the HTTP response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub class_name: String,
    pub confidence: f32,
}

/// How a successful pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    /// Inference ran and the model knows a door class (boxes may still be empty).
    Detected,
    /// No detector available; the preprocessed image is returned untouched.
    DetectorUnavailable,
    /// The model has no class named "door".
    ClassNotFound,
}

/// Per-file result of the pipeline.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub filename: String,
    pub annotated: RgbImage,
    pub processed: RgbImage,
    pub boxes: Vec<DetectionBox>,
    pub status: DetectionStatus,
}

// ═══════════════════════════════════════════════════════════
// External collaborators
// ═══════════════════════════════════════════════════════════

/// Renders PDF pages to bitmaps.
pub trait PdfPageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, PipelineError>;

    /// Render a zero-based page at the given DPI.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<DynamicImage, PipelineError>;
}

/// Pretrained object detector.
///
/// Implementations must tolerate concurrent calls from several blocking
/// worker threads; serialize internally if the backend cannot.
pub trait Detector: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Run inference at a square input resolution of `inference_size` pixels.
    fn detect(
        &self,
        image: &RgbImage,
        inference_size: u32,
    ) -> Result<DetectorOutput, PipelineError>;

    /// Render the given detections on a copy of `image`.
    fn annotate(&self, image: &RgbImage, detections: &[RawDetection]) -> RgbImage {
        super::annotate::draw_detections(image, detections)
    }
}
