//! Runs the full pipeline for one uploaded file.

use tracing::{debug, error, info, warn};

use super::filter::{filter_doors, to_detection_boxes};
use super::loader::load_image;
use super::preprocess::{preprocess, PreprocessConfig};
use super::sizing::InferenceSizing;
use super::types::{
    DetectionResult, DetectionStatus, Detector, PdfPageRenderer, UploadedFile,
};
use super::{PipelineError, ProcessingError};

/// Everything the pipeline needs besides the file and its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub sizing: InferenceSizing,
    /// Rasterization resolution for PDF pages.
    pub pdf_dpi: u32,
}

/// 150 DPI keeps typical A-series plans under the render size cap.
pub const DEFAULT_PDF_DPI: u32 = 150;

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(PreprocessConfig::default(), InferenceSizing::default(), DEFAULT_PDF_DPI)
    }
}

impl PipelineConfig {
    pub fn new(preprocess: PreprocessConfig, sizing: InferenceSizing, pdf_dpi: u32) -> Self {
        Self {
            preprocess,
            sizing,
            pdf_dpi,
        }
    }
}

/// Detect doors in one file.
///
/// `detector` is `None` when no model is available; the preprocessed image
/// is then returned as both outputs with no boxes.
pub fn detect_file(
    file: &UploadedFile,
    renderer: &dyn PdfPageRenderer,
    detector: Option<&dyn Detector>,
    config: &PipelineConfig,
) -> Result<DetectionResult, ProcessingError> {
    run(file, renderer, detector, config).map_err(|source| {
        let err = ProcessingError::wrap(&file.filename, source);
        match &err {
            ProcessingError::InputDecode { .. } => {
                warn!(filename = %file.filename, error = %err, "Rejected input")
            }
            ProcessingError::Unexpected { .. } => {
                error!(filename = %file.filename, error = %err, "Processing failed")
            }
        }
        err
    })
}

fn run(
    file: &UploadedFile,
    renderer: &dyn PdfPageRenderer,
    detector: Option<&dyn Detector>,
    config: &PipelineConfig,
) -> Result<DetectionResult, PipelineError> {
    let filename = file.filename.as_str();
    let raw = load_image(&file.content, filename, renderer, config.pdf_dpi)?;
    let processed = preprocess(&raw, &config.preprocess);
    drop(raw);

    let (width, height) = processed.dimensions();
    let inference_size = config.sizing.select(width, height);

    let Some(detector) = detector else {
        info!(filename, width, height, "No detector, returning preprocessed image");
        return Ok(DetectionResult {
            filename: filename.to_string(),
            annotated: processed.clone(),
            processed,
            boxes: Vec::new(),
            status: DetectionStatus::DetectorUnavailable,
        });
    };

    debug!(
        filename,
        width,
        height,
        inference_size,
        detector = detector.name(),
        "Running inference"
    );
    let output = detector.detect(&processed, inference_size)?;

    let (boxes, annotated, status) = match filter_doors(&output.class_names, &output.detections) {
        Some(doors) => {
            // With no door hits the plot still shows what the model saw
            let drawn = if doors.is_empty() { &output.detections } else { &doors };
            let annotated = detector.annotate(&processed, drawn);
            (to_detection_boxes(&doors), annotated, DetectionStatus::Detected)
        }
        None => {
            let annotated = detector.annotate(&processed, &output.detections);
            (Vec::new(), annotated, DetectionStatus::ClassNotFound)
        }
    };

    info!(
        filename,
        raw_detections = output.detections.len(),
        doors = boxes.len(),
        inference_size,
        ?status,
        "Detection complete"
    );

    Ok(DetectionResult {
        filename: filename.to_string(),
        annotated,
        processed,
        boxes,
        status,
    })
}
