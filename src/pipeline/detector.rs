//! Detector adapters.
//!
//! The real detector is a YOLOv8 ONNX export run through ONNX Runtime,
//! compiled only with the `onnx-detector` feature. Pre- and post-processing
//! (letterbox, output decoding, NMS, class-name metadata) are plain
//! functions so they are tested without the runtime.

use std::sync::{LazyLock, Mutex};

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use regex::Regex;

use super::types::{BoundingBox, ClassNames, Detector, DetectorOutput, RawDetection};
use super::PipelineError;

/// Letterbox padding value used by Ultralytics.
const LETTERBOX_FILL: u8 = 114;

/// Post-processing thresholds, matching the Ultralytics predict defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloParams {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Pre-processing
// ═══════════════════════════════════════════════════════════

/// Mapping from letterboxed model coordinates back to source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl LetterboxTransform {
    /// Map a model-space box to clamped source-space coordinates.
    pub fn to_source(&self, bbox: BoundingBox) -> BoundingBox {
        let max_x = self.source_width as f32;
        let max_y = self.source_height as f32;
        let unmap_x = |v: f32| ((v - self.pad_x as f32) / self.scale).clamp(0.0, max_x);
        let unmap_y = |v: f32| ((v - self.pad_y as f32) / self.scale).clamp(0.0, max_y);
        BoundingBox::new(unmap_x(bbox.x1), unmap_y(bbox.y1), unmap_x(bbox.x2), unmap_y(bbox.y2))
    }
}

/// Resize preserving aspect ratio and centre on a `size` x `size` grey canvas.
pub fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, LetterboxTransform) {
    let (w, h) = image.dimensions();
    let scale = (size as f32 / w.max(1) as f32).min(size as f32 / h.max(1) as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    (
        canvas,
        LetterboxTransform {
            scale,
            pad_x,
            pad_y,
            source_width: w,
            source_height: h,
        },
    )
}

/// Flatten an RGB image into planar CHW floats in [0, 1].
pub fn to_chw(image: &RgbImage) -> Vec<f32> {
    let plane = (image.width() * image.height()) as usize;
    let mut data = vec![0.0f32; plane * 3];
    for (i, p) in image.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = p.0[c] as f32 / 255.0;
        }
    }
    data
}

// ═══════════════════════════════════════════════════════════
// Post-processing
// ═══════════════════════════════════════════════════════════

/// Decode a YOLOv8 output tensor of shape `[1, 4 + classes, anchors]`.
///
/// Rows 0..4 hold centre-x, centre-y, width, height in letterboxed pixels;
/// the remaining rows hold per-class scores. Returns detections in source
/// coordinates, after confidence filtering and per-class NMS, ordered by
/// descending confidence.
pub fn decode_predictions(
    shape: &[usize],
    data: &[f32],
    transform: &LetterboxTransform,
    params: &YoloParams,
) -> Result<Vec<RawDetection>, PipelineError> {
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        return Err(PipelineError::Inference(format!(
            "Unexpected output shape {shape:?}, expected [1, 4 + classes, anchors]"
        )));
    }
    let rows = shape[1];
    let anchors = shape[2];
    if data.len() < rows * anchors {
        return Err(PipelineError::Inference(format!(
            "Output has {} values, shape {shape:?} needs {}",
            data.len(),
            rows * anchors
        )));
    }

    let at = |row: usize, anchor: usize| data[row * anchors + anchor];
    let mut candidates = Vec::new();

    for anchor in 0..anchors {
        let (class_id, score) = (4..rows)
            .map(|row| (row - 4, at(row, anchor)))
            .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < params.conf_threshold {
            continue;
        }

        let (cx, cy) = (at(0, anchor), at(1, anchor));
        let (w, h) = (at(2, anchor), at(3, anchor));
        let model_box = BoundingBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0);

        candidates.push(RawDetection {
            class_id,
            bbox: transform.to_source(model_box),
            confidence: score,
        });
    }

    let mut kept = non_max_suppression(candidates, params.iou_threshold);
    kept.truncate(params.max_detections);
    Ok(kept)
}

/// Greedy per-class non-maximum suppression. Output is sorted by descending confidence.
pub fn non_max_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

static NAMES_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#).expect("valid regex")
});

/// Parse the Ultralytics `names` metadata, e.g. `{0: 'door', 1: 'window'}`.
pub fn parse_class_names(raw: &str) -> ClassNames {
    NAMES_ENTRY
        .captures_iter(raw)
        .filter_map(|cap| {
            let id = cap[1].parse::<usize>().ok()?;
            Some((id, cap[2].to_string()))
        })
        .collect()
}

/// Fill in names for every class index the model scores, preferring
/// metadata, then configured names, then `class<N>`.
pub fn resolve_class_names(
    metadata: &ClassNames,
    configured: &[String],
    class_count: usize,
) -> ClassNames {
    (0..class_count)
        .map(|id| {
            let name = metadata
                .get(&id)
                .cloned()
                .or_else(|| configured.get(id).cloned())
                .unwrap_or_else(|| format!("class{id}"));
            (id, name)
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════
// ONNX detector (feature `onnx-detector`)
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-detector")]
mod onnx {
    use std::path::Path;
    use std::sync::Mutex;

    use image::RgbImage;
    use ort::session::Session;
    use ort::value::TensorRef;

    use super::{
        decode_predictions, letterbox, parse_class_names, resolve_class_names, to_chw,
        ClassNames, Detector, DetectorOutput, PipelineError, YoloParams,
    };

    /// YOLOv8 detector backed by ONNX Runtime.
    ///
    /// `Session::run` requires `&mut self`, so the session sits behind a
    /// `Mutex` and concurrent requests take turns.
    pub struct OnnxDetector {
        session: Mutex<Session>,
        metadata_names: ClassNames,
        configured_names: Vec<String>,
        params: YoloParams,
    }

    impl OnnxDetector {
        /// Load a YOLOv8 ONNX export. The model must accept dynamic input sizes
        /// when inference sizes other than its export size are used.
        pub fn load(
            model_path: &Path,
            configured_names: Vec<String>,
            params: YoloParams,
        ) -> Result<Self, PipelineError> {
            if !model_path.exists() {
                return Err(PipelineError::ModelInit(format!(
                    "weights not found at {}",
                    model_path.display()
                )));
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| PipelineError::ModelInit(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| PipelineError::ModelInit(e.to_string()))?
                .commit_from_file(model_path)
                .map_err(|e: ort::Error| {
                    PipelineError::ModelInit(format!("ONNX load failed: {e}"))
                })?;

            let metadata_names = match session.metadata() {
                Ok(meta) => match meta.custom("names") {
                    Ok(Some(raw)) => parse_class_names(&raw),
                    _ => ClassNames::new(),
                },
                Err(_) => ClassNames::new(),
            };

            tracing::info!(
                path = %model_path.display(),
                classes = metadata_names.len(),
                "ONNX detector loaded"
            );

            Ok(Self {
                session: Mutex::new(session),
                metadata_names,
                configured_names,
                params,
            })
        }
    }

    impl Detector for OnnxDetector {
        fn name(&self) -> &str {
            "yolov8-onnx"
        }

        fn detect(
            &self,
            image: &RgbImage,
            inference_size: u32,
        ) -> Result<DetectorOutput, PipelineError> {
            let (canvas, transform) = letterbox(image, inference_size);
            let side = inference_size as usize;
            let input = ndarray::Array4::from_shape_vec((1, 3, side, side), to_chw(&canvas))
                .map_err(|e| PipelineError::Inference(e.to_string()))?;
            let tensor = TensorRef::from_array_view(&input)
                .map_err(|e| PipelineError::Inference(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| PipelineError::Inference("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| PipelineError::Inference(format!("ONNX inference failed: {e}")))?;

            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Inference(format!("Output extraction: {e}")))?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

            let detections = decode_predictions(&dims, data, &transform, &self.params)?;
            let class_count = dims.get(1).map_or(0, |rows| rows.saturating_sub(4));
            let class_names =
                resolve_class_names(&self.metadata_names, &self.configured_names, class_count);

            Ok(DetectorOutput {
                class_names,
                detections,
            })
        }
    }
}

#[cfg(feature = "onnx-detector")]
pub use onnx::OnnxDetector;

// ═══════════════════════════════════════════════════════════
// Mock detector
// ═══════════════════════════════════════════════════════════

/// Deterministic detector for tests: returns the same detections for any
/// image and records the inference sizes it was asked for.
pub struct MockDetector {
    class_names: ClassNames,
    detections: Vec<RawDetection>,
    fail_with: Option<String>,
    calls: Mutex<Vec<u32>>,
}

impl MockDetector {
    pub fn new(class_names: ClassNames, detections: Vec<RawDetection>) -> Self {
        Self {
            class_names,
            detections,
            fail_with: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Detector whose every inference fails with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::new(ClassNames::new(), Vec::new())
        }
    }

    /// Inference sizes requested so far, in call order.
    pub fn inference_sizes(&self) -> Vec<u32> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Detector for MockDetector {
    fn name(&self) -> &str {
        "mock"
    }

    fn detect(
        &self,
        _image: &RgbImage,
        inference_size: u32,
    ) -> Result<DetectorOutput, PipelineError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(inference_size);
        }
        if let Some(message) = &self.fail_with {
            return Err(PipelineError::Inference(message.clone()));
        }
        Ok(DetectorOutput {
            class_names: self.class_names.clone(),
            detections: self.detections.clone(),
        })
    }
}
