//! Process-wide detector handle.
//!
//! Weights are expensive to load, so the detector is built once on first
//! use and shared read-only. The slot is owned by the API context and the
//! resolved handle is passed explicitly into the pipeline.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::{info, warn};

use super::types::Detector;
use crate::config::ModelConfig;

/// Why no detector is available. Degraded mode, not a request failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    #[error("built without the onnx-detector feature")]
    FeatureDisabled,

    #[error("weights file not found at {0}")]
    WeightsMissing(PathBuf),

    #[error("weights failed to load: {0}")]
    LoadFailed(String),
}

type Loader = Box<dyn Fn() -> Result<Arc<dyn Detector>, Unavailable> + Send + Sync>;

/// Lazily-initialized, shared detector.
pub struct ModelSlot {
    model_path: PathBuf,
    loader: Loader,
    cell: OnceLock<Option<Arc<dyn Detector>>>,
}

impl ModelSlot {
    /// Slot that loads the ONNX detector described by `config` on first use.
    pub fn from_config(config: &ModelConfig) -> Self {
        let owned = config.clone();
        Self::with_loader(config.model_path.clone(), move || load_detector(&owned))
    }

    /// Slot with a custom loader; the loader runs at most once.
    pub fn with_loader(
        model_path: PathBuf,
        loader: impl Fn() -> Result<Arc<dyn Detector>, Unavailable> + Send + Sync + 'static,
    ) -> Self {
        Self {
            model_path,
            loader: Box::new(loader),
            cell: OnceLock::new(),
        }
    }

    /// Slot already holding a detector.
    pub fn with_detector(detector: Arc<dyn Detector>) -> Self {
        let slot = Self::with_loader(PathBuf::new(), || Err(Unavailable::FeatureDisabled));
        let _ = slot.cell.set(Some(detector));
        slot
    }

    /// Slot that never yields a detector, as when weights are absent.
    pub fn unavailable(model_path: PathBuf) -> Self {
        let missing = model_path.clone();
        Self::with_loader(model_path, move || Err(Unavailable::WeightsMissing(missing.clone())))
    }

    /// Resolve the detector, loading it on the first call. Concurrent first
    /// callers block until the single load finishes.
    pub fn get(&self) -> Option<Arc<dyn Detector>> {
        self.cell
            .get_or_init(|| match (self.loader)() {
                Ok(detector) => {
                    info!(detector = detector.name(), "Detector ready");
                    Some(detector)
                }
                Err(reason) => {
                    warn!(
                        path = %self.model_path.display(),
                        %reason,
                        "Detector unavailable, returning preprocessed images without detections"
                    );
                    None
                }
            })
            .clone()
    }

    /// Whether a load has been attempted.
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

#[cfg(feature = "onnx-detector")]
fn load_detector(config: &ModelConfig) -> Result<Arc<dyn Detector>, Unavailable> {
    use super::detector::OnnxDetector;

    if !config.model_path.exists() {
        return Err(Unavailable::WeightsMissing(config.model_path.clone()));
    }
    let detector = OnnxDetector::load(&config.model_path, config.class_names.clone(), config.params)
        .map_err(|e| Unavailable::LoadFailed(e.to_string()))?;
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "onnx-detector"))]
fn load_detector(config: &ModelConfig) -> Result<Arc<dyn Detector>, Unavailable> {
    if !config.model_path.exists() {
        return Err(Unavailable::WeightsMissing(config.model_path.clone()));
    }
    Err(Unavailable::FeatureDisabled)
}
