//! Door detection pipeline: load -> preprocess -> size -> detect -> filter -> serialize.
//!
//! Every stage is a plain function or a trait seam. The detector and the
//! PDF renderer are external collaborators reached through traits so the
//! whole pipeline runs against mocks in tests.

pub mod types;
pub mod loader;
pub mod pdfium;
pub mod preprocess;
pub mod sizing;
pub mod detector;
pub mod annotate;
pub mod filter;
pub mod model;
pub mod orchestrator;

pub use types::*;
pub use orchestrator::*;

use thiserror::Error;

/// Stage-level failures inside the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("PDF is password protected")]
    PdfEncrypted,

    #[error("Document has no pages")]
    EmptyDocument,

    #[error("Image decoding failed: {0}")]
    ImageDecode(String),

    #[error("PDF renderer unavailable: {0}")]
    RendererUnavailable(String),

    #[error("Detector initialization failed: {0}")]
    ModelInit(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Output encoding failed: {0}")]
    Encoding(String),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl PipelineError {
    /// True when the failure is caused by the uploaded bytes rather than
    /// by the service.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PipelineError::PdfRendering { .. }
                | PipelineError::PdfEncrypted
                | PipelineError::EmptyDocument
                | PipelineError::ImageDecode(_)
        )
    }
}

/// Failure of one file at the pipeline boundary, carrying the filename.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Failed to process {filename}: {source}")]
    InputDecode {
        filename: String,
        #[source]
        source: PipelineError,
    },

    #[error("Unexpected error while processing {filename}: {source}")]
    Unexpected {
        filename: String,
        #[source]
        source: PipelineError,
    },
}

impl ProcessingError {
    /// Wrap a stage error with the filename, classifying it as client or server fault.
    pub fn wrap(filename: &str, source: PipelineError) -> Self {
        let filename = filename.to_string();
        if source.is_input_error() {
            ProcessingError::InputDecode { filename, source }
        } else {
            ProcessingError::Unexpected { filename, source }
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            ProcessingError::InputDecode { filename, .. }
            | ProcessingError::Unexpected { filename, .. } => filename,
        }
    }
}
