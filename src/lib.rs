pub mod api;
pub mod config;
pub mod pipeline;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::api::ApiContext;
use crate::config::{AppConfig, ConfigError};
use crate::pipeline::model::ModelSlot;
use crate::pipeline::pdfium::{PdfiumRenderer, UnavailablePdfRenderer};
use crate::pipeline::PdfPageRenderer;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Server(String),

    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Run the detection service until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env()?;
    tracing::info!(
        bind_addr = %config.server.bind_addr,
        model_path = %config.model.model_path.display(),
        binary_threshold = config.pipeline.preprocess.binary_threshold,
        erosion_passes = config.pipeline.preprocess.erosion_passes,
        pdf_dpi = config.pipeline.pdf_dpi,
        max_concurrent_files = config.server.max_concurrent_files,
        "Configuration loaded"
    );

    let ctx = build_context(&config);
    let mut server =
        api::start_server_on(ctx, config.server.bind_addr, config.server.max_upload_bytes)
            .await
            .map_err(StartupError::Server)?;
    tracing::info!(addr = %server.session.server_addr, "Accepting uploads on POST /detect");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, shutting down");
    server.shutdown();
    server.stopped().await;
    Ok(())
}

/// Wire the renderer and the lazily-loaded detector. PDFium being absent
/// only disables PDF input.
pub fn build_context(config: &AppConfig) -> ApiContext {
    let renderer: Arc<dyn PdfPageRenderer> = match PdfiumRenderer::new() {
        Ok(renderer) => Arc::new(renderer),
        Err(e) => {
            tracing::warn!(error = %e, "PDFium unavailable, PDF uploads will fail");
            Arc::new(UnavailablePdfRenderer::new(e.to_string()))
        }
    };
    let model = Arc::new(ModelSlot::from_config(&config.model));
    ApiContext::new(config.pipeline.clone(), renderer, model)
        .with_max_concurrent_files(config.server.max_concurrent_files)
}
