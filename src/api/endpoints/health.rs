//! Liveness and model status endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

#[derive(Serialize)]
pub struct HelloResponse {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct ModelStatusResponse {
    pub available: bool,
    /// Weights file name; the directory stays server-side.
    pub model_file: String,
}

/// `GET /` — liveness check.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: crate::config::SERVICE_NAME,
    })
}

/// `GET /api/hello`
pub async fn hello() -> Json<HelloResponse> {
    Json(HelloResponse {
        message: "Door Plan Detection API",
    })
}

/// `GET /api/model` — resolves the detector (loading it if needed) and
/// reports whether it is usable.
pub async fn model(State(ctx): State<ApiContext>) -> Result<Json<ModelStatusResponse>, ApiError> {
    let slot = ctx.model.clone();
    let available = tokio::task::spawn_blocking(move || slot.get().is_some()).await?;

    Ok(Json(ModelStatusResponse {
        available,
        model_file: ctx
            .model
            .model_path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }))
}
