use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::detector::YoloParams;
use crate::pipeline::preprocess::{PreprocessConfig, MAX_EROSION_PASSES};
use crate::pipeline::sizing::InferenceSizing;
use crate::pipeline::{PipelineConfig, DEFAULT_PDF_DPI};

/// Application-level constants
pub const APP_NAME: &str = "doorplan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name reported by the health check.
pub const SERVICE_NAME: &str = "door-detection";

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MODEL_FILE: &str = "best.onnx";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 50;
/// Files of one request decoded and run at the same time.
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 2;
pub const MAX_CONCURRENT_FILES_LIMIT: usize = 64;
pub const PDF_DPI_RANGE: std::ops::RangeInclusive<u32> = 72..=600;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "doorplan=info,doorplan_lib=info,tower_http=info"
}

/// Weights shipped next to the executable, as the service is deployed.
pub fn default_model_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_MODEL_FILE)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_FILE))
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: '{value}' is not a valid {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{var}: {value} is outside {min}..={max}")]
    OutOfRange {
        var: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// Detector weights and decoding parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    /// Used when the weights carry no class-name metadata.
    pub class_names: Vec<String>,
    pub params: YoloParams,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            class_names: Vec::new(),
            params: YoloParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
    /// Files of one request processed at the same time.
    pub max_concurrent_files: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            max_concurrent_files: DEFAULT_MAX_CONCURRENT_FILES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Read `DOORPLAN_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables
    /// take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = match get("DOORPLAN_BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "DOORPLAN_BIND_ADDR",
                value: raw,
                expected: "socket address",
            })?,
            None => ServerConfig::default().bind_addr,
        };
        let max_upload_mb: usize = parse_or(
            "DOORPLAN_MAX_UPLOAD_MB",
            get("DOORPLAN_MAX_UPLOAD_MB"),
            DEFAULT_MAX_UPLOAD_MB,
        )?;
        let max_concurrent_files: u32 = parse_or(
            "DOORPLAN_MAX_CONCURRENT_FILES",
            get("DOORPLAN_MAX_CONCURRENT_FILES"),
            DEFAULT_MAX_CONCURRENT_FILES as u32,
        )?;
        check_range(
            "DOORPLAN_MAX_CONCURRENT_FILES",
            max_concurrent_files,
            1,
            MAX_CONCURRENT_FILES_LIMIT as u32,
        )?;

        let model_path = get("DOORPLAN_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_model_path);
        let class_names = get("DOORPLAN_CLASS_NAMES")
            .map(|raw| parse_class_list(&raw))
            .unwrap_or_default();

        let defaults = PreprocessConfig::default();
        let binary_threshold: u8 = parse_or(
            "DOORPLAN_BINARY_THRESHOLD",
            get("DOORPLAN_BINARY_THRESHOLD"),
            defaults.binary_threshold,
        )?;
        let erosion_passes: u8 = parse_or(
            "DOORPLAN_EROSION_PASSES",
            get("DOORPLAN_EROSION_PASSES"),
            defaults.erosion_passes,
        )?;
        check_range(
            "DOORPLAN_EROSION_PASSES",
            erosion_passes as u32,
            0,
            MAX_EROSION_PASSES as u32,
        )?;

        let pdf_dpi: u32 = parse_or("DOORPLAN_PDF_DPI", get("DOORPLAN_PDF_DPI"), DEFAULT_PDF_DPI)?;
        check_range("DOORPLAN_PDF_DPI", pdf_dpi, *PDF_DPI_RANGE.start(), *PDF_DPI_RANGE.end())?;

        Ok(Self {
            server: ServerConfig {
                bind_addr,
                max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
                max_concurrent_files: max_concurrent_files as usize,
            },
            model: ModelConfig {
                model_path,
                class_names,
                params: YoloParams::default(),
            },
            pipeline: PipelineConfig::new(
                PreprocessConfig {
                    binary_threshold,
                    erosion_passes,
                },
                InferenceSizing::default(),
                pdf_dpi,
            ),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            var,
            value,
            expected: std::any::type_name::<T>(),
        }),
        None => Ok(default),
    }
}

fn check_range(var: &'static str, value: u32, min: u32, max: u32) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { var, value, min, max })
    }
}

/// Comma-separated class names, index order, blanks dropped.
fn parse_class_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}
