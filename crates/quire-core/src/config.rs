//! Configuration module
//!
//! Environment-driven configuration for the processing pipeline, watermarking,
//! preview staging and the upload backend.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_UPLOAD_FOLDER, INITIAL_QUALITY, LARGE_SOURCE_DIMENSION_PX, LARGE_SOURCE_THRESHOLD_PX,
    MAX_DIMENSION_PX, MAX_INPUT_SIZE_MB, MAX_OUTPUT_BYTES, MIN_WATERMARK_FONT_SIZE,
    WATERMARK_COLOR, WATERMARK_FONT_SIZE, WATERMARK_OPACITY,
};
use crate::models::{OutputFormat, ProcessingOptions};
use crate::storage_types::StorageBackend;

/// Watermark settings
#[derive(Clone, Debug)]
pub struct WatermarkSettings {
    pub enabled: bool,
    pub text: String,
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub color: String,
    pub opacity: f32,
}

/// Upload backend settings
#[derive(Clone, Debug)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub upload_folder: String,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct QuireConfig {
    pub max_input_bytes: u64,
    pub max_output_bytes: u64,
    pub max_dimension_px: u32,
    pub large_source_dimension_px: u32,
    pub large_source_threshold_px: u32,
    pub initial_quality: f32,
    pub output_format: OutputFormat,
    pub preview_dir: PathBuf,
    pub watermark: WatermarkSettings,
    pub storage: StorageSettings,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl QuireConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let max_input_size_mb: u64 = env_or("MAX_INPUT_SIZE_MB", MAX_INPUT_SIZE_MB);

        let output_format = match env::var("OUTPUT_FORMAT") {
            Ok(v) => OutputFormat::parse(&v)?,
            Err(_) => OutputFormat::Jpeg,
        };

        let backend = match env::var("STORAGE_BACKEND") {
            Ok(v) => v.parse::<StorageBackend>()?,
            Err(_) => StorageBackend::Local,
        };

        let preview_dir = env::var("PREVIEW_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("quire-previews"));

        let config = QuireConfig {
            max_input_bytes: max_input_size_mb * 1024 * 1024,
            max_output_bytes: env_or("MAX_OUTPUT_BYTES", MAX_OUTPUT_BYTES),
            max_dimension_px: env_or("MAX_DIMENSION_PX", MAX_DIMENSION_PX),
            large_source_dimension_px: env_or(
                "LARGE_SOURCE_DIMENSION_PX",
                LARGE_SOURCE_DIMENSION_PX,
            ),
            large_source_threshold_px: env_or(
                "LARGE_SOURCE_THRESHOLD_PX",
                LARGE_SOURCE_THRESHOLD_PX,
            ),
            initial_quality: env_or("INITIAL_QUALITY", INITIAL_QUALITY),
            output_format,
            preview_dir,
            watermark: WatermarkSettings {
                enabled: env_bool("WATERMARK_ENABLED", true),
                text: env::var("WATERMARK_TEXT").unwrap_or_default(),
                font_path: env::var("WATERMARK_FONT_PATH").ok().map(PathBuf::from),
                font_size: env_or("WATERMARK_FONT_SIZE", WATERMARK_FONT_SIZE),
                color: env::var("WATERMARK_COLOR").unwrap_or_else(|_| WATERMARK_COLOR.to_string()),
                opacity: env_or("WATERMARK_OPACITY", WATERMARK_OPACITY),
            },
            storage: StorageSettings {
                backend,
                upload_folder: env::var("UPLOAD_FOLDER")
                    .unwrap_or_else(|_| DEFAULT_UPLOAD_FOLDER.to_string()),
                local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
                local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
                s3_bucket: env::var("S3_BUCKET").ok(),
                s3_region: env::var("S3_REGION").or_else(|_| env::var("AWS_REGION")).ok(),
                s3_endpoint: env::var("S3_ENDPOINT").ok(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_input_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_INPUT_SIZE_MB must be greater than zero"));
        }

        if self.max_output_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_OUTPUT_BYTES must be greater than zero"));
        }

        if self.max_dimension_px == 0 || self.large_source_dimension_px == 0 {
            return Err(anyhow::anyhow!(
                "MAX_DIMENSION_PX and LARGE_SOURCE_DIMENSION_PX must be greater than zero"
            ));
        }

        if !(self.initial_quality > 0.0 && self.initial_quality <= 1.0) {
            return Err(anyhow::anyhow!(
                "INITIAL_QUALITY must be in (0, 1], got {}",
                self.initial_quality
            ));
        }

        // Style is built from these even when watermarking is off
        let font_size = self.watermark.font_size;
        if !font_size.is_finite() || font_size < MIN_WATERMARK_FONT_SIZE {
            return Err(anyhow::anyhow!(
                "WATERMARK_FONT_SIZE must be a number >= {}, got {}",
                MIN_WATERMARK_FONT_SIZE,
                font_size
            ));
        }
        if !(0.0..=1.0).contains(&self.watermark.opacity) {
            return Err(anyhow::anyhow!("WATERMARK_OPACITY must be in [0, 1]"));
        }

        if self.watermark.enabled {
            if self.watermark.text.trim().is_empty() {
                return Err(anyhow::anyhow!(
                    "WATERMARK_TEXT must be set when WATERMARK_ENABLED=true"
                ));
            }
            if self.watermark.font_path.is_none() {
                return Err(anyhow::anyhow!(
                    "WATERMARK_FONT_PATH must be set when WATERMARK_ENABLED=true"
                ));
            }
        }

        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.storage.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.storage.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }

    /// Options handed to the processing pipeline for each staged image.
    pub fn processing_options(&self) -> ProcessingOptions {
        ProcessingOptions {
            max_output_bytes: self.max_output_bytes,
            max_dimension_px: self.max_dimension_px,
            large_source_dimension_px: self.large_source_dimension_px,
            large_source_threshold_px: self.large_source_threshold_px,
            initial_quality: self.initial_quality,
            apply_watermark: self.watermark.enabled,
            watermark_text: self.watermark.text.clone(),
            output_format: self.output_format,
        }
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage.backend
    }

    pub fn upload_folder(&self) -> &str {
        &self.storage.upload_folder
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.storage.local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.storage.local_storage_base_url.as_deref()
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.storage.s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.storage.s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.storage.s3_endpoint.as_deref()
    }
}
