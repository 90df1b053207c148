//! Quire Core Library
//!
//! This crate provides the domain models, error types and configuration shared
//! by the processing, staging and storage crates.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{QuireConfig, StorageSettings, WatermarkSettings};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    CropRegion, GeometryError, MediaKind, OutputFormat, ProcessedAsset, ProcessingOptions,
    Rotation,
};
pub use storage_types::StorageBackend;
