//! Error types module
//!
//! This module provides the application-level error type. Each crate keeps its own
//! `thiserror` enum for precise matching and converts into `AppError` at the edge,
//! where `ErrorMetadata` decides how the failure is reported to the user.

use std::io;

use crate::models::GeometryError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be presented
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "UPLOAD_FAILED")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (the caller may re-invoke the operation)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the user
    fn suggested_action(&self) -> Option<&'static str>;

    /// Single, specific user-facing message
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    InvalidGeometry(#[from] GeometryError),

    #[error("Surface allocation failed: {0}")]
    SurfaceAllocation(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Upload of asset {asset} failed: {reason}")]
    UploadFailed { asset: String, reason: String },

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, recoverable, suggested_action, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (&'static str, bool, Option<&'static str>, LogLevel) {
    match err {
        AppError::InvalidInput(_) => (
            "INVALID_INPUT",
            false,
            Some("Check the file and parameters and try again"),
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Choose a smaller file"),
            LogLevel::Debug,
        ),
        AppError::InvalidGeometry(_) => (
            "INVALID_CROP_REGION",
            false,
            Some("Select a crop inside the image bounds"),
            LogLevel::Debug,
        ),
        AppError::SurfaceAllocation(_) => (
            "SURFACE_ALLOCATION_FAILED",
            false,
            Some("Select a smaller crop region"),
            LogLevel::Warn,
        ),
        AppError::ImageProcessing(_) => (
            "IMAGE_PROCESSING_ERROR",
            false,
            Some("Check image format and try a different file"),
            LogLevel::Warn,
        ),
        AppError::Encode(_) => (
            "ENCODE_FAILED",
            false,
            Some("Try a different output format"),
            LogLevel::Error,
        ),
        AppError::Storage(_) => (
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
        AppError::UploadFailed { .. } => (
            "UPLOAD_FAILED",
            true,
            Some("Save again to retry the upload"),
            LogLevel::Error,
        ),
        AppError::UnresolvedReference(_) => (
            "UNRESOLVED_REFERENCE",
            false,
            Some("Re-add the image or remove the block that references it"),
            LogLevel::Warn,
        ),
        AppError::Cancelled(_) => ("CANCELLED", true, None, LogLevel::Debug),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
    }
}

const MAX_CAUSES: usize = 5;

impl AppError {
    /// Display text followed by up to five underlying causes, one per line.
    pub fn detailed_message(&self) -> String {
        let causes: Vec<String> =
            std::iter::successors(std::error::Error::source(self), |err| err.source())
                .map(|err| err.to_string())
                .collect();

        let mut details = self.to_string();
        for cause in causes.iter().take(MAX_CAUSES) {
            details.push_str("\n  caused by: ");
            details.push_str(cause);
        }
        if causes.len() > MAX_CAUSES {
            details.push_str(&format!("\n  ({} more)", causes.len() - MAX_CAUSES));
        }
        details
    }
}

impl ErrorMetadata for AppError {
    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).1
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::InvalidGeometry(ref err) => err.to_string(),
            AppError::SurfaceAllocation(ref msg) => {
                format!("Could not allocate the output image: {}", msg)
            }
            AppError::ImageProcessing(ref msg) => msg.clone(),
            AppError::Encode(_) => "Failed to encode the processed image".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::UploadFailed { asset, .. } => format!("Upload of asset {} failed", asset),
            AppError::UnresolvedReference(ref id) => {
                format!("The document still references unsaved image {}", id)
            }
            AppError::Cancelled(ref msg) => format!("Cancelled: {}", msg),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal error".to_string()
            }
        }
    }
}
