use quire_core::MediaKind;

/// Boundary validation errors for selected media
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Unsupported content type: {0} (expected image/* or video/*)")]
    UnsupportedContentType(String),

    #[error("Empty file")]
    EmptyFile,
}

impl From<ValidationError> for quire_core::AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::FileTooLarge { .. } => {
                quire_core::AppError::PayloadTooLarge(err.to_string())
            }
            other => quire_core::AppError::InvalidInput(other.to_string()),
        }
    }
}

/// Media file validator
///
/// Checks size and mime prefix before anything is decoded or staged.
#[derive(Debug, Clone)]
pub struct MediaValidator {
    max_file_size: usize,
}

impl MediaValidator {
    pub fn new(max_file_size: usize) -> Self {
        Self { max_file_size }
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Validate file size
    pub fn validate_file_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    /// Classify the content type; only `image/` and `video/` are accepted.
    pub fn validate_content_type(&self, content_type: &str) -> Result<MediaKind, ValidationError> {
        MediaKind::from_content_type(content_type)
            .ok_or_else(|| ValidationError::UnsupportedContentType(content_type.to_string()))
    }

    /// Validate size and content type, returning the media kind
    pub fn validate(&self, content_type: &str, data: &[u8]) -> Result<MediaKind, ValidationError> {
        self.validate_file_size(data.len())?;
        let kind = self.validate_content_type(content_type)?;

        tracing::debug!(
            content_type = %content_type,
            size_bytes = data.len(),
            kind = kind.as_str(),
            "Media validated"
        );

        Ok(kind)
    }
}

impl Default for MediaValidator {
    fn default() -> Self {
        Self::new((quire_core::constants::MAX_INPUT_SIZE_MB * 1024 * 1024) as usize)
    }
}
