use std::path::PathBuf;

use thiserror::Error;

pub const SUPPORTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// Every way a single analyze invocation can fail. The retry wrapper treats
/// all variants the same.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Image file not found: {}", .path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Image file too large: {}MB (max: {max_mb}MB)", megabytes(.size_bytes))]
    SourceTooLarge { size_bytes: u64, max_mb: u64 },

    #[error("Unsupported image format: {format}. Supported: {supported}")]
    UnsupportedFormat { format: String, supported: String },

    #[error("Failed to process image: {message}")]
    ProcessingFailed { message: String },

    #[error("{provider} API error ({}): {message}", status_label(.status))]
    BackendCallFailed {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid response format from {provider} API: {message}")]
    InvalidResponseShape { provider: String, message: String },
}

impl VisionError {
    pub fn unsupported_mime(format: Option<&str>) -> Self {
        Self::UnsupportedFormat {
            format: format.unwrap_or("unknown").to_string(),
            supported: SUPPORTED_MIME_TYPES.join(", "),
        }
    }

    pub fn unsupported_extension(format: Option<&str>) -> Self {
        Self::UnsupportedFormat {
            format: format.unwrap_or("unknown").to_string(),
            supported: SUPPORTED_EXTENSIONS.join(", "),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::ProcessingFailed {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceNotFound { .. } => "source_not_found",
            Self::SourceTooLarge { .. } => "source_too_large",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::ProcessingFailed { .. } => "processing_failed",
            Self::BackendCallFailed { .. } => "backend_call_failed",
            Self::InvalidResponseShape { .. } => "invalid_response_shape",
        }
    }
}

fn megabytes(bytes: &u64) -> String {
    format!("{:.2}", *bytes as f64 / (1024.0 * 1024.0))
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|code| code.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
