//! Unified error type for the derivative generation engine.
//!
//! All subsystem errors (classification, process supervision, caching,
//! in-process image work) are consolidated into a single `PreviewError`
//! enum that maps cleanly to `previewd_core::error::AppError`.

use std::path::PathBuf;

use thiserror::Error;

use previewd_core::error::AppError;

/// Unified error type for all derivative generation operations.
#[derive(Debug, Error)]
pub enum PreviewError {
    /// The source file is absent at the resolved path.
    #[error("Source file not found: {path}")]
    SourceMissing {
        /// The resolved absolute path that was checked.
        path: PathBuf,
    },

    /// The file extension is outside every supported format list.
    #[error("No preview available for '.{extension}' files")]
    Unsupported {
        /// The lowercased extension.
        extension: String,
    },

    /// The requested derivative kind does not apply to the source kind
    /// (e.g. an optimized web image of a video).
    #[error("Cannot produce {derivative} from a {source_kind} source")]
    IncompatibleDerivative {
        /// Requested derivative kind.
        derivative: &'static str,
        /// Classified source kind.
        source_kind: &'static str,
    },

    /// An external converter exceeded its wall-clock budget and was killed.
    #[error("{tool} timed out after {seconds}s")]
    Timeout {
        /// The converter command.
        tool: String,
        /// The timeout that was exceeded.
        seconds: u64,
    },

    /// An external converter exited with a nonzero status.
    #[error("{tool} exited with code {code}: {stderr}")]
    ToolFailed {
        /// The converter command.
        tool: String,
        /// The exit code.
        code: i32,
        /// Captured stderr, truncated.
        stderr: String,
    },

    /// A required external tool (or an optional dependency it needs) is
    /// not installed on this host.
    #[error("{tool} is not available: {hint}")]
    ToolMissing {
        /// The missing tool or dependency name.
        tool: String,
        /// An actionable message for the operator.
        hint: String,
    },

    /// A converter exited with code 0 but the expected output file does
    /// not exist. Observed real tool behavior under edge-case inputs.
    #[error("{tool} reported success but produced no output at {path}")]
    PartialOutput {
        /// The converter command.
        tool: String,
        /// Expected output path.
        path: PathBuf,
    },

    /// The source bytes could not be decoded in-process.
    #[error("Failed to decode source image: {0}")]
    Decode(#[from] image::ImageError),

    /// The conversion limiter was closed unexpectedly.
    #[error("Conversion limiter closed: {reason}")]
    LimiterClosed {
        /// Description of which acquire failed.
        reason: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (glTF scene rewriting).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tokio task join error.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<PreviewError> for AppError {
    fn from(err: PreviewError) -> Self {
        match &err {
            PreviewError::SourceMissing { .. } => AppError::not_found(err.to_string()),
            PreviewError::Unsupported { .. } | PreviewError::IncompatibleDerivative { .. } => {
                AppError::unsupported_media(err.to_string())
            }
            PreviewError::Timeout { .. } => AppError::timeout(err.to_string()),
            PreviewError::ToolFailed { .. } => AppError::external_tool(err.to_string()),
            PreviewError::ToolMissing { .. } => AppError::tool_missing(err.to_string()),
            PreviewError::PartialOutput { .. } => AppError::partial_output(err.to_string()),
            PreviewError::Decode(_) => AppError::validation(err.to_string()),
            PreviewError::Io(_) => AppError::storage(err.to_string()),
            PreviewError::Json(_) => AppError::new(
                previewd_core::error::ErrorKind::Serialization,
                err.to_string(),
            ),
            PreviewError::LimiterClosed { .. } | PreviewError::Join(_) => {
                AppError::internal(err.to_string())
            }
        }
    }
}
