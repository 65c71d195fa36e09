//! Error types for the restock-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the request is rejected before any
//!   pipeline stage runs (oversized payload, disallowed media type), the
//!   input cannot be resolved, or every extraction tier came back empty.
//!   Returned as `Err(ExtractError)` from the top-level `extract*` functions.
//!
//! * [`CompletionError`] — **Non-fatal**: one completion call failed
//!   (provider outage, empty content, timeout). The orchestrator reacts by
//!   advancing to the next fallback tier, so this type only escapes as the
//!   message inside [`ExtractError::ExtractionFailed`].
//!
//! Every fatal error maps onto the outbound failure shape
//! `{ "error": code, "message": text }` via [`ExtractError::to_body`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the restock-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Rejection errors ──────────────────────────────────────────────────
    /// Payload exceeds the configured size ceiling.
    #[error("File too large: {size} bytes exceeds the {limit} byte limit ({}). Upload a smaller scan or photo.", megabytes(.limit))]
    PayloadTooLarge { size: usize, limit: usize },

    /// Declared media type is neither PDF-like nor an image.
    #[error("Unsupported file type '{media_type}'. Upload a PDF or an image (JPEG, PNG, …).")]
    UnsupportedMediaType { media_type: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Report file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Both the text tier and the vision tier produced nothing usable.
    ///
    /// `message` is the vision provider's error when one was reported,
    /// otherwise a generic "nothing extracted" sentence.
    #[error("{message}")]
    ExtractionFailed { message: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Stable, code-like identifier used as the `error` field of the
    /// outbound failure shape.
    pub fn code(&self) -> &'static str {
        match self {
            ExtractError::PayloadTooLarge { .. } => "file_too_large",
            ExtractError::UnsupportedMediaType { .. } => "unsupported_file_type",
            ExtractError::FileNotFound { .. }
            | ExtractError::PermissionDenied { .. }
            | ExtractError::InvalidInput { .. } => "invalid_input",
            ExtractError::DownloadFailed { .. } | ExtractError::DownloadTimeout { .. } => {
                "download_failed"
            }
            ExtractError::ProviderNotConfigured { .. } => "provider_not_configured",
            ExtractError::ExtractionFailed { .. } => "extraction_failed",
            ExtractError::InvalidConfig(_) => "invalid_config",
            ExtractError::Internal(_) => "internal_error",
        }
    }

    /// True for the two pre-pipeline rejections (size and media type).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ExtractError::PayloadTooLarge { .. } | ExtractError::UnsupportedMediaType { .. }
        )
    }

    /// Render this error as the outbound failure shape.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Outbound failure shape: `{ "error": "...", "message": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// A non-fatal failure of a single completion call.
///
/// Messages are human-readable and never carry provider payloads or
/// backtraces.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CompletionError {
    /// The provider reported an error after all transport retries.
    #[error("AI provider error after {retries} retries: {detail}")]
    Provider { retries: u32, detail: String },

    /// The provider answered, but with no content.
    #[error("AI provider returned an empty response")]
    EmptyCompletion,

    /// The call did not finish within the configured timeout.
    #[error("AI provider call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// `10485760` → `"10 MB"`, `1572864` → `"1.5 MB"`.
fn megabytes(bytes: &usize) -> String {
    let mb = *bytes as f64 / (1024.0 * 1024.0);
    if mb.fract() == 0.0 {
        format!("{mb:.0} MB")
    } else {
        format!("{mb:.1} MB")
    }
}
