//! Progress-callback trait for extraction stage events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to hear
//! about each tier as the orchestrator walks through it.
//!
//! # Example
//!
//! ```rust
//! use restock_extract::{ExtractionConfig, ExtractionProgressCallback, ExtractionStage};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl ExtractionProgressCallback for Log {
//!     fn on_fallback(&self, from: ExtractionStage, reason: &str) {
//!         eprintln!("{from} tier gave up: {reason}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Log) as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::document::ExtractionStage;
use std::sync::Arc;

/// Called by the orchestrator as it moves between tiers.
///
/// All methods default to no-ops so callers only override what they need.
/// Implementations must be `Send + Sync`; several extractions may share one
/// callback from different tasks.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after the document passed admission.
    ///
    /// `has_text_layer` tells whether the text tier will be attempted.
    fn on_extraction_start(&self, size_bytes: usize, has_text_layer: bool) {
        let _ = (size_bytes, has_text_layer);
    }

    /// Called just before a completion request is sent for a tier.
    fn on_stage_start(&self, stage: ExtractionStage) {
        let _ = stage;
    }

    /// Called when a tier's reply came back and passed through the
    /// validator. `item_count` is the number of valid items and may be 0;
    /// a provider error skips this call.
    fn on_stage_complete(&self, stage: ExtractionStage, item_count: usize) {
        let _ = (stage, item_count);
    }

    /// Called when a tier produced nothing: the text tier hands over to
    /// vision, and the vision tier gives up just before the run fails.
    fn on_fallback(&self, from: ExtractionStage, reason: &str) {
        let _ = (from, reason);
    }

    /// Called once after a successful run.
    fn on_extraction_complete(&self, stage: ExtractionStage, item_count: usize) {
        let _ = (stage, item_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
