//! # restock-extract
//!
//! Turn a photographed, scanned or exported "stock sales report" into a list
//! of `{supplier, product, quantity}` restock items.
//!
//! ## Why two tiers?
//!
//! Reports arrive either as PDFs exported from a point-of-sale system (with a
//! usable text layer) or as phone photos of the printed page, often with a
//! manager's handwritten quantities in the margin. Reading the text layer is
//! cheap and exact, so it goes first. When there is no text layer, or the
//! text model finds nothing, the document goes to a vision model, which can
//! also see pen marks and strikethroughs.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Admit     ≤ 10 MB, PDF or image, otherwise rejected
//!  ├─ 2. Text      PDF text layer via lopdf, or None
//!  ├─ 3. Segment   supplier-header heuristics → blocks
//!  ├─ 4. Text LLM  prompt with quantity rules → JSON
//!  ├─ 5. Vision    fallback: pages rasterised via pdfium → VLM
//!  ├─ 6. Validate  untrusted JSON → schema-checked items
//!  └─ 7. Normalize lowercase, suffix stripping, ids, duplicate merge
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use restock_extract::{extract, ExtractionConfig, RawDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let bytes = std::fs::read("report.pdf")?;
//!     let output = extract(&RawDocument::new(bytes, "application/pdf"), &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.body())?);
//!     eprintln!("via {} tier, {} tokens in", output.stats.stage, output.stats.total_input_tokens);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `restock` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! restock-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use document::{
    DocumentInspection, ExtractedText, ExtractionOutput, ExtractionStage, ExtractionStats,
    ItemsBody, MediaKind, NormalizedItem, ParsedDocument, ParsedItem, RawDocument, SupplierBlock,
    TextTierOutcome,
};
pub use error::{CompletionError, ErrorBody, ExtractError};
pub use extract::{extract, extract_file, extract_sync, extract_with_client, inspect};
pub use pipeline::completion::{Completion, CompletionClient, CompletionKind, CompletionRequest};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::PROMPT_VERSION;
