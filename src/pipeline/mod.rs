//! Pipeline stages for stock-report extraction.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the orchestrator in [`crate::extract`] only sequences them.
//!
//! ## Data Flow
//!
//! ```text
//!              ┌─ text ──▶ segment ──▶ completion(text) ──▶ validate ─┐
//! input ──▶ admit                                                     ├──▶ normalize
//!              └─ render ──▶ encode ──▶ completion(vision) ──▶ validate ─┘
//!                 (only when the text tier comes back empty)
//! ```
//!
//! 1. [`input`]      — resolve a path or URL, sniff the media type, admit
//!    the payload (size ceiling + PDF/image check)
//! 2. [`text`]       — recover a PDF text layer, or `None`
//! 3. [`segment`]    — split the text layer into supplier blocks
//! 4. [`completion`] — the provider adapter; the only stage with network I/O
//! 5. [`render`] / [`encode`] — build the vision payload (rasterised pages,
//!    or the original bytes)
//! 6. [`validate`]   — untrusted model reply → schema-checked items
//! 7. [`normalize`]  — name normalisation, ids, duplicate merging

pub mod completion;
pub mod encode;
pub mod input;
pub mod normalize;
pub mod render;
pub mod segment;
pub mod text;
pub mod validate;
