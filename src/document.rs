//! Data model: the request-scoped values that flow through the pipeline,
//! plus the outbound success shape and run statistics.
//!
//! ```text
//! RawDocument ─▶ ExtractedText? ─▶ SupplierBlock* ─▶ ParsedDocument ─▶ NormalizedItem*
//! ```
//!
//! Nothing here is persisted. Every value is created and dropped within a
//! single [`crate::extract::extract`] call.

use serde::{Deserialize, Serialize};

/// Broad family of an admitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Pdf,
    Image,
}

impl MediaKind {
    /// Classify a declared media type.
    ///
    /// Anything containing `pdf` is a PDF; anything starting with `image/`
    /// is an image; everything else is `None` and will be rejected.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let m = media_type.trim().to_ascii_lowercase();
        if m.contains("pdf") {
            Some(MediaKind::Pdf)
        } else if m.starts_with("image/") {
            Some(MediaKind::Image)
        } else {
            None
        }
    }
}

/// A submitted document: opaque bytes plus the declared media type.
#[derive(Clone)]
pub struct RawDocument {
    bytes: Vec<u8>,
    media_type: String,
}

impl RawDocument {
    pub fn new(bytes: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_media_type(&self.media_type)
    }
}

impl std::fmt::Debug for RawDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDocument")
            .field("media_type", &self.media_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// A text layer recovered from a PDF. Its absence is modelled as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
}

/// One contiguous run of lines attributed to a single supplier header.
///
/// `lines` only ever holds trimmed, non-empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierBlock {
    pub supplier_name: String,
    pub lines: Vec<String>,
}

/// One validated extraction unit as returned by a completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    pub product: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
}

/// Schema-conformant wrapper around model output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub items: Vec<ParsedItem>,
    /// Elements of `items` that failed the item schema and were dropped.
    #[serde(skip)]
    pub dropped: usize,
}

impl ParsedDocument {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The pipeline's external output unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedItem {
    /// Request-scoped identifier; not unique across requests.
    pub id: String,
    /// Normalised supplier name; empty when unknown, never absent.
    pub supplier: String,
    /// Normalised product name; never empty.
    pub product: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
}

/// Which extraction tier produced the final items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStage {
    Text,
    Vision,
}

impl std::fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionStage::Text => f.pad("text"),
            ExtractionStage::Vision => f.pad("vision"),
        }
    }
}

/// How the text tier ended.
///
/// The fallback rule treats every variant except `Items` identically; this
/// record exists so callers can tell a provider outage from a document that
/// simply had nothing on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TextTierOutcome {
    /// No text layer (scan, photo, unreadable PDF).
    NoTextLayer,
    /// The text completion call failed.
    ProviderFailed { message: String },
    /// The completion was valid but yielded zero items.
    NoItems,
    /// The text tier produced this many validated items.
    Items { count: usize },
}

/// Statistics for one extraction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Tier whose items were returned.
    pub stage: ExtractionStage,
    pub text_tier: TextTierOutcome,
    /// Blocks handed to the text prompt (0 when there was no text layer).
    pub text_blocks: usize,
    /// Items that failed the item schema across all tiers.
    pub dropped_items: usize,
    /// Items merged into an earlier item with the same supplier and product.
    pub duplicate_items: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub prompt_version: String,
}

/// Result of a successful extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub items: Vec<NormalizedItem>,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// The outbound success shape: `{ "items": [...] }`.
    pub fn body(&self) -> ItemsBody<'_> {
        ItemsBody { items: &self.items }
    }
}

/// Borrowed outbound success shape.
#[derive(Debug, Serialize)]
pub struct ItemsBody<'a> {
    pub items: &'a [NormalizedItem],
}

/// What [`crate::extract::inspect`] learned without calling a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInspection {
    pub media_type: String,
    pub kind: MediaKind,
    pub size_bytes: usize,
    pub has_text_layer: bool,
    pub text_chars: usize,
    pub blocks: Vec<SupplierBlock>,
    /// The text prompt the text tier would send, when there is a text layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_classification() {
        assert_eq!(MediaKind::from_media_type("application/pdf"), Some(MediaKind::Pdf));
        assert_eq!(MediaKind::from_media_type("application/x-pdf"), Some(MediaKind::Pdf));
        assert_eq!(MediaKind::from_media_type("image/jpeg"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_media_type("IMAGE/PNG"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_media_type("text/plain"), None);
        assert_eq!(MediaKind::from_media_type(""), None);
    }

    #[test]
    fn raw_document_debug_hides_bytes() {
        let doc = RawDocument::new(vec![1u8, 2, 3], "image/png");
        let dbg = format!("{doc:?}");
        assert!(dbg.contains("size: 3"));
        assert!(!dbg.contains("[1, 2, 3]"));
    }

    #[test]
    fn normalized_item_omits_absent_quantity() {
        let item = NormalizedItem {
            id: "item-1".into(),
            supplier: String::new(),
            product: "widget".into(),
            quantity: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["supplier"], "");
        assert!(json.get("quantity").is_none());
    }

    #[test]
    fn text_tier_outcome_is_tagged() {
        let json = serde_json::to_value(TextTierOutcome::Items { count: 3 }).unwrap();
        assert_eq!(json["outcome"], "items");
        assert_eq!(json["count"], 3);
    }
}
