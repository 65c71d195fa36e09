//! Block segmentation: split a text layer into supplier-scoped chunks.
//!
//! A line is a supplier header when it carries an explicit label
//! (`SUPPLIER:`, `VENDOR:`, `FROM:`, `ORDER FROM:`, any case) or when it is
//! a short all-caps title, which is how point-of-sale reports print
//! section headings. Body lines seen before the first header are dropped;
//! the model still sees the whole report through the vision tier if the
//! text tier comes back empty.

use crate::document::SupplierBlock;
use once_cell::sync::Lazy;
use regex::Regex;

/// Caps titles must be shorter than this to count as headers.
const MAX_CAPS_HEADER_LEN: usize = 50;
/// …and longer than this.
const MIN_CAPS_HEADER_LEN: usize = 3;

static RE_LABELLED_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:order\s+from|supplier|vendor|from)\s*:\s*(.*)$").unwrap()
});

/// Segment text into blocks, substituting a single unnamed block holding
/// every non-empty line when no header-led block was found.
///
/// Returns an empty vector only when the text has no non-empty lines.
pub fn segment(text: &str) -> Vec<SupplierBlock> {
    let blocks = split_blocks(text);
    if !blocks.is_empty() {
        return blocks;
    }
    let lines: Vec<String> = clean_lines(text).map(str::to_string).collect();
    if lines.is_empty() {
        return Vec::new();
    }
    vec![SupplierBlock {
        supplier_name: String::new(),
        lines,
    }]
}

/// Header-driven split with no fallback.
///
/// A header closes the current block if it has body lines; a header
/// followed directly by another header is discarded.
pub fn split_blocks(text: &str) -> Vec<SupplierBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<SupplierBlock> = None;

    for line in clean_lines(text) {
        if let Some(name) = header_name(line) {
            if let Some(block) = current.take() {
                if !block.lines.is_empty() {
                    blocks.push(block);
                }
            }
            current = Some(SupplierBlock {
                supplier_name: name,
                lines: Vec::new(),
            });
        } else if let Some(block) = current.as_mut() {
            block.lines.push(line.to_string());
        }
    }

    if let Some(block) = current {
        if !block.lines.is_empty() {
            blocks.push(block);
        }
    }
    blocks
}

/// If `line` (already trimmed) is a header, return the supplier name it
/// introduces.
pub fn header_name(line: &str) -> Option<String> {
    if let Some(caps) = RE_LABELLED_HEADER.captures(line) {
        return Some(caps[1].trim().to_string());
    }
    if is_caps_title(line) {
        return Some(line.to_string());
    }
    None
}

/// Short, non-trivial, fully upper-case, and containing at least one letter.
fn is_caps_title(line: &str) -> bool {
    let len = line.chars().count();
    len > MIN_CAPS_HEADER_LEN
        && len < MAX_CAPS_HEADER_LEN
        && line.chars().any(char::is_alphabetic)
        && line == line.to_uppercase()
}

fn clean_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}
