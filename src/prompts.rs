//! Prompts for stock-report extraction.
//!
//! These strings are the only thing that controls how quantities are read:
//! there is no local OCR or handwriting recognition, so the decimal rule,
//! the handwritten override and the strikethrough exclusion live here and
//! nowhere else. Bump [`PROMPT_VERSION`] whenever their meaning changes;
//! the version is reported in every run's stats.
//!
//! Two variants exist:
//!
//! * [`build_text_prompt`] — for the text tier, with the supplier blocks
//!   recovered from the PDF text layer appended.
//! * [`build_vision_prompt`] — for the vision tier. It adds a walk through
//!   the report's column layout and worked examples, because the model has
//!   nothing but pixels to go on.

use crate::document::SupplierBlock;

/// Version of the rule text below.
pub const PROMPT_VERSION: &str = "2024-06-stock-report-v3";

/// Any row whose apparent quantity exceeds this is treated as misread.
pub const QUANTITY_SANITY_BOUND: u64 = 500;

/// System message sent ahead of either prompt.
pub const SYSTEM_PROMPT: &str = "You extract restock orders from retail stock sales reports. \
You reply with a single JSON object and nothing else.";

/// Output contract shared by both prompts.
pub const OUTPUT_SCHEMA_RULES: &str = r#"OUTPUT FORMAT
Return ONLY valid JSON with exactly this shape:
{ "items": [ { "supplier": "string or empty string", "product": "string", "quantity": integer } ] }
- No markdown, no code fences, no comments, no extra text before or after the JSON.
- "product" is required and must not be empty.
- "supplier" is the supplier heading the row appears under; use "" when unknown.
- "quantity" is a whole number (integer). Never output a decimal or a string."#;

/// Quantity interpretation policy, in strict priority order.
pub const QUANTITY_RULES: &str = r#"QUANTITY RULES (apply in this exact priority order)
1. HANDWRITTEN OVERRIDE: if a handwritten number appears next to a row (in the margin, beside or over the printed figures), that number is the quantity. It overrides everything else and is already a whole number.
2. STRIKETHROUGH: if a row is crossed out or struck through, EXCLUDE that row entirely. Do not output it.
3. PRINTED QUANTITY: otherwise use the printed "Quantity" column. It is printed in decimal notation with three decimal places:
   - "6.000" means 6 (six), NOT 6000.
   - "12.000" means 12. "1.000" means 1. "0.500" means 0.5.
   - The period is ALWAYS a decimal point, NEVER a thousands separator.
   - Round to the nearest whole number: "2.600" → 3, "2.400" → 2."#;

/// Name cleanup and self-check rules.
pub const CLEANUP_RULES: &str = r#"CLEANUP RULES
- Remove leading asterisks from product names: "**Chicken Wings" → "Chicken Wings".
- Remove supplier label suffixes from supplier names: " - S EMail", " - Box of 4 EMail", " - 12 box min", and any trailing "EMail" or "Email".
- 5-digit numbers (for example 10234) are SKU / product codes. They are NEVER quantities.
- SANITY CHECK: if a quantity you read is greater than 500, you have misread it (most likely a SKU or a decimal read as thousands). Re-read the row; if you cannot resolve it, leave that row out."#;

/// Extra guidance for the vision tier: where things are on the page.
pub const VISION_LAYOUT_GUIDE: &str = r#"DOCUMENT LAYOUT
The image is a "stock sales report" printed from a point-of-sale system, usually photographed or scanned, often with pen annotations.
- Rows are grouped under supplier headings (a supplier name printed in capitals, sometimes followed by an ordering label such as "- S EMail").
- Each product row typically reads left to right: SKU / product code (5 digits), product description, then numeric columns such as Sold, On Hand, and Quantity.
- The "Quantity" column is the printed order suggestion, shown with three decimals (e.g. "6.000").
- Managers write corrections by hand in the margin or next to the Quantity column, and cross out rows they do not want.

WORKED EXAMPLES
- Printed "6.000", no pen marks → quantity 6.
- Printed "6.000", handwritten "10" in the margin → quantity 10.
- Printed "24.000", handwritten "0" beside it → quantity 0.
- Printed "3.000", row struck through with a line → row omitted.
- Printed "10234  Beef Mince 5kg  4.000" → product "Beef Mince 5kg", quantity 4 (10234 is the SKU).
- Supplier heading "FRESH FARMS - Box of 4 EMail" → supplier "FRESH FARMS"."#;

/// Build the prompt for the text tier from segmented supplier blocks.
///
/// Blocks are rendered in order; a block with an empty supplier name is
/// labelled as unknown so the model falls back to its own reading of the
/// surrounding text.
pub fn build_text_prompt(blocks: &[SupplierBlock]) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(
        "Extract every product row that should be reordered from the stock sales report text below.\n\
The text was read from the PDF text layer and grouped by supplier heading. \
Handwriting and strikethrough marks are not visible in this text, so apply the printed quantity rule unless the text itself shows an override.\n\n",
    );
    push_rules(&mut prompt);

    prompt.push_str("\n\nREPORT TEXT\n");
    for block in blocks {
        prompt.push('\n');
        if block.supplier_name.is_empty() {
            prompt.push_str("=== Supplier: (unknown) ===\n");
        } else {
            prompt.push_str("=== Supplier: ");
            prompt.push_str(&block.supplier_name);
            prompt.push_str(" ===\n");
        }
        for line in &block.lines {
            prompt.push_str(line);
            prompt.push('\n');
        }
    }
    prompt.push_str("\nReturn the JSON object now.");
    prompt
}

/// Build the prompt for the vision tier.
pub fn build_vision_prompt() -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(
        "Extract every product row that should be reordered from the attached stock sales report image(s).\n\n",
    );
    prompt.push_str(VISION_LAYOUT_GUIDE);
    prompt.push_str("\n\n");
    push_rules(&mut prompt);
    prompt.push_str("\n\nReturn the JSON object now.");
    prompt
}

fn push_rules(prompt: &mut String) {
    prompt.push_str(QUANTITY_RULES);
    prompt.push_str("\n\n");
    prompt.push_str(CLEANUP_RULES);
    prompt.push_str("\n\n");
    prompt.push_str(OUTPUT_SCHEMA_RULES);
}
