//! Text-layer extraction from PDF bytes.
//!
//! Photographed and scanned reports have no text layer, so "no text" is the
//! common case and must be cheap to detect. [`extract_text`] therefore never
//! fails: a corrupt file, an unsupported encoding, an image upload and an
//! empty layer all come back as `None`, which sends the orchestrator straight
//! to the vision tier.
//!
//! Lines are recovered without font metrics: while walking each page's
//! content stream we keep the text and line matrices (`Tm`, `Td`, `TD`, `T*`)
//! and the graphics CTM (`cm`, `q`/`Q`, Form XObject `/Matrix`), and start a
//! new line whenever the baseline of a run moves by more than
//! `line_break_threshold` user-space units from the previous run. Form
//! XObjects invoked with `Do` are walked in place.

use crate::document::{ExtractedText, MediaKind, RawDocument};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, warn};

/// TJ kerning below this (thousandths of an em) is read as a word gap.
const TJ_SPACE_KERNING: f32 = -200.0;

/// Extract the text layer of a document, or `None` if there is none.
///
/// Runs the parse on the blocking pool; a panic inside the PDF parser is
/// reported as `None` like any other failure.
pub async fn extract_text(document: &RawDocument, line_break_threshold: f32) -> Option<ExtractedText> {
    if document.kind() != Some(MediaKind::Pdf) {
        debug!("Skipping text layer: {} is not a PDF", document.media_type());
        return None;
    }

    let bytes = document.bytes().to_vec();
    match tokio::task::spawn_blocking(move || extract_text_layer(&bytes, line_break_threshold)).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Text layer task aborted: {}", e);
            None
        }
    }
}

/// Blocking implementation of [`extract_text`] over raw PDF bytes.
pub fn extract_text_layer(bytes: &[u8], line_break_threshold: f32) -> Option<ExtractedText> {
    let doc = match Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            debug!("No text layer: PDF did not parse ({})", e);
            return None;
        }
    };

    let pages = doc.get_pages();
    let mut page_texts = Vec::with_capacity(pages.len());

    for (&page_num, &page_id) in pages.iter() {
        let content = match doc.get_page_content(page_id) {
            Ok(c) => c,
            Err(e) => {
                debug!("Page {}: no content stream ({})", page_num, e);
                continue;
            }
        };
        let ops = match Content::decode(&content) {
            Ok(c) => c.operations,
            Err(e) => {
                debug!("Page {}: content stream did not decode ({})", page_num, e);
                continue;
            }
        };

        let mut walker = PageTextWalker::new(&doc, line_break_threshold);
        walker.walk(&ops, page_resources(&doc, page_id));
        let text = walker.out;
        if !text.trim().is_empty() {
            page_texts.push(text);
        }
    }

    let text = page_texts.join("\n\n");
    if text.trim().is_empty() {
        debug!("No text layer: {} pages, no text runs", pages.len());
        return None;
    }

    debug!(
        "Text layer: {} chars across {} pages",
        text.len(),
        page_texts.len()
    );
    Some(ExtractedText { text })
}

/// Nested forms deeper than this are skipped (and break `Do` cycles).
const MAX_FORM_DEPTH: usize = 8;

/// PDF affine matrix `[a b c d e f]`, row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translate(tx: f32, ty: f32) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        let n = |i: usize| number(operands.get(i));
        Some(Self {
            a: n(0)?,
            b: n(1)?,
            c: n(2)?,
            d: n(3)?,
            e: n(4)?,
            f: n(5)?,
        })
    }

    /// `self × other`: apply `self` first, then `other`.
    fn then(self, other: Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }
}

/// Walks one page's content operations, tracking the text cursor.
struct PageTextWalker<'a> {
    doc: &'a Document,
    threshold: f32,
    out: String,
    /// Baseline (user space) of the last emitted run.
    last_run_y: Option<f32>,
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    /// Text matrix.
    tm: Matrix,
    /// Text line matrix.
    lm: Matrix,
    leading: f32,
    /// An explicit next-line operator ran since the last run.
    force_break: bool,
    /// A positioning operator ran since the last run.
    moved: bool,
    depth: usize,
}

impl<'a> PageTextWalker<'a> {
    fn new(doc: &'a Document, threshold: f32) -> Self {
        Self {
            doc,
            threshold,
            out: String::new(),
            last_run_y: None,
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            tm: Matrix::IDENTITY,
            lm: Matrix::IDENTITY,
            leading: 0.0,
            force_break: false,
            moved: false,
            depth: 0,
        }
    }

    fn walk(&mut self, ops: &[Operation], resources: Option<&'a Dictionary>) {
        for op in ops {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => self.ctm_stack.push(self.ctm),
                "Q" => {
                    if let Some(ctm) = self.ctm_stack.pop() {
                        self.ctm = ctm;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        self.ctm = m.then(self.ctm);
                    }
                }
                "BT" => {
                    self.tm = Matrix::IDENTITY;
                    self.lm = Matrix::IDENTITY;
                    self.moved = true;
                }
                "Td" => {
                    if let (Some(tx), Some(ty)) = (number(operands.first()), number(operands.get(1))) {
                        self.move_line(tx, ty);
                    }
                }
                "TD" => {
                    if let (Some(tx), Some(ty)) = (number(operands.first()), number(operands.get(1))) {
                        self.leading = -ty;
                        self.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        self.tm = m;
                        self.lm = m;
                    }
                    self.moved = true;
                }
                "TL" => {
                    if let Some(l) = number(operands.first()) {
                        self.leading = l;
                    }
                }
                "T*" => self.next_line(),
                "Tj" | "TJ" => {
                    if let Some(s) = operands.first().and_then(decode_operand) {
                        self.emit(&s);
                    }
                }
                "'" => {
                    self.next_line();
                    if let Some(s) = operands.first().and_then(decode_operand) {
                        self.emit(&s);
                    }
                }
                "\"" => {
                    self.next_line();
                    if let Some(s) = operands.get(2).and_then(decode_operand) {
                        self.emit(&s);
                    }
                }
                "Do" => {
                    if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                        self.run_form(name, resources);
                    }
                }
                _ => {}
            }
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.lm = Matrix::translate(tx, ty).then(self.lm);
        self.tm = self.lm;
        self.moved = true;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
        self.force_break = true;
    }

    /// Walk a Form XObject with its `/Matrix` applied, as an implicit `q … Q`.
    fn run_form(&mut self, name: &[u8], resources: Option<&'a Dictionary>) {
        if self.depth >= MAX_FORM_DEPTH {
            debug!("Skipping form XObject: nesting deeper than {}", MAX_FORM_DEPTH);
            return;
        }
        let Some(stream) = resources.and_then(|r| xobject(self.doc, r, name)) else {
            return;
        };
        if stream.dict.get(b"Subtype").and_then(Object::as_name).ok() != Some(b"Form".as_slice()) {
            return;
        }
        let bytes = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let ops = match Content::decode(&bytes) {
            Ok(c) => c.operations,
            Err(e) => {
                debug!("Form XObject did not decode ({})", e);
                return;
            }
        };
        let form_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|o| resolve(self.doc, o))
            .and_then(|o| o.as_dict().ok())
            .or(resources);
        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|o| o.as_array().ok())
            .and_then(|a| Matrix::from_operands(a))
            .unwrap_or(Matrix::IDENTITY);

        let saved_ctm = self.ctm;
        let saved_stack = self.ctm_stack.len();
        self.ctm = matrix.then(self.ctm);
        self.depth += 1;
        self.walk(&ops, form_resources);
        self.depth -= 1;
        self.ctm_stack.truncate(saved_stack);
        self.ctm = saved_ctm;
    }

    fn emit(&mut self, run: &str) {
        if run.is_empty() {
            return;
        }
        let y = self.tm.then(self.ctm).f;
        if let Some(prev) = self.last_run_y {
            if self.force_break || (y - prev).abs() > self.threshold {
                self.out.push('\n');
            } else if self.moved
                && !self.out.ends_with(char::is_whitespace)
                && !run.starts_with(char::is_whitespace)
            {
                self.out.push(' ');
            }
        }
        self.out.push_str(run);
        self.last_run_y = Some(y);
        self.force_break = false;
        self.moved = false;
    }
}

fn number(obj: Option<&Object>) -> Option<f32> {
    obj.and_then(|o| o.as_float().ok())
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    doc.dereference(obj).ok().map(|(_, o)| o)
}

/// The page's resource dictionary, inline or inherited by reference.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let (inline, ids) = doc.get_page_resources(page_id);
    inline.or_else(|| ids.iter().find_map(|id| doc.get_dictionary(*id).ok()))
}

fn xobject<'a>(doc: &'a Document, resources: &'a Dictionary, name: &[u8]) -> Option<&'a Stream> {
    let xobjects = resolve(doc, resources.get(b"XObject").ok()?)?.as_dict().ok()?;
    resolve(doc, xobjects.get(name).ok()?)?.as_stream().ok()
}

/// Decode a `Tj` string or a `TJ` array into text.
fn decode_operand(operand: &Object) -> Option<String> {
    match operand {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Array(items) => {
            let mut text = String::new();
            for item in items {
                match item {
                    Object::String(bytes, _) => text.push_str(&decode_pdf_string(bytes)),
                    Object::Integer(_) | Object::Real(_) => {
                        if let Ok(k) = item.as_float() {
                            if k < TJ_SPACE_KERNING && !text.ends_with(' ') {
                                text.push(' ');
                            }
                        }
                    }
                    _ => {}
                }
            }
            Some(text)
        }
        _ => None,
    }
}

/// UTF-16BE (with BOM), then UTF-8, then Latin-1.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&units) {
            return s;
        }
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::segment::segment;
    use lopdf::StringFormat;

    fn int(n: i64) -> Object {
        Object::Integer(n)
    }

    fn lit(s: &str) -> Object {
        Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
    }

    fn real(n: f32) -> Object {
        Object::Real(n)
    }

    fn pdf_with_ops(pages: Vec<Vec<Operation>>) -> Vec<u8> {
        pdf_with_forms(pages, vec![])
    }

    /// Every page shares one `/XObject` resource dictionary holding `forms`.
    fn pdf_with_forms(pages: Vec<Vec<Operation>>, forms: Vec<(&str, Vec<Operation>, Object)>) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let mut page_ids = Vec::new();

        let mut xobjects = Dictionary::new();
        for (name, operations, matrix) in forms {
            let dict = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"XObject".to_vec())),
                ("Subtype", Object::Name(b"Form".to_vec())),
                ("BBox", Object::Array(vec![int(0), int(0), int(612), int(792)])),
                ("Matrix", matrix),
            ]);
            let content = Content { operations };
            let form_id = doc.add_object(Stream::new(dict, content.encode().unwrap()));
            xobjects.set(name, Object::Reference(form_id));
        }
        let resources_id = doc.add_object(Dictionary::from_iter(vec![(
            "XObject",
            Object::Dictionary(xobjects),
        )]));

        for operations in pages {
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                (
                    "MediaBox",
                    Object::Array(vec![int(0), int(0), int(612), int(792)]),
                ),
                ("Contents", Object::Reference(content_id)),
                ("Resources", Object::Reference(resources_id)),
            ]);
            page_ids.push(doc.add_object(page));
        }

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(page_ids.len() as i64)),
            (
                "Kids",
                Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn line_ops(lines: &[&str]) -> Vec<Operation> {
        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), int(12)]),
            Operation::new("Td", vec![int(72), int(720)]),
        ];
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                ops.push(Operation::new("Td", vec![int(0), int(-14)]));
            }
            ops.push(Operation::new("Tj", vec![lit(line)]));
        }
        ops.push(Operation::new("ET", vec![]));
        ops
    }

    #[test]
    fn vertical_moves_become_line_breaks() {
        let pdf = pdf_with_ops(vec![line_ops(&["SUPPLIER: Acme", "Widget A", "Widget B"])]);
        let text = extract_text_layer(&pdf, 5.0).expect("text layer");
        assert_eq!(text.text, "SUPPLIER: Acme\nWidget A\nWidget B");
    }

    #[test]
    fn scaled_text_matrix_keeps_line_breaks() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), int(1)]),
            Operation::new("Tm", vec![int(12), int(0), int(0), int(12), int(72), int(700)]),
            Operation::new("Tj", vec![lit("SUPPLIER: Acme")]),
            Operation::new("Td", vec![int(0), real(-1.2)]),
            Operation::new("Tj", vec![lit("Widget A")]),
            Operation::new("Td", vec![int(0), real(-1.2)]),
            Operation::new("Tj", vec![lit("Widget B")]),
            Operation::new("ET", vec![]),
        ];
        let text = extract_text_layer(&pdf_with_ops(vec![ops]), 5.0).unwrap().text;
        assert_eq!(text, "SUPPLIER: Acme\nWidget A\nWidget B");

        let blocks = segment(&text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].supplier_name, "Acme");
        assert_eq!(blocks[0].lines, vec!["Widget A", "Widget B"]);
    }

    #[test]
    fn ctm_scale_applies_to_line_moves() {
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new("cm", vec![int(10), int(0), int(0), int(10), int(0), int(0)]),
            Operation::new("BT", vec![]),
            Operation::new("Td", vec![real(7.2), int(70)]),
            Operation::new("Tj", vec![lit("Eggs")]),
            Operation::new("Td", vec![int(0), int(-1)]),
            Operation::new("Tj", vec![lit("Milk")]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ];
        let text = extract_text_layer(&pdf_with_ops(vec![ops]), 5.0).unwrap().text;
        assert_eq!(text, "Eggs\nMilk");
    }

    #[test]
    fn small_unscaled_moves_stay_on_one_line() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tm", vec![int(1), int(0), int(0), int(1), int(72), int(700)]),
            Operation::new("Tj", vec![lit("Widget A")]),
            Operation::new("Td", vec![int(150), real(-1.2)]),
            Operation::new("Tj", vec![lit("6.000")]),
            Operation::new("ET", vec![]),
        ];
        let text = extract_text_layer(&pdf_with_ops(vec![ops]), 5.0).unwrap().text;
        assert_eq!(text, "Widget A 6.000");
    }

    #[test]
    fn form_xobject_text_is_walked() {
        let form = vec![
            Operation::new("BT", vec![]),
            Operation::new("Td", vec![int(0), int(0)]),
            Operation::new("Tj", vec![lit("Beef Mince 4.000")]),
            Operation::new("ET", vec![]),
        ];
        let page = vec![
            Operation::new("BT", vec![]),
            Operation::new("Td", vec![int(72), int(720)]),
            Operation::new("Tj", vec![lit("VENDOR: Smith Meats")]),
            Operation::new("ET", vec![]),
            Operation::new("Do", vec![Object::Name(b"Fm1".to_vec())]),
        ];
        let matrix = Object::Array(vec![int(1), int(0), int(0), int(1), int(72), int(700)]);
        let pdf = pdf_with_forms(vec![page], vec![("Fm1", form, matrix)]);
        let text = extract_text_layer(&pdf, 5.0).unwrap().text;
        assert_eq!(text, "VENDOR: Smith Meats\nBeef Mince 4.000");
    }

    #[test]
    fn form_only_page_has_a_text_layer() {
        let form = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tj", vec![lit("Lamb 2.000")]),
            Operation::new("ET", vec![]),
        ];
        let page = vec![Operation::new("Do", vec![Object::Name(b"Fm1".to_vec())])];
        let matrix = Object::Array(vec![int(1), int(0), int(0), int(1), int(0), int(0)]);
        let pdf = pdf_with_forms(vec![page], vec![("Fm1", form, matrix)]);
        assert_eq!(extract_text_layer(&pdf, 5.0).unwrap().text, "Lamb 2.000");
    }

    #[test]
    fn self_referencing_form_terminates() {
        let form = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tj", vec![lit("Loop")]),
            Operation::new("ET", vec![]),
            Operation::new("Do", vec![Object::Name(b"Fm1".to_vec())]),
        ];
        let page = vec![Operation::new("Do", vec![Object::Name(b"Fm1".to_vec())])];
        let matrix = Object::Array(vec![int(1), int(0), int(0), int(1), int(0), int(0)]);
        let pdf = pdf_with_forms(vec![page], vec![("Fm1", form, matrix)]);
        let text = extract_text_layer(&pdf, 5.0).unwrap().text;
        assert_eq!(text.matches("Loop").count(), MAX_FORM_DEPTH);
    }

    #[test]
    fn same_line_runs_are_space_joined() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Td", vec![int(72), int(700)]),
            Operation::new("Tj", vec![lit("Widget A")]),
            Operation::new("Td", vec![int(200), int(1)]),
            Operation::new("Tj", vec![lit("6.000")]),
            Operation::new("ET", vec![]),
        ];
        let pdf = pdf_with_ops(vec![ops]);
        let text = extract_text_layer(&pdf, 5.0).unwrap();
        assert_eq!(text.text, "Widget A 6.000");
    }

    #[test]
    fn pages_are_separated_by_blank_line() {
        let pdf = pdf_with_ops(vec![line_ops(&["Page one"]), line_ops(&["Page two"])]);
        let text = extract_text_layer(&pdf, 5.0).unwrap();
        assert_eq!(text.text, "Page one\n\nPage two");
    }

    #[test]
    fn tj_array_kerning_and_tstar() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("TL", vec![int(14)]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![lit("Beef"), int(-300), lit("Mince")])],
            ),
            Operation::new("T*", vec![]),
            Operation::new("Tj", vec![lit("Lamb")]),
            Operation::new("ET", vec![]),
        ];
        let pdf = pdf_with_ops(vec![ops]);
        assert_eq!(extract_text_layer(&pdf, 5.0).unwrap().text, "Beef Mince\nLamb");
    }

    #[test]
    fn image_only_pdf_has_no_text_layer() {
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new("Q", vec![]),
        ];
        let pdf = pdf_with_ops(vec![ops]);
        assert!(extract_text_layer(&pdf, 5.0).is_none());
    }

    #[test]
    fn garbage_is_absent_not_error() {
        assert!(extract_text_layer(b"%PDF-1.7 this is not a pdf", 5.0).is_none());
        assert!(extract_text_layer(&[], 5.0).is_none());
    }

    #[test]
    fn utf16_strings_decode() {
        let bytes = [0xFE, 0xFF, 0x00, b'H', 0x00, b'i'];
        assert_eq!(decode_pdf_string(&bytes), "Hi");
        assert_eq!(decode_pdf_string(&[b'C', 0xE9]), "Cé");
    }

    #[tokio::test]
    async fn images_skip_the_parser() {
        let doc = RawDocument::new(b"%PDF-looking but declared image".to_vec(), "image/jpeg");
        assert!(extract_text(&doc, 5.0).await.is_none());
    }

    #[tokio::test]
    async fn async_wrapper_returns_text() {
        let pdf = pdf_with_ops(vec![line_ops(&["VENDOR: Fresh Farms", "Eggs 12.000"])]);
        let doc = RawDocument::new(pdf, "application/pdf");
        let text = extract_text(&doc, 5.0).await.unwrap();
        assert!(text.text.contains("Eggs 12.000"));
    }
}
