//! Positioned text extraction and reading-order reconstruction.
//!
//! ```text
//! content ops  ->  TextSpan[]  ->  TextLine[]  ->  page text
//!   (per page)     extract_page_spans   group_spans_into_lines   render_page
//! ```
//!
//! Lab reports are mostly tables, so the rendered text keeps column breaks
//! visible as runs of two or more spaces.

use std::cmp::Ordering;

use super::backend::{number, PageId, PdfBackend, PdfValue};
use crate::PdfError;

/// A run of text at a position on the page.
#[derive(Debug, Clone)]
pub struct TextSpan {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub font_size: f32,
}

impl TextSpan {
    fn right(&self) -> f32 {
        self.x + self.width
    }
}

/// Spans sharing (approximately) the same baseline, ordered left to right.
#[derive(Debug, Clone, Default)]
pub struct TextLine {
    pub spans: Vec<TextSpan>,
    pub y: f32,
}

/// Spans whose baselines differ by no more than this belong to one line.
const Y_TOLERANCE: f32 = 2.0;

/// Glyph width as a fraction of the font size when real metrics are unknown.
const APPROX_CHAR_WIDTH_RATIO: f32 = 0.5;

/// Gaps narrower than this (points) join spans without a space.
const MIN_WORD_GAP: f32 = 1.0;

/// Gaps wider than this multiple of the font size are column breaks.
const COLUMN_GAP_FACTOR: f32 = 1.2;

const IDENTITY_MATRIX: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Text state tracked while walking a content stream.
#[derive(Debug, Clone)]
struct TextState {
    font_key: Vec<u8>,
    font_size: f32,
    /// [a, b, c, d, tx, ty]
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    horiz_scale: f32,
    char_spacing: f32,
    word_spacing: f32,
    text_rise: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_key: Vec::new(),
            font_size: 0.0,
            text_matrix: IDENTITY_MATRIX,
            line_matrix: IDENTITY_MATRIX,
            horiz_scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            text_rise: 0.0,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn x(&self) -> f32 {
        self.text_matrix[4]
    }

    fn y(&self) -> f32 {
        self.text_matrix[5] + self.text_rise
    }

    /// Font size scaled by the vertical component of the text matrix.
    fn effective_font_size(&self) -> f32 {
        let scale = (self.text_matrix[1].powi(2) + self.text_matrix[3].powi(2)).sqrt();
        (self.font_size * scale).abs()
    }

    /// Horizontal scale of the text matrix, used to map text-space widths
    /// onto the page.
    fn horizontal_matrix_scale(&self) -> f32 {
        (self.text_matrix[0].powi(2) + self.text_matrix[1].powi(2)).sqrt()
    }

    fn advance_x(&mut self, dx: f32) {
        self.text_matrix[4] += dx * self.text_matrix[0];
        self.text_matrix[5] += dx * self.text_matrix[1];
    }

    fn translate_line(&mut self, tx: f32, ty: f32) {
        let m = self.line_matrix;
        self.line_matrix[4] = m[0] * tx + m[2] * ty + m[4];
        self.line_matrix[5] = m[1] * tx + m[3] * ty + m[5];
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.translate_line(0.0, -self.leading);
    }

    fn glyph_advance(&self) -> f32 {
        self.font_size * APPROX_CHAR_WIDTH_RATIO * self.horiz_scale
    }

    /// Advance past `text` and return the text-space displacement.
    fn advance_past(&mut self, text: &str) -> f32 {
        let dx: f32 = text
            .chars()
            .map(|ch| {
                let extra = if ch == ' ' { self.word_spacing } else { 0.0 };
                self.glyph_advance() + self.char_spacing + extra
            })
            .sum();
        self.advance_x(dx);
        dx
    }

    fn span_width(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.glyph_advance() * self.horizontal_matrix_scale()
    }
}

fn show_string(
    operand: &PdfValue,
    backend: &dyn PdfBackend,
    page_id: PageId,
    state: &mut TextState,
    spans: &mut Vec<TextSpan>,
) {
    let PdfValue::Str(bytes) = operand else {
        return;
    };
    let text = backend.decode_text(page_id, &state.font_key, bytes);
    if text.trim().is_empty() {
        state.advance_past(&text);
        return;
    }
    spans.push(TextSpan {
        x: state.x(),
        y: state.y(),
        width: state.span_width(&text),
        font_size: state.effective_font_size(),
        text: text.clone(),
    });
    state.advance_past(&text);
}

/// `TJ`: strings interleaved with kerning adjustments in thousandths of a
/// text-space unit. Large negative adjustments are word or column gaps, so
/// the array is split into separate spans there.
fn show_array(
    items: &[PdfValue],
    backend: &dyn PdfBackend,
    page_id: PageId,
    state: &mut TextState,
    spans: &mut Vec<TextSpan>,
) {
    let mut buf = String::new();
    let mut start_x = state.x();

    for item in items {
        match item {
            PdfValue::Str(bytes) => {
                let fragment = backend.decode_text(page_id, &state.font_key, bytes);
                if buf.is_empty() {
                    start_x = state.x();
                }
                buf.push_str(&fragment);
                state.advance_past(&fragment);
            }
            other => {
                let Some(adj) = number(other) else { continue };
                let dx = -adj / 1000.0 * state.font_size * state.horiz_scale;
                let column_gap = state.font_size * COLUMN_GAP_FACTOR;
                if dx > column_gap {
                    flush_span(&mut buf, start_x, state, spans);
                } else if dx > state.glyph_advance() * 0.3 && !buf.is_empty() {
                    buf.push(' ');
                }
                state.advance_x(dx);
            }
        }
    }

    flush_span(&mut buf, start_x, state, spans);
}

fn flush_span(buf: &mut String, start_x: f32, state: &TextState, spans: &mut Vec<TextSpan>) {
    let text = buf.trim_end();
    if !text.trim().is_empty() {
        spans.push(TextSpan {
            text: text.to_string(),
            x: start_x,
            y: state.y(),
            width: state.span_width(text),
            font_size: state.effective_font_size(),
        });
    }
    buf.clear();
}

fn set_font(operands: &[PdfValue], state: &mut TextState) {
    let [key, size, ..] = operands else {
        return;
    };
    // Keys missing from the resource dictionary are kept as-is; the decoder
    // falls back to the generic heuristic for them.
    if let PdfValue::Name(key) | PdfValue::Str(key) = key {
        state.font_key = key.clone();
        state.font_size = number(size).unwrap_or(0.0);
    }
}

fn set_matrix(operands: &[PdfValue], state: &mut TextState) {
    let vals: Vec<f32> = operands.iter().take(6).filter_map(number).collect();
    if let &[a, b, c, d, e, f] = vals.as_slice() {
        state.text_matrix = [a, b, c, d, e, f];
        state.line_matrix = state.text_matrix;
    }
}

fn first_number(operands: &[PdfValue]) -> Option<f32> {
    operands.first().and_then(number)
}

fn pair(operands: &[PdfValue]) -> Option<(f32, f32)> {
    match operands {
        [a, b, ..] => Some((number(a).unwrap_or(0.0), number(b).unwrap_or(0.0))),
        _ => None,
    }
}

/// Walk a page's content stream and collect positioned text spans.
pub fn extract_page_spans(
    backend: &dyn PdfBackend,
    page_id: PageId,
) -> Result<Vec<TextSpan>, PdfError> {
    let raw = backend.page_content(page_id)?;
    let ops = backend.decode_content(&raw)?;

    let mut state = TextState::default();
    let mut spans = Vec::new();

    for op in &ops {
        let operands = op.operands.as_slice();
        match op.operator.as_str() {
            "BT" => {
                state.text_matrix = IDENTITY_MATRIX;
                state.line_matrix = IDENTITY_MATRIX;
            }
            "Tf" => set_font(operands, &mut state),
            "Tm" => set_matrix(operands, &mut state),
            "Td" => {
                if let Some((tx, ty)) = pair(operands) {
                    state.translate_line(tx, ty);
                }
            }
            "TD" => {
                if let Some((tx, ty)) = pair(operands) {
                    state.leading = -ty;
                    state.translate_line(tx, ty);
                }
            }
            "T*" => state.next_line(),
            "TL" => {
                if let Some(v) = first_number(operands) {
                    state.leading = v;
                }
            }
            "Tc" => {
                if let Some(v) = first_number(operands) {
                    state.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = first_number(operands) {
                    state.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = first_number(operands) {
                    state.horiz_scale = v / 100.0;
                }
            }
            "Ts" => {
                if let Some(v) = first_number(operands) {
                    state.text_rise = v;
                }
            }
            "Tj" => {
                if let Some(s) = operands.first() {
                    show_string(s, backend, page_id, &mut state, &mut spans);
                }
            }
            "TJ" => {
                if let Some(PdfValue::Array(items)) = operands.first() {
                    show_array(items, backend, page_id, &mut state, &mut spans);
                }
            }
            "'" => {
                state.next_line();
                if let Some(s) = operands.first() {
                    show_string(s, backend, page_id, &mut state, &mut spans);
                }
            }
            "\"" => {
                if let [aw, ac, s, ..] = operands {
                    if let Some(aw) = number(aw) {
                        state.word_spacing = aw;
                    }
                    if let Some(ac) = number(ac) {
                        state.char_spacing = ac;
                    }
                    state.next_line();
                    show_string(s, backend, page_id, &mut state, &mut spans);
                }
            }
            _ => {}
        }
    }

    Ok(spans)
}

fn by_position(a: &TextSpan, b: &TextSpan) -> Ordering {
    b.y.partial_cmp(&a.y)
        .unwrap_or(Ordering::Equal)
        .then(a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
}

/// Cluster spans into lines by baseline (top of page first), each line
/// sorted left to right.
///
/// A span joins the current line when its baseline lies within
/// [`Y_TOLERANCE`] of the line's first baseline.
pub fn group_spans_into_lines(mut spans: Vec<TextSpan>) -> Vec<TextLine> {
    spans.sort_by(by_position);

    let mut lines: Vec<TextLine> = Vec::new();
    for span in spans {
        match lines.last_mut() {
            Some(line) if (line.y - span.y).abs() <= Y_TOLERANCE => line.spans.push(span),
            _ => lines.push(TextLine {
                y: span.y,
                spans: vec![span],
            }),
        }
    }

    for line in &mut lines {
        line.spans
            .sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
    }

    lines
}

/// Render a line as plain text.
///
/// Adjacent spans are concatenated, word gaps become one space and column
/// gaps become at least two spaces (more for wider gaps, capped) so that
/// downstream column splitting sees the table structure.
pub fn render_line(line: &TextLine) -> String {
    let mut out = String::new();
    let mut prev: Option<&TextSpan> = None;

    for span in &line.spans {
        if let Some(p) = prev {
            let gap = span.x - p.right();
            let size = p.font_size.max(span.font_size).max(1.0);
            if gap >= size * COLUMN_GAP_FACTOR {
                let width = ((gap / (size * APPROX_CHAR_WIDTH_RATIO)) as usize).clamp(2, 8);
                out.push_str(&" ".repeat(width));
            } else if gap >= MIN_WORD_GAP && !out.ends_with(' ') && !span.text.starts_with(' ') {
                out.push(' ');
            }
        }
        out.push_str(&span.text);
        prev = Some(span);
    }

    out.trim_end().to_string()
}

/// Render a whole page, one text line per output line.
pub fn render_page(spans: Vec<TextSpan>) -> String {
    group_spans_into_lines(spans)
        .iter()
        .map(render_line)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::super::backend::ContentOp;
    use super::*;

    fn span(text: &str, x: f32, y: f32) -> TextSpan {
        TextSpan {
            text: text.to_string(),
            x,
            y,
            width: text.chars().count() as f32 * 10.0 * APPROX_CHAR_WIDTH_RATIO,
            font_size: 10.0,
        }
    }

    struct MockBackend {
        ops: Vec<ContentOp>,
    }

    impl PdfBackend for MockBackend {
        fn pages(&self) -> BTreeMap<u32, PageId> {
            BTreeMap::from([(1, (1, 0))])
        }

        fn page_content(&self, _page: PageId) -> Result<Vec<u8>, PdfError> {
            Ok(Vec::new())
        }

        fn decode_content(&self, _data: &[u8]) -> Result<Vec<ContentOp>, PdfError> {
            Ok(self.ops.clone())
        }

        fn decode_text(&self, _page: PageId, _font: &[u8], bytes: &[u8]) -> String {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }

    fn op(operator: &str, operands: Vec<PdfValue>) -> ContentOp {
        ContentOp {
            operator: operator.to_string(),
            operands,
        }
    }

    fn tf(size: f32) -> ContentOp {
        op("Tf", vec![PdfValue::Name(b"F1".to_vec()), PdfValue::Real(size)])
    }

    fn td(x: f32, y: f32) -> ContentOp {
        op("Td", vec![PdfValue::Real(x), PdfValue::Real(y)])
    }

    fn tj(text: &str) -> ContentOp {
        op("Tj", vec![PdfValue::Str(text.as_bytes().to_vec())])
    }

    #[test]
    fn test_group_spans_within_tolerance() {
        let lines = group_spans_into_lines(vec![
            span("Glucose", 50.0, 700.0),
            span("6.1", 200.0, 701.5),
        ]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].spans[0].text, "Glucose");
    }

    #[test]
    fn test_group_spans_outside_tolerance() {
        let lines = group_spans_into_lines(vec![
            span("Glucose", 50.0, 700.0),
            span("Sodium", 50.0, 697.5),
        ]);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_group_spans_orders_top_to_bottom_left_to_right() {
        let lines = group_spans_into_lines(vec![
            span("mg/dL", 300.0, 680.0),
            span("Sodium", 50.0, 700.0),
            span("Glucose", 50.0, 680.0),
        ]);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].spans[0].text, "Sodium");
        assert_eq!(lines[1].spans[0].text, "Glucose");
        assert_eq!(lines[1].spans[1].text, "mg/dL");
    }

    #[test]
    fn test_group_spans_empty() {
        assert!(group_spans_into_lines(Vec::new()).is_empty());
    }

    #[test]
    fn test_render_line_marks_column_gaps() {
        let line = TextLine {
            y: 700.0,
            spans: vec![span("Glucose", 50.0, 700.0), span("6.1", 200.0, 700.0)],
        };
        let text = render_line(&line);
        assert!(text.starts_with("Glucose  "), "got {text:?}");
        assert!(text.ends_with("6.1"));
    }

    #[test]
    fn test_render_line_word_gap_single_space() {
        // "Total" is 25pt wide at 10pt; a 3pt gap is a word break.
        let line = TextLine {
            y: 700.0,
            spans: vec![span("Total", 50.0, 700.0), span("Protein", 78.0, 700.0)],
        };
        assert_eq!(render_line(&line), "Total Protein");
    }

    #[test]
    fn test_extract_simple_tj() {
        let backend = MockBackend {
            ops: vec![op("BT", vec![]), tf(10.0), td(72.0, 700.0), tj("Glucose")],
        };
        let spans = extract_page_spans(&backend, (1, 0)).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Glucose");
        assert!((spans[0].x - 72.0).abs() < 0.01);
        assert!((spans[0].y - 700.0).abs() < 0.01);
        assert!((spans[0].font_size - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_extract_tj_array_splits_on_column_kerning() {
        let backend = MockBackend {
            ops: vec![
                op("BT", vec![]),
                tf(10.0),
                td(72.0, 700.0),
                op(
                    "TJ",
                    vec![PdfValue::Array(vec![
                        PdfValue::Str(b"TSH".to_vec()),
                        PdfValue::Integer(-8000),
                        PdfValue::Str(b"2.1".to_vec()),
                    ])],
                ),
            ],
        };
        let spans = extract_page_spans(&backend, (1, 0)).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "TSH");
        assert_eq!(spans[1].text, "2.1");
        assert!(spans[1].x > spans[0].x + 80.0);
    }

    #[test]
    fn test_extract_tl_and_t_star() {
        let backend = MockBackend {
            ops: vec![
                op("BT", vec![]),
                tf(10.0),
                td(72.0, 700.0),
                op("TL", vec![PdfValue::Integer(14)]),
                tj("Sodium"),
                op("T*", vec![]),
                tj("Potassium"),
            ],
        };
        let spans = extract_page_spans(&backend, (1, 0)).unwrap();
        assert_eq!(spans.len(), 2);
        assert!((spans[1].y - 686.0).abs() < 0.01);
    }

    #[test]
    fn test_extract_tm_scales_font_size() {
        let backend = MockBackend {
            ops: vec![
                op("BT", vec![]),
                tf(1.0),
                op(
                    "Tm",
                    vec![
                        PdfValue::Real(9.0),
                        PdfValue::Real(0.0),
                        PdfValue::Real(0.0),
                        PdfValue::Real(9.0),
                        PdfValue::Real(40.0),
                        PdfValue::Real(500.0),
                    ],
                ),
                tj("HDL"),
            ],
        };
        let spans = extract_page_spans(&backend, (1, 0)).unwrap();
        assert!((spans[0].font_size - 9.0).abs() < 0.01);
        assert!((spans[0].x - 40.0).abs() < 0.01);
    }

    #[test]
    fn test_extract_blank_strings_skipped() {
        let backend = MockBackend {
            ops: vec![op("BT", vec![]), tf(10.0), tj("   "), tj("")],
        };
        assert!(extract_page_spans(&backend, (1, 0)).unwrap().is_empty());
    }

    #[test]
    fn test_render_page_from_ops() {
        let backend = MockBackend {
            ops: vec![
                op("BT", vec![]),
                tf(10.0),
                td(72.0, 700.0),
                tj("Glucose"),
                op("ET", vec![]),
                op("BT", vec![]),
                tf(10.0),
                td(300.0, 700.5),
                tj("6.1"),
                op("ET", vec![]),
                op("BT", vec![]),
                tf(10.0),
                td(72.0, 680.0),
                tj("Sodium"),
            ],
        };
        let spans = extract_page_spans(&backend, (1, 0)).unwrap();
        let text = render_page(spans);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Glucose  "));
        assert_eq!(lines[1], "Sodium");
    }
}
