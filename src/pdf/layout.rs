//! Positioned text runs from page content streams, grouped into text boxes.
//!
//! Runs are produced by interpreting the text operators of a page (and of
//! any form XObjects it draws). Consecutive runs on one baseline form a line;
//! consecutive lines of similar size with at most 1.5 line heights between
//! baselines form a box.

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;

use super::cmap::ToUnicode;
use super::resolve;
use crate::models::{BoundingBox, TextBox};
use crate::utils::normalize_box_text;

/// Nesting limit for form XObjects
const MAX_FORM_DEPTH: usize = 4;
/// `TJ` adjustments beyond this (in thousandths of an em) read as a word gap
const TJ_SPACE_THRESHOLD: f32 = 200.0;
/// Glyph width, in em, for fonts without width tables
const DEFAULT_GLYPH_WIDTH: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        let values: Vec<f32> = operands.iter().filter_map(number).collect();
        let values: [f32; 6] = values.try_into().ok()?;
        Some(Matrix(values))
    }

    /// `self × other`, in PDF's row-vector convention
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn vertical_scale(&self) -> f32 {
        self.0[2].hypot(self.0[3])
    }

    fn horizontal_scale(&self) -> f32 {
        self.0[0].hypot(self.0[1])
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Largest character code a width table entry may name
const MAX_CODE: u32 = 0xFFFF;

/// A width table code, or `None` when it lies outside the two-byte code space
fn char_code(value: f32) -> Option<u32> {
    (0.0..=MAX_CODE as f32).contains(&value).then(|| value as u32)
}

/// What is needed from a font to decode and measure shown strings
#[derive(Debug, Default)]
struct Font {
    to_unicode: Option<ToUnicode>,
    two_byte: bool,
    widths: HashMap<u32, f32>,
    default_width: Option<f32>,
}

impl Font {
    fn load(doc: &Document, dict: &Dictionary) -> Font {
        let subtype = dict.get(b"Subtype").and_then(Object::as_name).unwrap_or_default();
        let two_byte = subtype == b"Type0";

        let to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_stream().ok())
            .map(|stream| {
                stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone())
            })
            .map(|data| ToUnicode::parse(&data));

        let mut font = Font {
            to_unicode,
            two_byte,
            ..Font::default()
        };

        if two_byte {
            font.load_cid_widths(doc, dict);
        } else {
            font.load_simple_widths(doc, dict);
        }
        font
    }

    fn load_simple_widths(&mut self, doc: &Document, dict: &Dictionary) {
        let Some(first_char) = char_code(dict.get(b"FirstChar").ok().and_then(number).unwrap_or(0.0)) else {
            return;
        };
        let Some(widths) = dict
            .get(b"Widths")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_array().ok())
        else {
            return;
        };
        for (code, width) in (first_char..=MAX_CODE).zip(widths.iter()) {
            if let Some(w) = resolve(doc, width).and_then(number) {
                self.widths.insert(code, w / 1000.0);
            }
        }
    }

    fn load_cid_widths(&mut self, doc: &Document, dict: &Dictionary) {
        let Some(descendant) = dict
            .get(b"DescendantFonts")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_array().ok())
            .and_then(|fonts| fonts.first())
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok())
        else {
            return;
        };

        self.default_width = Some(descendant.get(b"DW").ok().and_then(number).unwrap_or(1000.0) / 1000.0);

        let Some(w) = descendant
            .get(b"W")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_array().ok())
        else {
            return;
        };

        // Entries are either `c [w1 w2 ...]` or `c_first c_last w`
        let mut i = 0;
        while i < w.len() {
            let Some(first) = number(&w[i]) else { break };
            match w.get(i + 1).and_then(|obj| resolve(doc, obj)) {
                Some(Object::Array(list)) => {
                    if let Some(first) = char_code(first) {
                        for (code, width) in (first..=MAX_CODE).zip(list.iter().filter_map(number)) {
                            self.widths.insert(code, width / 1000.0);
                        }
                    }
                    i += 2;
                }
                Some(last) => {
                    let (Some(last), Some(width)) = (number(last), w.get(i + 2).and_then(number)) else {
                        break;
                    };
                    // Ranges are clamped to the code space; out-of-range starts are skipped
                    if let Some(first) = char_code(first) {
                        for code in first..=last.clamp(0.0, MAX_CODE as f32) as u32 {
                            self.widths.insert(code, width / 1000.0);
                        }
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    fn code_bytes(&self) -> usize {
        match &self.to_unicode {
            Some(cmap) => cmap.code_bytes(),
            None if self.two_byte => 2,
            None => 1,
        }
    }

    /// Text of a shown string and its advance in em
    fn decode(&self, bytes: &[u8]) -> (String, f32) {
        let text = match &self.to_unicode {
            Some(cmap) => cmap.decode(bytes),
            // Without a map, two-byte codes are glyph IDs and cannot be read
            None if self.two_byte => String::new(),
            None => bytes.iter().map(|b| char::from(*b)).collect(),
        };

        let advance = bytes
            .chunks(self.code_bytes())
            .map(|code| {
                let value = code.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
                self.widths
                    .get(&value)
                    .copied()
                    .or(self.default_width)
                    .unwrap_or(DEFAULT_GLYPH_WIDTH)
            })
            .sum();

        (text, advance)
    }
}

/// Font resources by name; inheritance through the page tree is followed
fn load_fonts(doc: &Document, resources: Option<&Dictionary>) -> HashMap<Vec<u8>, Font> {
    let Some(fonts) = resources
        .and_then(|res| res.get(b"Font").ok())
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
    else {
        return HashMap::new();
    };

    fonts
        .iter()
        .filter_map(|(name, obj)| {
            let dict = resolve(doc, obj)?.as_dict().ok()?;
            Some((name.clone(), Font::load(doc, dict)))
        })
        .collect()
}

/// Resources of a page, looked up through its ancestors when not set directly
pub(super) fn page_resources<'a>(doc: &'a Document, page: &'a Dictionary) -> Option<&'a Dictionary> {
    let mut node = page;
    for _ in 0..32 {
        if let Some(res) = node
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok())
        {
            return Some(res);
        }
        node = node
            .get(b"Parent")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok())?;
    }
    None
}

/// A string shown at one position in one font size
#[derive(Debug, Clone, PartialEq)]
struct Run {
    x: f32,
    y: f32,
    width: f32,
    size: f32,
    text: String,
}

#[derive(Debug, Clone)]
struct TextState {
    tm: Matrix,
    tlm: Matrix,
    leading: f32,
    font: Vec<u8>,
    size: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            leading: 0.0,
            font: Vec::new(),
            size: 0.0,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }
}

/// Collects runs from one page
struct Interpreter<'a> {
    doc: &'a Document,
    runs: Vec<Run>,
}

impl<'a> Interpreter<'a> {
    fn new(doc: &'a Document) -> Self {
        Self { doc, runs: Vec::new() }
    }

    fn run(
        &mut self,
        content: &[u8],
        resources: Option<&Dictionary>,
        ctm: Matrix,
        depth: usize,
    ) -> Result<(), lopdf::Error> {
        let content = Content::decode(content)?;
        let fonts = load_fonts(self.doc, resources);
        let fallback_font = Font::default();

        let mut ctm = ctm;
        let mut stack: Vec<Matrix> = Vec::new();
        let mut state = TextState::default();

        for op in &content.operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => stack.push(ctm),
                "Q" => ctm = stack.pop().unwrap_or(ctm),
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        ctm = m.then(&ctm);
                    }
                }
                "BT" => {
                    state.tm = Matrix::IDENTITY;
                    state.tlm = Matrix::IDENTITY;
                }
                "Tf" => {
                    if let (Some(Object::Name(name)), Some(size)) =
                        (operands.first(), operands.get(1).and_then(number))
                    {
                        state.font = name.clone();
                        state.size = size;
                    }
                }
                "TL" => {
                    if let Some(leading) = operands.first().and_then(number) {
                        state.leading = leading;
                    }
                }
                "Td" | "TD" => {
                    if let (Some(tx), Some(ty)) =
                        (operands.first().and_then(number), operands.get(1).and_then(number))
                    {
                        if op.operator == "TD" {
                            state.leading = -ty;
                        }
                        state.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        state.tm = m;
                        state.tlm = m;
                    }
                }
                "T*" => state.next_line(),
                "Tj" | "'" | "\"" => {
                    if op.operator != "Tj" {
                        state.next_line();
                    }
                    if let Some(Object::String(bytes, _)) = operands.last() {
                        let font = fonts.get(&state.font).unwrap_or(&fallback_font);
                        self.show(&mut state, &ctm, font, bytes);
                    }
                }
                "TJ" => {
                    let Some(Object::Array(items)) = operands.first() else {
                        continue;
                    };
                    let font = fonts.get(&state.font).unwrap_or(&fallback_font);
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(&mut state, &ctm, font, bytes),
                            other => {
                                if let Some(adjust) = number(other) {
                                    self.adjust(&mut state, &ctm, adjust);
                                }
                            }
                        }
                    }
                }
                "Do" if depth < MAX_FORM_DEPTH => {
                    if let Some(Object::Name(name)) = operands.first() {
                        self.draw_form(resources, name, &ctm, depth);
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn show(&mut self, state: &mut TextState, ctm: &Matrix, font: &Font, bytes: &[u8]) {
        let (text, advance) = font.decode(bytes);
        let width = advance * state.size;
        let trm = state.tm.then(ctm);

        if !text.is_empty() {
            self.runs.push(Run {
                x: trm.0[4],
                y: trm.0[5],
                width: width * trm.horizontal_scale(),
                size: (state.size * trm.vertical_scale()).abs(),
                text,
            });
        }

        state.tm = Matrix::translate(width, 0.0).then(&state.tm);
    }

    /// Apply a `TJ` position adjustment; wide gaps become a space
    fn adjust(&mut self, state: &mut TextState, ctm: &Matrix, adjust: f32) {
        let shift = -adjust / 1000.0 * state.size;
        if adjust < -TJ_SPACE_THRESHOLD {
            let trm = state.tm.then(ctm);
            self.runs.push(Run {
                x: trm.0[4],
                y: trm.0[5],
                width: shift * trm.horizontal_scale(),
                size: (state.size * trm.vertical_scale()).abs(),
                text: " ".to_string(),
            });
        }
        state.tm = Matrix::translate(shift, 0.0).then(&state.tm);
    }

    fn draw_form(&mut self, resources: Option<&Dictionary>, name: &[u8], ctm: &Matrix, depth: usize) {
        let doc = self.doc;
        let Some(stream) = resources
            .and_then(|res| res.get(b"XObject").ok())
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok())
            .and_then(|xobjects| xobjects.get(name).ok())
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_stream().ok())
        else {
            return;
        };

        if stream.dict.get(b"Subtype").and_then(Object::as_name).ok() != Some(b"Form".as_slice()) {
            return;
        }

        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|obj| obj.as_array().ok())
            .and_then(|values| Matrix::from_operands(values))
            .unwrap_or(Matrix::IDENTITY);

        let form_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok())
            .or(resources);

        let content = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        if let Err(e) = self.run(&content, form_resources, matrix.then(ctm), depth + 1) {
            tracing::debug!("Skipping unreadable form XObject: {}", e);
        }
    }
}

/// Text runs of one page, in content-stream order
fn page_runs(doc: &Document, page: &Dictionary, content: &[u8]) -> Result<Vec<Run>, lopdf::Error> {
    let mut interpreter = Interpreter::new(doc);
    interpreter.run(content, page_resources(doc, page), Matrix::IDENTITY, 0)?;
    Ok(interpreter.runs)
}

#[derive(Debug, Clone)]
struct Line {
    runs: Vec<Run>,
}

impl Line {
    fn baseline(&self) -> f32 {
        self.runs[0].y
    }

    fn size(&self) -> f32 {
        self.runs.iter().map(|r| r.size).fold(0.0, f32::max)
    }

    fn end_x(&self) -> f32 {
        self.runs.last().map_or(0.0, |r| r.x + r.width)
    }

    fn accepts(&self, run: &Run) -> bool {
        let tolerance = 0.3 * self.size().max(run.size);
        (run.y - self.baseline()).abs() <= tolerance && run.x >= self.end_x() - tolerance.max(1.0) * 2.0
    }

    fn text(&self) -> String {
        let mut text = String::new();
        let mut prev_end: Option<f32> = None;
        for run in &self.runs {
            if let Some(end) = prev_end {
                let gap = run.x - end;
                if gap > 0.15 * run.size && !text.ends_with(' ') && !run.text.starts_with(' ') {
                    text.push(' ');
                }
            }
            text.push_str(&run.text);
            prev_end = Some(run.x + run.width);
        }
        text
    }

    /// Size of the second visible glyph; the first may be a drop cap
    fn second_glyph_size(&self) -> f32 {
        self.runs
            .iter()
            .flat_map(|run| run.text.chars().filter(|c| !c.is_whitespace()).map(move |_| run.size))
            .nth(1)
            .or_else(|| self.runs.first().map(|r| r.size))
            .unwrap_or(0.0)
    }

    fn bbox(&self) -> BoundingBox {
        self.runs
            .iter()
            .map(|r| BoundingBox {
                x0: r.x,
                y0: r.y,
                x1: r.x + r.width,
                y1: r.y + r.size,
            })
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default()
    }
}

fn group_lines(runs: Vec<Run>) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    for run in runs {
        match lines.last_mut() {
            Some(line) if line.accepts(&run) => line.runs.push(run),
            _ => {
                // A lone space cannot start a line
                if run.text.trim().is_empty() {
                    continue;
                }
                lines.push(Line { runs: vec![run] });
            }
        }
    }
    lines
}

fn continues_box(prev: &Line, next: &Line) -> bool {
    let (a, b) = (prev.size(), next.size());
    if a <= 0.0 || b <= 0.0 {
        return false;
    }
    let ratio = a / b;
    let gap = prev.baseline() - next.baseline();
    (0.8..=1.25).contains(&ratio) && gap > 0.0 && gap <= 1.5 * a.max(b)
}

fn make_box(page: usize, lines: &[Line]) -> TextBox {
    let raw = lines.iter().map(Line::text).collect::<Vec<_>>().join("\n");
    let words = normalize_box_text(&raw)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let bbox = lines
        .iter()
        .map(Line::bbox)
        .reduce(|a, b| a.union(&b))
        .unwrap_or_default();

    TextBox::new(page, words, lines.len())
        .font_size(lines[0].second_glyph_size())
        .bbox(bbox)
}

fn group_boxes(page: usize, lines: Vec<Line>) -> Vec<TextBox> {
    let mut boxes = Vec::new();
    let mut current: Vec<Line> = Vec::new();

    for line in lines {
        if let Some(prev) = current.last() {
            if !continues_box(prev, &line) {
                boxes.push(make_box(page, &current));
                current.clear();
            }
        }
        current.push(line);
    }
    if !current.is_empty() {
        boxes.push(make_box(page, &current));
    }
    boxes
}

/// Text boxes of one page (1-based `page_number`), in content order
pub(super) fn page_boxes(
    doc: &Document,
    page_number: usize,
    page: &Dictionary,
    content: &[u8],
) -> Result<Vec<TextBox>, lopdf::Error> {
    let runs = page_runs(doc, page, content)?;
    Ok(group_boxes(page_number, group_lines(runs)))
}
