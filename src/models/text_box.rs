//! Positioned text extracted from a PDF page.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in PDF user space (origin bottom-left)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// A contiguous run of text lines treated as one unit for filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    /// 1-based page number
    pub page: usize,
    pub bbox: BoundingBox,
    pub words: Vec<String>,
    pub line_count: usize,
    /// Font size of the box's second glyph run (first one may be a drop cap)
    pub font_size: f32,
}

impl TextBox {
    pub fn new(page: usize, words: Vec<String>, line_count: usize) -> Self {
        Self {
            page,
            bbox: BoundingBox::default(),
            words,
            line_count,
            font_size: 0.0,
        }
    }

    pub fn font_size(mut self, size: f32) -> Self {
        self.font_size = size;
        self
    }

    pub fn bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Words joined by single spaces
    pub fn text(&self) -> String {
        self.words.join(" ")
    }
}

/// A text-box-derived query string, bounded by `max_chars`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuery {
    pub text: String,
    pub page: usize,
    pub font_size: f32,
}
