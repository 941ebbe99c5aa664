//! PDF reading: positioned text boxes, document info and link annotations.
//!
//! [`PdfDocument`] wraps a `lopdf` document. [`parse_pdf`] is the one-call
//! entry point used by the lookup pipeline: it returns the text boxes of the
//! first pages together with the identifiers and info-dictionary fields that
//! form the lookup context.

mod cmap;
pub mod fixture;
mod layout;

use lopdf::{Document, Object};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ParsingConfig;
use crate::models::{PdfMetadata, TextBox};
use crate::utils::{find_arxiv_id, find_arxiv_name, find_doi};

/// Errors that can occur while reading a PDF
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    #[error("Failed to parse PDF {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to decode page content: {0}")]
    Content(String),

    #[error("Failed to extract text from PDF: {0}")]
    Extract(String),
}

/// Follow a reference, if `obj` is one
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, UTF-8 with BOM, else PDFDocEncoding)
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks(2)
            .map(|pair| (u16::from(pair[0]) << 8) | u16::from(pair.get(1).copied().unwrap_or(0)))
            .collect();
        return char::decode_utf16(units).filter_map(Result::ok).collect();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    bytes.iter().map(|b| char::from(*b)).collect()
}

/// Fields of the document information dictionary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    /// Every string value, for identifier scanning
    pub values: Vec<String>,
}

/// An opened PDF
#[derive(Debug)]
pub struct PdfDocument {
    doc: Document,
    path: PathBuf,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self, PdfError> {
        if !path.exists() {
            return Err(PdfError::NotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(PdfError::NotAFile(path.to_path_buf()));
        }

        let doc = Document::load(path).map_err(|e| PdfError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if doc.get_pages().is_empty() {
            return Err(PdfError::Parse {
                path: path.to_path_buf(),
                message: "document has no pages".to_string(),
            });
        }

        tracing::debug!("Opened {} ({} pages)", path.display(), doc.get_pages().len());
        Ok(Self {
            doc,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Text boxes of the first `max_pages` pages, in page and content order.
    ///
    /// Pages whose content cannot be decoded are skipped; it is an error only
    /// when no requested page could be read.
    pub fn text_boxes(&self, max_pages: usize) -> Result<Vec<TextBox>, PdfError> {
        let mut boxes = Vec::new();
        let mut last_error = None;
        let mut pages_read = 0;

        for (number, page_id) in self.doc.get_pages().into_iter().take(max_pages) {
            let result = self.doc.get_page_content(page_id).and_then(|content| {
                let page = self.doc.get_dictionary(page_id)?;
                layout::page_boxes(&self.doc, number as usize, page, &content)
            });

            match result {
                Ok(page_boxes) => {
                    tracing::debug!("Page {}: {} text boxes", number, page_boxes.len());
                    boxes.extend(page_boxes);
                    pages_read += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping page {} of {}: {}", number, self.path.display(), e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if pages_read == 0 => Err(PdfError::Content(e.to_string())),
            _ => Ok(boxes),
        }
    }

    /// The trailer's `Info` dictionary
    pub fn info(&self) -> DocumentInfo {
        let Some(dict) = self
            .doc
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|obj| resolve(&self.doc, obj))
            .and_then(|obj| obj.as_dict().ok())
        else {
            return DocumentInfo::default();
        };

        let text = |key: &[u8]| {
            dict.get(key)
                .ok()
                .and_then(|obj| resolve(&self.doc, obj))
                .and_then(|obj| match obj {
                    Object::String(bytes, _) => Some(decode_text_string(bytes).trim().to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
        };

        let values = dict
            .iter()
            .filter_map(|(_, obj)| match resolve(&self.doc, obj)? {
                Object::String(bytes, _) => Some(decode_text_string(bytes)),
                _ => None,
            })
            .collect();

        DocumentInfo {
            title: text(b"Title"),
            author: text(b"Author"),
            values,
        }
    }

    /// URIs of the link annotations on the first page
    pub fn link_uris(&self) -> Vec<String> {
        let doc = &self.doc;
        let Some((_, first_page)) = doc.get_pages().into_iter().next() else {
            return Vec::new();
        };

        let annots = doc
            .get_dictionary(first_page)
            .ok()
            .and_then(|page| page.get(b"Annots").ok())
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_array().ok());

        annots
            .into_iter()
            .flatten()
            .filter_map(|annot| {
                let action = resolve(doc, annot)?.as_dict().ok()?.get(b"A").ok()?;
                let uri = resolve(doc, action)?.as_dict().ok()?.get(b"URI").ok()?;
                match resolve(doc, uri)? {
                    Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
                    _ => None,
                }
            })
            .collect()
    }
}

/// Text boxes and lookup context of a PDF
#[derive(Debug, Clone)]
pub struct ParsedPdf {
    pub boxes: Vec<TextBox>,
    pub metadata: PdfMetadata,
}

/// Open `path` and gather everything the lookup needs from it.
///
/// Identifier precedence: the DOI comes from the info dictionary, then page
/// text, then the file name; the arXiv ID from page text, then the file
/// name, then link annotations and the info dictionary.
pub fn parse_pdf(path: &Path, parsing: &ParsingConfig) -> Result<ParsedPdf, PdfError> {
    let document = PdfDocument::open(path)?;
    let boxes = document.text_boxes(parsing.max_pages)?;
    let info = document.info();
    let uris = document.link_uris();

    let box_texts: Vec<String> = boxes.iter().map(TextBox::text).collect();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let from_info = PdfMetadata {
        title: info.title.clone(),
        author: info.author.clone(),
        doi: info.values.iter().find_map(|v| find_doi(v)),
        arxiv_id: uris
            .iter()
            .find_map(|u| find_arxiv_name(u))
            .or_else(|| info.values.iter().find_map(|v| find_arxiv_id(v))),
    };
    let from_text = PdfMetadata {
        doi: box_texts.iter().find_map(|t| find_doi(t)),
        arxiv_id: box_texts.iter().find_map(|t| find_arxiv_id(t)),
        ..PdfMetadata::default()
    };
    let from_name = PdfMetadata {
        doi: find_doi(&stem),
        arxiv_id: find_arxiv_name(&stem),
        ..PdfMetadata::default()
    };

    let metadata = PdfMetadata {
        title: from_info.title,
        author: from_info.author,
        doi: from_info.doi.or(from_text.doi).or(from_name.doi),
        arxiv_id: from_text.arxiv_id.or(from_name.arxiv_id).or(from_info.arxiv_id),
    };

    tracing::info!(
        "Parsed {}: {} text boxes, doi={:?}, arxiv={:?}",
        path.display(),
        boxes.len(),
        metadata.doi,
        metadata.arxiv_id
    );

    Ok(ParsedPdf { boxes, metadata })
}

/// First `n` non-empty lines of the document's text
pub fn first_lines(path: &Path, n: usize) -> Result<Vec<String>, PdfError> {
    let text = pdf_extract::extract_text(path).map_err(|e| PdfError::Extract(e.to_string()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(n)
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::fixture::{PdfBuilder, TextLine};
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_decode_text_string() {
        assert_eq!(decode_text_string(b"Plain"), "Plain");
        assert_eq!(decode_text_string(&[0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69]), "Hi");
        assert_eq!(decode_text_string(&[0xEF, 0xBB, 0xBF, b'o', b'k']), "ok");
    }

    #[test]
    fn test_open_missing_and_directory() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            PdfDocument::open(&dir.path().join("missing.pdf")),
            Err(PdfError::NotFound(_))
        ));
        assert!(matches!(PdfDocument::open(dir.path()), Err(PdfError::NotAFile(_))));
    }

    #[test]
    fn test_open_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();
        assert!(matches!(PdfDocument::open(&path), Err(PdfError::Parse { .. })));
    }

    #[test]
    fn test_text_boxes_from_generated_pdf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        PdfBuilder::new()
            .page(vec![
                TextLine::new(24, 72, 720, "Deep Learning for NLP"),
                TextLine::new(12, 72, 680, "Jane Doe and John Smith"),
                TextLine::new(10, 72, 600, "Abstract body text"),
            ])
            .page(vec![TextLine::new(10, 72, 720, "Second page")])
            .page(vec![TextLine::new(10, 72, 720, "Third page")])
            .save(&path)
            .unwrap();

        let document = PdfDocument::open(&path).unwrap();
        assert_eq!(document.page_count(), 3);

        let boxes = document.text_boxes(2).unwrap();
        let texts: Vec<String> = boxes.iter().map(TextBox::text).collect();
        assert_eq!(
            texts,
            vec!["Deep Learning for NLP", "Jane Doe and John Smith", "Abstract body text", "Second page"]
        );
        assert_eq!(boxes[0].font_size, 24.0);
        assert_eq!(boxes[0].page, 1);
        assert_eq!(boxes[3].page, 2);
    }

    #[test]
    fn test_parse_pdf_collects_identifiers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2301.12345v1.pdf");
        PdfBuilder::new()
            .page(vec![
                TextLine::new(20, 72, 720, "A Study of Things"),
                TextLine::new(9, 20, 300, "arXiv:1706.03762v5 [cs.CL] 6 Dec 2017"),
            ])
            .info("Title", "Info Title")
            .info("Subject", "doi:10.1000/xyz123")
            .link("https://arxiv.org/abs/2001.00001")
            .save(&path)
            .unwrap();

        let parsed = parse_pdf(&path, &ParsingConfig::default()).unwrap();
        assert_eq!(parsed.metadata.title.as_deref(), Some("Info Title"));
        assert_eq!(parsed.metadata.doi.as_deref(), Some("10.1000/xyz123"));
        // Page text wins over the file name and the link annotation
        assert_eq!(parsed.metadata.arxiv_id.as_deref(), Some("1706.03762"));

        let document = PdfDocument::open(&path).unwrap();
        assert_eq!(document.link_uris(), vec!["https://arxiv.org/abs/2001.00001"]);
    }

    #[test]
    fn test_parse_pdf_falls_back_to_file_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2301.12345v1.pdf");
        PdfBuilder::new()
            .page(vec![TextLine::new(20, 72, 720, "A Study of Things")])
            .save(&path)
            .unwrap();

        let parsed = parse_pdf(&path, &ParsingConfig::default()).unwrap();
        assert_eq!(parsed.metadata.arxiv_id.as_deref(), Some("2301.12345"));
        assert!(parsed.metadata.doi.is_none());
        assert!(parsed.metadata.title.is_none());
    }
}
