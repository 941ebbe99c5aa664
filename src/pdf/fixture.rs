//! Synthetic PDF builder for tests.
//!
//! Produces small single-font documents with positioned lines of text, an
//! optional info dictionary and first-page link annotations.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::io;
use std::path::Path;

/// One line of text in points from the bottom-left corner
#[derive(Debug, Clone)]
pub struct TextLine {
    pub size: i64,
    pub x: i64,
    pub y: i64,
    pub text: String,
}

impl TextLine {
    pub fn new(size: i64, x: i64, y: i64, text: &str) -> Self {
        Self {
            size,
            x,
            y,
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct PdfBuilder {
    pages: Vec<Vec<TextLine>>,
    info: Vec<(String, String)>,
    links: Vec<String>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, lines: Vec<TextLine>) -> Self {
        self.pages.push(lines);
        self
    }

    pub fn info(mut self, key: &str, value: &str) -> Self {
        self.info.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a URI link annotation to the first page
    pub fn link(mut self, uri: &str) -> Self {
        self.links.push(uri.to_string());
        self
    }

    pub fn build(self) -> io::Result<Document> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let annots: Vec<Object> = self
            .links
            .iter()
            .map(|uri| {
                doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Link",
                    "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()],
                    "A" => dictionary! {
                        "S" => "URI",
                        "URI" => Object::string_literal(uri.as_str()),
                    },
                })
                .into()
            })
            .collect();

        let mut kids = Vec::new();
        for (index, lines) in self.pages.iter().enumerate() {
            let mut operations = Vec::new();
            for line in lines {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), line.size.into()]));
                operations.push(Operation::new("Td", vec![line.x.into(), line.y.into()]));
                operations.push(Operation::new("Tj", vec![Object::string_literal(line.text.as_str())]));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations }
                .encode()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));

            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            };
            if index == 0 && !annots.is_empty() {
                page.set("Annots", annots.clone());
            }
            kids.push(doc.add_object(page).into());
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        if !self.info.is_empty() {
            let mut info = Dictionary::new();
            for (key, value) in &self.info {
                info.set(key.as_bytes().to_vec(), Object::string_literal(value.as_str()));
            }
            let info_id = doc.add_object(info);
            doc.trailer.set("Info", info_id);
        }

        doc.compress();
        Ok(doc)
    }

    pub fn save(self, path: &Path) -> io::Result<()> {
        let mut doc = self.build()?;
        doc.save(path)?;
        Ok(())
    }
}
