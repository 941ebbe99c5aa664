//! Document metadata gathered before any search is issued.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A normalized bibliographic identifier used for deduplication and ranking
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    /// Lower-cased DOI
    Doi(String),
    /// Lower-cased arXiv ID without version suffix
    Arxiv(String),
}

fn version_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"v\d+$").expect("static regex"))
}

impl Identifier {
    pub fn doi(doi: &str) -> Self {
        let doi = doi.trim().to_lowercase();
        let doi = doi
            .strip_prefix("https://doi.org/")
            .or_else(|| doi.strip_prefix("http://dx.doi.org/"))
            .or_else(|| doi.strip_prefix("doi:"))
            .unwrap_or(&doi);
        Identifier::Doi(doi.to_string())
    }

    pub fn arxiv(id: &str) -> Self {
        let id = id.trim().to_lowercase();
        let id = id.strip_prefix("arxiv:").unwrap_or(&id);
        Identifier::Arxiv(version_suffix().replace(id, "").into_owned())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Doi(doi) => write!(f, "doi:{}", doi),
            Identifier::Arxiv(id) => write!(f, "arXiv:{}", id),
        }
    }
}

/// Metadata recovered from a PDF's info dictionary, text and file name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub arxiv_id: Option<String>,
    pub doi: Option<String>,
}

impl PdfMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author.is_none() && self.arxiv_id.is_none() && self.doi.is_none()
    }

    /// Identifiers that make up the originating query context
    pub fn identifiers(&self) -> Vec<Identifier> {
        let mut ids = Vec::new();
        if let Some(doi) = &self.doi {
            ids.push(Identifier::doi(doi));
        }
        if let Some(id) = &self.arxiv_id {
            ids.push(Identifier::arxiv(id));
        }
        ids
    }

    /// Fill every unset field from `other`
    pub fn or(mut self, other: PdfMetadata) -> Self {
        self.title = self.title.or(other.title);
        self.author = self.author.or(other.author);
        self.arxiv_id = self.arxiv_id.or(other.arxiv_id);
        self.doi = self.doi.or(other.doi);
        self
    }
}

impl fmt::Display for PdfMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        writeln!(f, "Title:    {}", show(&self.title))?;
        writeln!(f, "Author:   {}", show(&self.author))?;
        writeln!(f, "arXiv ID: {}", show(&self.arxiv_id))?;
        write!(f, "DOI:      {}", show(&self.doi))
    }
}
