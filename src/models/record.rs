//! Search result model shared by every bibliography source.

use serde::{Deserialize, Serialize};

use super::Identifier;

/// The bibliographic database a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    CrossRef,
    Arxiv,
}

impl SourceType {
    /// Returns the display name of the source
    pub fn name(&self) -> &'static str {
        match self {
            SourceType::CrossRef => "Crossref",
            SourceType::Arxiv => "arXiv",
        }
    }

    /// Returns the source identifier
    pub fn id(&self) -> &'static str {
        match self {
            SourceType::CrossRef => "crossref",
            SourceType::Arxiv => "arxiv",
        }
    }

    /// Ranking precedence; lower sorts first
    pub fn priority(&self) -> u8 {
        match self {
            SourceType::CrossRef => 0,
            SourceType::Arxiv => 1,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a result was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Direct lookup of a DOI or arXiv ID found in the document
    IdentifierLookup,
    /// Free-text search; the value is the index of the query in the query plan
    Query(usize),
}

/// arXiv-specific fields kept for BibTeX conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArxivRecord {
    /// Versioned identifier, e.g. `2301.12345v2`
    pub entry_id: String,
    pub primary_category: Option<String>,
}

/// The source's own representation of the record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RawRecord {
    /// A Crossref `works` item, as returned by the REST API
    CrossRef(serde_json::Value),
    Arxiv(ArxivRecord),
}

/// A single search result from any source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub source: SourceType,

    pub title: String,

    /// Author names in "Given Family" order
    pub authors: Vec<String>,

    pub year: Option<String>,

    /// Digital Object Identifier
    pub doi: Option<String>,

    /// arXiv identifier without version suffix
    pub arxiv_id: Option<String>,

    pub publisher: Option<String>,

    /// Landing page URL
    pub url: Option<String>,

    pub origin: Origin,

    pub raw: RawRecord,
}

impl SearchResult {
    /// Authors joined the way BibTeX expects them
    pub fn author_string(&self) -> String {
        self.authors.join(" and ")
    }

    /// DOI if present, otherwise the arXiv ID
    pub fn identifier(&self) -> Option<Identifier> {
        if let Some(doi) = self.doi.as_deref().filter(|d| !d.trim().is_empty()) {
            return Some(Identifier::doi(doi));
        }
        self.arxiv_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .map(Identifier::arxiv)
    }

    /// Primary category for arXiv results
    pub fn category(&self) -> Option<&str> {
        match &self.raw {
            RawRecord::Arxiv(record) => record.primary_category.as_deref(),
            RawRecord::CrossRef(_) => None,
        }
    }
}

/// Builder for constructing SearchResult objects
#[derive(Debug, Clone)]
pub struct SearchResultBuilder {
    result: SearchResult,
}

impl SearchResultBuilder {
    /// Create a new builder with required fields
    pub fn new(source: SourceType, title: impl Into<String>, raw: RawRecord) -> Self {
        Self {
            result: SearchResult {
                source,
                title: title.into(),
                authors: Vec::new(),
                year: None,
                doi: None,
                arxiv_id: None,
                publisher: None,
                url: None,
                origin: Origin::Query(0),
                raw,
            },
        }
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.result.authors = authors;
        self
    }

    pub fn year(mut self, year: impl Into<String>) -> Self {
        self.result.year = Some(year.into());
        self
    }

    /// Set DOI; blank values are ignored
    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        let doi = doi.into();
        if !doi.trim().is_empty() {
            self.result.doi = Some(doi.trim().to_string());
        }
        self
    }

    pub fn arxiv_id(mut self, id: impl Into<String>) -> Self {
        self.result.arxiv_id = Some(id.into());
        self
    }

    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        let publisher = publisher.into();
        if !publisher.is_empty() {
            self.result.publisher = Some(publisher);
        }
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.result.url = Some(url.into());
        self
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.result.origin = origin;
        self
    }

    /// Build the SearchResult
    pub fn build(self) -> SearchResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crossref(title: &str) -> SearchResultBuilder {
        SearchResultBuilder::new(
            SourceType::CrossRef,
            title,
            RawRecord::CrossRef(serde_json::json!({})),
        )
    }

    #[test]
    fn test_builder_and_author_string() {
        let result = crossref("Deep Learning for NLP")
            .authors(vec!["Jane Doe".to_string(), "John Smith".to_string()])
            .year("2020")
            .doi("10.1/abc")
            .build();

        assert_eq!(result.author_string(), "Jane Doe and John Smith");
        assert_eq!(result.year.as_deref(), Some("2020"));
        assert_eq!(result.identifier(), Some(Identifier::Doi("10.1/abc".to_string())));
    }

    #[test]
    fn test_blank_doi_is_ignored() {
        let result = crossref("Untitled").doi("  ").build();
        assert!(result.doi.is_none());
        assert!(result.identifier().is_none());
    }

    #[test]
    fn test_identifier_prefers_doi_over_arxiv() {
        let record = ArxivRecord {
            entry_id: "2301.12345v1".to_string(),
            primary_category: Some("cs.LG".to_string()),
        };
        let with_doi = SearchResultBuilder::new(SourceType::Arxiv, "T", RawRecord::Arxiv(record.clone()))
            .arxiv_id("2301.12345")
            .doi("10.1/ABC")
            .build();
        assert_eq!(with_doi.identifier(), Some(Identifier::Doi("10.1/abc".to_string())));

        let without_doi = SearchResultBuilder::new(SourceType::Arxiv, "T", RawRecord::Arxiv(record))
            .arxiv_id("2301.12345")
            .build();
        assert_eq!(
            without_doi.identifier(),
            Some(Identifier::Arxiv("2301.12345".to_string()))
        );
        assert_eq!(without_doi.category(), Some("cs.LG"));
    }

    #[test]
    fn test_source_priority() {
        assert!(SourceType::CrossRef.priority() < SourceType::Arxiv.priority());
        assert_eq!(SourceType::Arxiv.to_string(), "arXiv");
    }
}
