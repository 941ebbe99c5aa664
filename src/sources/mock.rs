//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{Identifier, RawRecord, SearchResult, SearchResultBuilder, SourceType};
use crate::sources::{BibliographySource, SourceCapabilities, SourceError};

/// A canned search response
#[derive(Debug, Clone)]
enum Canned {
    Results(Vec<SearchResult>),
    /// Fail with a network error carrying this message
    Fail(String),
}

/// A mock source that returns predefined responses and records the queries
/// it receives.
#[derive(Debug)]
pub struct MockSource {
    source_type: SourceType,
    search_response: Mutex<Option<Canned>>,
    lookups: Mutex<HashMap<Identifier, SearchResult>>,
    bibtex: Mutex<HashMap<String, String>>,
    queries: Mutex<Vec<String>>,
}

impl MockSource {
    /// Create a new mock source that reports itself as `source_type`.
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            search_response: Mutex::new(None),
            lookups: Mutex::new(HashMap::new()),
            bibtex: Mutex::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Return `results` from every search.
    pub fn with_results(self, results: Vec<SearchResult>) -> Self {
        *self.search_response.lock().unwrap() = Some(Canned::Results(results));
        self
    }

    /// Fail every search.
    pub fn failing(self, message: &str) -> Self {
        *self.search_response.lock().unwrap() = Some(Canned::Fail(message.to_string()));
        self
    }

    /// Resolve `id` to `result` on lookup.
    pub fn with_lookup(self, id: Identifier, result: SearchResult) -> Self {
        self.lookups.lock().unwrap().insert(id, result);
        self
    }

    /// Serve `entry` as the publisher BibTeX for `doi`.
    pub fn with_bibtex(self, doi: &str, entry: &str) -> Self {
        self.bibtex.lock().unwrap().insert(doi.to_lowercase(), entry.to_string());
        self
    }

    /// Queries received so far, in order
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl BibliographySource for MockSource {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn capabilities(&self) -> SourceCapabilities {
        let mut caps = SourceCapabilities::SEARCH;
        match self.source_type {
            SourceType::CrossRef => caps |= SourceCapabilities::DOI_LOOKUP | SourceCapabilities::BIBTEX,
            SourceType::Arxiv => caps |= SourceCapabilities::ARXIV_LOOKUP,
        }
        caps
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SourceError> {
        self.queries.lock().unwrap().push(query.to_string());
        let guard = self.search_response.lock().unwrap();
        match &*guard {
            Some(Canned::Results(results)) => Ok(results.iter().take(limit).cloned().collect()),
            Some(Canned::Fail(message)) => Err(SourceError::Network(message.clone())),
            None => Ok(Vec::new()),
        }
    }

    async fn lookup(&self, id: &Identifier) -> Result<Option<SearchResult>, SourceError> {
        Ok(self.lookups.lock().unwrap().get(id).cloned())
    }

    async fn fetch_bibtex(&self, doi: &str) -> Result<String, SourceError> {
        self.bibtex
            .lock()
            .unwrap()
            .get(&doi.to_lowercase())
            .cloned()
            .ok_or_else(|| SourceError::NotFound(doi.to_string()))
    }
}

/// Helper function to create a mock result for testing.
///
/// `id` is the DOI for Crossref results and the arXiv ID for arXiv results.
pub fn make_result(source: SourceType, title: &str, id: Option<&str>) -> SearchResult {
    let raw = match source {
        SourceType::CrossRef => RawRecord::CrossRef(serde_json::json!({
            "title": [title],
            "DOI": id.unwrap_or_default(),
            "type": "journal-article",
        })),
        SourceType::Arxiv => RawRecord::Arxiv(crate::models::ArxivRecord {
            entry_id: format!("{}v1", id.unwrap_or_default()),
            primary_category: Some("cs.LG".to_string()),
        }),
    };

    let builder = SearchResultBuilder::new(source, title, raw)
        .authors(vec!["Jane Doe".to_string()])
        .year("2020");
    match (source, id) {
        (SourceType::CrossRef, Some(doi)) => builder.doi(doi).build(),
        (SourceType::Arxiv, Some(arxiv_id)) => builder.arxiv_id(arxiv_id).build(),
        (_, None) => builder.build(),
    }
}
