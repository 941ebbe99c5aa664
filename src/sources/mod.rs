//! Bibliography sources behind a single capability interface.
//!
//! The dispatcher and merger only see [`BibliographySource`]. Two adapters
//! implement it: [`CrossRefSource`] and [`ArxivSource`]. Every source must
//! support free-text `search`; identifier lookup and BibTeX retrieval are
//! optional and advertised through [`SourceCapabilities`].

mod arxiv;
mod crossref;
pub mod mock;

pub use arxiv::ArxivSource;
pub use crossref::CrossRefSource;
pub use mock::MockSource;

use async_trait::async_trait;

use crate::models::{Identifier, SearchResult, SourceType};

bitflags::bitflags! {
    /// Capabilities that a source can support
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const SEARCH = 1 << 0;
        const DOI_LOOKUP = 1 << 1;
        const ARXIV_LOOKUP = 1 << 2;
        const BIBTEX = 1 << 3;
    }
}

/// A bibliographic database that can be searched for records
#[async_trait]
pub trait BibliographySource: Send + Sync + std::fmt::Debug {
    /// Which service this is; drives ranking precedence
    fn source_type(&self) -> SourceType;

    /// Human-readable name of this source
    fn name(&self) -> &str {
        self.source_type().name()
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
    }

    /// Whether this source can resolve the given identifier
    fn supports_lookup(&self, id: &Identifier) -> bool {
        match id {
            Identifier::Doi(_) => self.capabilities().contains(SourceCapabilities::DOI_LOOKUP),
            Identifier::Arxiv(_) => self.capabilities().contains(SourceCapabilities::ARXIV_LOOKUP),
        }
    }

    /// Search for records matching `query`, returning at most `limit` results
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SourceError>;

    /// Resolve a DOI or arXiv ID to a single record
    async fn lookup(&self, _id: &Identifier) -> Result<Option<SearchResult>, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Fetch a publisher-provided BibTeX entry for a DOI
    async fn fetch_bibtex(&self, _doi: &str) -> Result<String, SourceError> {
        Err(SourceError::NotImplemented)
    }
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The requested operation is not implemented for this source
    #[error("Operation not implemented for this source")]
    NotImplemented,

    /// Network or HTTP transport error
    #[error("Network error: {0}")]
    Network(String),

    /// Parsing error (XML, JSON)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success status from the service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

/// Map a non-success HTTP status to a SourceError
pub(crate) fn status_error(service: &str, status: reqwest::StatusCode) -> SourceError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        SourceError::RateLimit
    } else if status == reqwest::StatusCode::NOT_FOUND {
        SourceError::NotFound(format!("{} returned 404", service))
    } else {
        SourceError::Api {
            status: status.as_u16(),
            message: format!("{} API returned status: {}", service, status),
        }
    }
}
