//! arXiv source implementation.

use async_trait::async_trait;
use chrono::Datelike;
use feed_rs::parser;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use crate::models::{ArxivRecord, Identifier, RawRecord, SearchResult, SearchResultBuilder, SourceType};
use crate::sources::{status_error, BibliographySource, SourceCapabilities, SourceError};
use crate::utils::{clean_string_for_query, default_user_agent, with_retry, HttpClient, RetryConfig};

/// Base URL for arXiv API
const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// arXiv source
///
/// Supports:
/// - Search by query
/// - Lookup by arXiv ID
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: HttpClient,
    api_url: String,
    retry: RetryConfig,
}

/// `.../abs/<id>` or `arxiv:<id>`, matched without changing byte offsets
fn id_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:.*?/abs/|arxiv:)(.*)$").expect("static regex"))
}

impl ArxivSource {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: HttpClient::with_user_agent(&default_user_agent(None), timeout)?,
            api_url: ARXIV_API_URL.to_string(),
            retry: RetryConfig::default(),
        })
    }

    /// Point the source at another endpoint (for testing)
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Parse an arXiv ID from various formats
    ///
    /// Handles formats like:
    /// - "2301.12345"
    /// - "2301.12345v1"
    /// - "arxiv:2301.12345"
    /// - "http://arxiv.org/abs/2301.12345v1"
    /// - "http://arxiv.org/abs/math.GT/0104020v1"
    ///
    /// Returns the versioned form as given; see [`Identifier::arxiv`] for the
    /// normalized one.
    pub fn parse_id(id: &str) -> Result<String, SourceError> {
        let id = id.trim();
        let id = match id_prefix_re().captures(id) {
            Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
            None => id,
        };

        if id.is_empty() {
            return Err(SourceError::Parse("Empty arXiv ID".to_string()));
        }

        Ok(id.to_string())
    }

    fn search_query(query: &str) -> String {
        let words = clean_string_for_query(query)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        format!("all:{}", words)
    }

    /// Parse arXiv Atom feed entry into a SearchResult
    ///
    /// Error entries (which carry an `api/errors` id) yield `None`.
    fn parse_entry(entry: &feed_rs::model::Entry) -> Option<SearchResult> {
        if !entry.id.contains("/abs/") {
            return None;
        }
        let entry_id = Self::parse_id(&entry.id).ok()?;

        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();

        let authors = entry.authors.iter().map(|a| a.name.trim().to_string()).collect();

        // The journal DOI is published as a link titled "doi"
        let doi = entry
            .links
            .iter()
            .find(|link| link.title.as_deref() == Some("doi"))
            .map(|link| Identifier::doi(&link.href))
            .and_then(|id| match id {
                Identifier::Doi(doi) => Some(doi),
                Identifier::Arxiv(_) => None,
            });

        let primary_category = entry.categories.first().map(|c| c.term.clone());

        let Identifier::Arxiv(short_id) = Identifier::arxiv(&entry_id) else {
            return None;
        };

        let record = ArxivRecord {
            entry_id: entry_id.clone(),
            primary_category,
        };

        let mut builder = SearchResultBuilder::new(SourceType::Arxiv, title, RawRecord::Arxiv(record))
            .authors(authors)
            .arxiv_id(short_id)
            .url(entry.id.clone())
            .doi(doi.unwrap_or_default());

        if let Some(published) = entry.published {
            builder = builder.year(published.year().to_string());
        }

        Some(builder.build())
    }

    async fn fetch_feed(&self, url: String) -> Result<feed_rs::model::Feed, SourceError> {
        let client = self.client.clone();

        with_retry(self.retry, || {
            let client = client.clone();
            let url = url.clone();
            async move {
                tracing::debug!("GET {}", url);
                let response = client
                    .client()
                    .get(&url)
                    .header("Accept", "application/atom+xml")
                    .send()
                    .await
                    .map_err(|e| SourceError::Network(format!("Failed to fetch arXiv results: {}", e)))?;

                if !response.status().is_success() {
                    return Err(status_error("arXiv", response.status()));
                }

                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| SourceError::Network(format!("Failed to read response: {}", e)))?;

                parser::parse(bytes.as_ref())
                    .map_err(|e| SourceError::Parse(format!("Failed to parse Atom feed: {}", e)))
            }
        })
        .await
    }
}

#[async_trait]
impl BibliographySource for ArxivSource {
    fn source_type(&self) -> SourceType {
        SourceType::Arxiv
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::ARXIV_LOOKUP
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SourceError> {
        let url = format!(
            "{}?search_query={}&start=0&max_results={}",
            self.api_url,
            urlencoding::encode(&Self::search_query(query)),
            limit
        );

        let feed = self.fetch_feed(url).await?;
        let results: Vec<SearchResult> = feed
            .entries
            .iter()
            .filter_map(Self::parse_entry)
            .take(limit)
            .collect();

        tracing::debug!("arXiv returned {} results for {:?}", results.len(), query);
        Ok(results)
    }

    async fn lookup(&self, id: &Identifier) -> Result<Option<SearchResult>, SourceError> {
        let Identifier::Arxiv(arxiv_id) = id else {
            return Ok(None);
        };

        let url = format!(
            "{}?id_list={}&max_results=1",
            self.api_url,
            urlencoding::encode(arxiv_id)
        );

        let feed = self.fetch_feed(url).await?;
        Ok(feed.entries.iter().find_map(Self::parse_entry))
    }
}
