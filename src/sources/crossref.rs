//! Crossref source implementation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::models::{Identifier, RawRecord, SearchResult, SearchResultBuilder, SourceType};
use crate::sources::{status_error, BibliographySource, SourceCapabilities, SourceError};
use crate::utils::{default_user_agent, with_retry, HttpClient, RetryConfig};

const CROSSREF_API_BASE: &str = "https://api.crossref.org";
const DOI_RESOLVER_BASE: &str = "https://doi.org";

/// Crossref source
///
/// Uses the Crossref REST API for bibliographic search and DOI lookup, and DOI
/// content negotiation for publisher BibTeX. Requests carry the polite pool
/// email, when configured, both as `mailto` and in the User-Agent.
#[derive(Debug, Clone)]
pub struct CrossRefSource {
    client: HttpClient,
    api_base: String,
    doi_base: String,
    mailto: Option<String>,
    retry: RetryConfig,
}

impl CrossRefSource {
    pub fn new(mailto: Option<&str>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: HttpClient::with_user_agent(&default_user_agent(mailto), timeout)?,
            api_base: CROSSREF_API_BASE.to_string(),
            doi_base: DOI_RESOLVER_BASE.to_string(),
            mailto: mailto.map(str::to_string),
            retry: RetryConfig::default(),
        })
    }

    /// Point the source at other hosts (for testing)
    pub fn with_base_urls(mut self, api_base: &str, doi_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.doi_base = doi_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn search_url(&self, query: &str, limit: usize) -> String {
        let mut url = format!(
            "{}/works?query.bibliographic={}&rows={}",
            self.api_base,
            urlencoding::encode(query),
            limit
        );
        if let Some(email) = &self.mailto {
            url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
        }
        url
    }

    fn doi_path(doi: &str) -> String {
        urlencoding::encode(doi).replace("%2F", "/")
    }

    async fn get_json(&self, url: String) -> Result<Value, SourceError> {
        let client = self.client.clone();
        let response = with_retry(self.retry, || {
            let client = client.clone();
            let url = url.clone();
            async move {
                tracing::debug!("GET {}", url);
                let response = client.client().get(&url).send().await.map_err(|e| {
                    SourceError::Network(format!("Failed to query Crossref: {}", e))
                })?;

                if !response.status().is_success() {
                    return Err(status_error("Crossref", response.status()));
                }

                Ok(response)
            }
        })
        .await?;

        response
            .json::<Value>()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse JSON: {}", e)))
    }

    /// Convert a Crossref `works` item into a SearchResult
    pub fn parse_item(item: Value) -> Option<SearchResult> {
        let fields = CRItem::deserialize(&item).ok()?;

        let title = fields
            .title
            .into_iter()
            .next()
            .map(|t| collapse_whitespace(&t))
            .unwrap_or_default();
        if title.is_empty() {
            return None;
        }

        let authors = fields
            .author
            .iter()
            .map(CRAuthor::display_name)
            .filter(|name| !name.is_empty())
            .collect();

        let mut builder = SearchResultBuilder::new(SourceType::CrossRef, title, RawRecord::CrossRef(item.clone()))
            .authors(authors)
            .doi(fields.doi.unwrap_or_default())
            .publisher(fields.publisher.unwrap_or_default());

        if let Some(year) = crossref_year(&item) {
            builder = builder.year(year.to_string());
        }
        if let Some(url) = fields.url {
            builder = builder.url(url);
        }

        Some(builder.build())
    }
}

#[async_trait]
impl BibliographySource for CrossRefSource {
    fn source_type(&self) -> SourceType {
        SourceType::CrossRef
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::DOI_LOOKUP | SourceCapabilities::BIBTEX
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SourceError> {
        let data: CRResponse<CRList> = serde_json::from_value(self.get_json(self.search_url(query, limit)).await?)?;

        let results: Vec<SearchResult> = data
            .message
            .items
            .into_iter()
            .filter_map(Self::parse_item)
            .take(limit)
            .collect();

        tracing::debug!("Crossref returned {} results for {:?}", results.len(), query);
        Ok(results)
    }

    async fn lookup(&self, id: &Identifier) -> Result<Option<SearchResult>, SourceError> {
        let Identifier::Doi(doi) = id else {
            return Ok(None);
        };

        let url = format!("{}/works/{}", self.api_base, Self::doi_path(doi));
        let data: CRResponse<Value> = match self.get_json(url).await {
            Ok(value) => serde_json::from_value(value)?,
            Err(SourceError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Self::parse_item(data.message))
    }

    async fn fetch_bibtex(&self, doi: &str) -> Result<String, SourceError> {
        let url = format!("{}/{}", self.doi_base, Self::doi_path(doi));
        let client = self.client.clone();

        let response = with_retry(self.retry, || {
            let client = client.clone();
            let url = url.clone();
            async move {
                let response = client
                    .client()
                    .get(&url)
                    .header("Accept", "application/x-bibtex")
                    .send()
                    .await
                    .map_err(|e| SourceError::Network(format!("Failed to fetch BibTeX: {}", e)))?;

                if !response.status().is_success() {
                    return Err(status_error("DOI resolver", response.status()));
                }

                Ok(response)
            }
        })
        .await?;

        let text = response
            .text()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to read response: {}", e)))?;

        if !text.trim_start().starts_with('@') {
            return Err(SourceError::Parse("Response is not a BibTeX entry".to_string()));
        }
        Ok(text)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Publication year from the first populated date field
fn crossref_year(item: &Value) -> Option<i64> {
    ["issued", "published-print", "published-online", "published", "created"]
        .iter()
        .find_map(|key| item.get(key)?.get("date-parts")?.get(0)?.get(0)?.as_i64())
}

// ===== Crossref API Types =====

#[derive(Debug, Deserialize)]
struct CRResponse<T> {
    message: T,
}

#[derive(Debug, Deserialize)]
struct CRList {
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

impl CRAuthor {
    fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.given.as_deref(), self.family.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            self.name.clone().unwrap_or_default()
        } else {
            parts.join(" ")
        }
    }
}

#[derive(Debug, Deserialize)]
struct CRItem {
    #[serde(default)]
    title: Vec<String>,
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(default)]
    author: Vec<CRAuthor>,
    publisher: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_item() -> Value {
        json!({
            "DOI": "10.1/abc",
            "URL": "https://doi.org/10.1/abc",
            "title": ["Deep   Learning for NLP"],
            "author": [
                {"given": "Jane", "family": "Doe"},
                {"family": "Smith"},
                {"name": "The Consortium"}
            ],
            "publisher": "ACM",
            "type": "journal-article",
            "issued": {"date-parts": [[2020, 5]]}
        })
    }

    fn source(server: &mockito::Server) -> CrossRefSource {
        CrossRefSource::new(Some("someone@example.org"), Duration::from_secs(5))
            .unwrap()
            .with_base_urls(&server.url(), &server.url())
    }

    #[test]
    fn test_parse_item() {
        let result = CrossRefSource::parse_item(sample_item()).unwrap();
        assert_eq!(result.source, SourceType::CrossRef);
        assert_eq!(result.title, "Deep Learning for NLP");
        assert_eq!(result.authors, vec!["Jane Doe", "Smith", "The Consortium"]);
        assert_eq!(result.year.as_deref(), Some("2020"));
        assert_eq!(result.doi.as_deref(), Some("10.1/abc"));
        assert_eq!(result.publisher.as_deref(), Some("ACM"));
        assert!(matches!(result.raw, RawRecord::CrossRef(ref v) if v["type"] == "journal-article"));
    }

    #[test]
    fn test_parse_item_without_title_is_skipped() {
        assert!(CrossRefSource::parse_item(json!({"DOI": "10.1/x"})).is_none());
    }

    #[test]
    fn test_search_url_includes_mailto() {
        let source = CrossRefSource::new(Some("a@b.org"), Duration::from_secs(5)).unwrap();
        let url = source.search_url("deep learning", 5);
        assert!(url.contains("query.bibliographic=deep%20learning"));
        assert!(url.contains("rows=5"));
        assert!(url.contains("mailto=a%40b.org"));
    }

    #[tokio::test]
    async fn test_search_with_mock_http() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({"status": "ok", "message": {"total-results": 2, "items": [sample_item(), {"title": []}]}});
        let mock = server
            .mock("GET", "/works")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("query.bibliographic".into(), "deep learning".into()),
                mockito::Matcher::UrlEncoded("rows".into(), "3".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let results = source(&server).search("deep learning", 3).await.unwrap();
        mock.assert_async().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Deep Learning for NLP");
    }

    #[tokio::test]
    async fn test_search_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let err = source(&server).search("anything", 3).await.unwrap_err();
        assert!(matches!(err, SourceError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_lookup_by_doi() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({"status": "ok", "message": sample_item()});
        let _mock = server
            .mock("GET", "/works/10.1/abc")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let result = source(&server)
            .lookup(&Identifier::doi("10.1/abc"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.doi.as_deref(), Some("10.1/abc"));
    }

    #[tokio::test]
    async fn test_lookup_missing_doi_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let result = source(&server).lookup(&Identifier::doi("10.1/missing")).await.unwrap();
        assert!(result.is_none());
        let arxiv = source(&server).lookup(&Identifier::arxiv("2301.12345")).await.unwrap();
        assert!(arxiv.is_none());
    }

    #[tokio::test]
    async fn test_fetch_bibtex() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/10.1/abc")
            .match_header("accept", "application/x-bibtex")
            .with_status(200)
            .with_body("@article{Doe_2020, title={Deep Learning for NLP}}")
            .create_async()
            .await;

        let text = source(&server).fetch_bibtex("10.1/abc").await.unwrap();
        assert!(text.starts_with("@article"));
    }
}
