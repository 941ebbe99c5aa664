//! Query dispatcher: fans each query out to every source.

use futures_util::future::join_all;
use std::sync::Arc;

use crate::models::{Identifier, Origin, SearchResult, SourceType};
use crate::sources::BibliographySource;

/// A failed request, recorded and skipped
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source: SourceType,
    /// The query or identifier that was being resolved
    pub request: String,
    pub message: String,
}

/// Pooled results of a batch of requests
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Results in discovery order: by request, then by source order
    pub results: Vec<SearchResult>,
    pub failures: Vec<SourceFailure>,
    pub requests: usize,
}

impl DispatchReport {
    pub fn extend(&mut self, other: DispatchReport) {
        self.results.extend(other.results);
        self.failures.extend(other.failures);
        self.requests += other.requests;
    }

    /// True when requests were made and every one of them failed
    pub fn all_failed(&self) -> bool {
        self.requests > 0 && self.failures.len() == self.requests
    }
}

/// Sends queries and identifier lookups to a fixed set of sources
#[derive(Debug, Clone)]
pub struct Dispatcher {
    sources: Vec<Arc<dyn BibliographySource>>,
    limit: usize,
}

impl Dispatcher {
    /// `limit` caps the results taken from each source per query
    pub fn new(sources: Vec<Arc<dyn BibliographySource>>, limit: usize) -> Self {
        Self { sources, limit }
    }

    /// Resolve document identifiers with every source that supports them
    pub async fn lookup_identifiers(&self, ids: &[Identifier]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for id in ids {
            let sources: Vec<&Arc<dyn BibliographySource>> =
                self.sources.iter().filter(|s| s.supports_lookup(id)).collect();
            let responses = join_all(sources.iter().map(|s| s.lookup(id))).await;

            for (source, response) in sources.iter().zip(responses) {
                report.requests += 1;
                match response {
                    Ok(Some(mut result)) => {
                        tracing::info!("{} resolved {}", source.name(), id);
                        result.origin = Origin::IdentifierLookup;
                        report.results.push(result);
                    }
                    Ok(None) => tracing::info!("{} has no record for {}", source.name(), id),
                    Err(e) => {
                        tracing::warn!("{} lookup of {} failed: {}", source.name(), id, e);
                        report.failures.push(SourceFailure {
                            source: source.source_type(),
                            request: id.to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        report
    }

    /// Search every source with each query; sources run concurrently per query
    pub async fn search(&self, queries: &[String]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (index, query) in queries.iter().enumerate() {
            tracing::info!("Querying with {:?}", query);
            let responses = join_all(self.sources.iter().map(|s| s.search(query, self.limit))).await;

            for (source, response) in self.sources.iter().zip(responses) {
                report.requests += 1;
                match response {
                    Ok(results) => {
                        if results.is_empty() {
                            tracing::info!("No results from {}", source.name());
                        }
                        report.results.extend(results.into_iter().take(self.limit).map(|mut r| {
                            r.origin = Origin::Query(index);
                            r
                        }));
                    }
                    Err(e) => {
                        tracing::warn!("{} search failed: {}", source.name(), e);
                        report.failures.push(SourceFailure {
                            source: source.source_type(),
                            request: query.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::mock::make_result;
    use crate::sources::MockSource;

    fn dispatcher(crossref: MockSource, arxiv: MockSource, limit: usize) -> Dispatcher {
        Dispatcher::new(vec![Arc::new(crossref), Arc::new(arxiv)], limit)
    }

    #[tokio::test]
    async fn test_search_pools_crossref_then_arxiv() {
        let crossref = MockSource::new(SourceType::CrossRef)
            .with_results(vec![make_result(SourceType::CrossRef, "C1", Some("10.1/c1"))]);
        let arxiv = MockSource::new(SourceType::Arxiv)
            .with_results(vec![make_result(SourceType::Arxiv, "A1", Some("2001.00001"))]);

        let report = dispatcher(crossref, arxiv, 10)
            .search(&["q1".to_string(), "q2".to_string()])
            .await;

        let titles: Vec<&str> = report.results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["C1", "A1", "C1", "A1"]);
        assert_eq!(report.results[2].origin, Origin::Query(1));
        assert_eq!(report.requests, 4);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_one_failing_source_does_not_abort_the_other() {
        let crossref = MockSource::new(SourceType::CrossRef).failing("connection refused");
        let arxiv = MockSource::new(SourceType::Arxiv)
            .with_results(vec![make_result(SourceType::Arxiv, "A1", Some("2001.00001"))]);

        let report = dispatcher(crossref, arxiv, 10).search(&["q".to_string()]).await;
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, SourceType::CrossRef);
        assert!(!report.all_failed());
    }

    #[tokio::test]
    async fn test_all_failed() {
        let report = dispatcher(
            MockSource::new(SourceType::CrossRef).failing("down"),
            MockSource::new(SourceType::Arxiv).failing("down"),
            10,
        )
        .search(&["q".to_string()])
        .await;
        assert!(report.all_failed());

        let empty = dispatcher(MockSource::new(SourceType::CrossRef), MockSource::new(SourceType::Arxiv), 10)
            .search(&["q".to_string()])
            .await;
        assert!(!empty.all_failed());
        assert!(empty.results.is_empty());
    }

    #[tokio::test]
    async fn test_per_source_limit() {
        let many: Vec<SearchResult> = (0..5)
            .map(|i| make_result(SourceType::CrossRef, &format!("C{}", i), None))
            .collect();
        let report = dispatcher(
            MockSource::new(SourceType::CrossRef).with_results(many),
            MockSource::new(SourceType::Arxiv),
            2,
        )
        .search(&["q".to_string()])
        .await;
        assert_eq!(report.results.len(), 2);
    }

    #[tokio::test]
    async fn test_identifier_lookup_routes_by_capability() {
        let doi = Identifier::doi("10.1/abc");
        let crossref = MockSource::new(SourceType::CrossRef)
            .with_lookup(doi.clone(), make_result(SourceType::CrossRef, "By DOI", Some("10.1/abc")));
        let arxiv = MockSource::new(SourceType::Arxiv);

        let report = dispatcher(crossref, arxiv, 10).lookup_identifiers(&[doi]).await;
        assert_eq!(report.requests, 1);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].origin, Origin::IdentifierLookup);
    }
}
