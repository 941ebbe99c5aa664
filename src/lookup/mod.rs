//! The lookup pipeline: PDF → candidate queries → sources → ranked results.

pub mod candidates;
pub mod dispatch;

pub use candidates::{plan_queries, CandidateFilter, Candidates};
pub use dispatch::{DispatchReport, Dispatcher, SourceFailure};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::models::{PdfMetadata, SearchResult};
use crate::pdf::{parse_pdf, PdfError};
use crate::sources::{ArxivSource, BibliographySource, CrossRefSource, SourceError};
use crate::utils::{merge_results, truncate_words, RetryConfig};

/// Everything that can stop a lookup from producing an entry
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("{0}")]
    Input(String),

    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No candidate title or author text found in {}", .0.display())]
    NoCandidates(PathBuf),

    #[error("All bibliography services failed: {0}")]
    AllSourcesFailed(String),

    #[error("No results found")]
    NoResults,

    #[error("Aborted by user")]
    Cancelled,

    #[error("Manual entry is not supported")]
    ManualEntry,

    #[error("Interrupted")]
    Interrupted,

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl LookupError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            LookupError::Input(_) | LookupError::Config(_) => 2,
            LookupError::Pdf(PdfError::NotFound(_) | PdfError::NotAFile(_)) => 2,
            LookupError::Pdf(_) => 3,
            LookupError::NoCandidates(_) => 4,
            LookupError::AllSourcesFailed(_) => 5,
            LookupError::NoResults => 6,
            LookupError::Cancelled | LookupError::ManualEntry | LookupError::Source(_) => 1,
            LookupError::Interrupted => 130,
        }
    }
}

/// What to look up
#[derive(Debug, Clone)]
pub enum LookupInput {
    /// Parse the PDF for candidates and identifiers
    Pdf(PathBuf),
    /// Use this text as the sole query
    Text(String),
}

/// Ranked results and the context they were found in
#[derive(Debug)]
pub struct LookupOutcome {
    pub metadata: PdfMetadata,
    pub queries: Vec<String>,
    /// Deduplicated, ranked and truncated for display
    pub results: Vec<SearchResult>,
    pub failures: Vec<SourceFailure>,
}

/// The production sources, Crossref first
pub fn default_sources(config: &Config) -> Result<Vec<Arc<dyn BibliographySource>>, SourceError> {
    let timeout = Duration::from_secs(config.pdflu.timeout_secs);
    let retry = RetryConfig::with_retries(config.pdflu.max_retries);

    if config.pdflu.mailto().is_none() {
        tracing::warn!("polite_pool_email is not set; Crossref requests are not in the polite pool");
    }

    let crossref = CrossRefSource::new(config.pdflu.mailto(), timeout)?.with_retry(retry);
    let arxiv = ArxivSource::new(timeout)?.with_retry(retry);
    Ok(vec![Arc::new(crossref), Arc::new(arxiv)])
}

/// Run the lookup up to the ranked result list.
///
/// Identifier lookups run first so their hits lead the pool. A failing
/// service is recorded and skipped; only when every request failed and
/// nothing was found is that an error.
pub async fn run_lookup(
    input: &LookupInput,
    config: &Config,
    sources: Vec<Arc<dyn BibliographySource>>,
) -> Result<LookupOutcome, LookupError> {
    let (metadata, queries) = match input {
        LookupInput::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(LookupError::Input("Query text is empty".to_string()));
            }
            let query = truncate_words(text, config.parsing.max_chars);
            (PdfMetadata::default(), vec![query])
        }
        LookupInput::Pdf(path) => {
            let parsed = parse_pdf(path, &config.parsing)?;
            let filter = CandidateFilter::new(&parsed.boxes, &config.parsing);
            let queries = plan_queries(&filter, &parsed.metadata, &config.parsing, &config.pdflu);

            if queries.is_empty() && parsed.metadata.identifiers().is_empty() {
                return Err(LookupError::NoCandidates(path.clone()));
            }
            (parsed.metadata, queries)
        }
    };

    for (i, query) in queries.iter().enumerate() {
        tracing::debug!("Query {}: {}", i + 1, query);
    }

    let context = metadata.identifiers();
    let dispatcher = Dispatcher::new(sources, config.pdflu.max_query_results);

    let mut report = dispatcher.lookup_identifiers(&context).await;
    report.extend(dispatcher.search(&queries).await);

    if report.results.is_empty() {
        if report.all_failed() {
            let reasons: Vec<String> = report
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.source, f.message))
                .collect();
            return Err(LookupError::AllSourcesFailed(reasons.join("; ")));
        }
        return Err(LookupError::NoResults);
    }

    let pooled = report.results.len();
    let results = merge_results(report.results, &context, config.pdflu.disp_query_results);
    tracing::info!("{} results pooled, {} shown", pooled, results.len());

    Ok(LookupOutcome {
        metadata,
        queries,
        results,
        failures: report.failures,
    })
}
