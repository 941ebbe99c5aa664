//! Utility modules supporting the lookup pipeline.
//!
//! - [`merge_results`]: deduplicate, rank and truncate pooled results
//! - [`find_doi`], [`find_arxiv_id`]: identifier detection in PDF text
//! - [`BibEntry`]: BibTeX parsing and formatting
//! - [`HttpClient`]: shared HTTP client with a polite User-Agent
//! - [`with_retry`]: optional retry with exponential backoff
//! - [`clipboard`]: OSC 52 clipboard copy
//!
//! # Deduplication
//!
//! ```rust
//! use pdflu::models::{Identifier, SearchResult};
//! use pdflu::utils::merge_results;
//!
//! # fn example(results: Vec<SearchResult>) {
//! // Identifier matches first, then Crossref before arXiv, at most 10 shown
//! let context = vec![Identifier::doi("10.1000/xyz123")];
//! let shown = merge_results(results, &context, 10);
//! # }
//! ```

pub mod bibtex;
pub mod clipboard;
mod dedup;
mod http;
mod identifiers;
mod retry;
mod text;

pub use bibtex::{citation_key, entry_for, local_entry, BibEntry, BibtexError};
pub use dedup::{find_duplicates, matches_context, merge_results};
pub use http::{default_user_agent, HttpClient};
pub use identifiers::{find_arxiv_id, find_arxiv_name, find_doi};
pub use retry::{with_retry, RetryConfig, TransientError};
pub use text::{clean_string_for_key, clean_string_for_query, normalize_box_text, normalize_title, truncate_words};
