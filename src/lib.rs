//! # pdflu
//!
//! Look up the BibTeX entry of an academic PDF. The first pages are parsed
//! into positioned text boxes, title- and author-shaped boxes become search
//! queries, Crossref and arXiv are queried, and the pooled results are
//! deduplicated, ranked and offered for selection.
//!
//! ## Architecture
//!
//! - [`pdf`]: text boxes, document info and identifiers from a PDF
//! - [`lookup`]: candidate filter, query plan, dispatcher and pipeline
//! - [`sources`]: bibliography sources behind [`BibliographySource`]
//! - [`models`]: text boxes, search results and identifiers
//! - [`ui`]: result display and the interactive selector
//! - [`utils`]: deduplication, BibTeX, HTTP, retry and clipboard helpers
//! - [`config`]: configuration management

pub mod config;
pub mod lookup;
pub mod models;
pub mod pdf;
pub mod sources;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use lookup::{run_lookup, LookupError, LookupInput, LookupOutcome};
pub use models::SearchResult;
pub use sources::BibliographySource;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
