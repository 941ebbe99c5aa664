//! Core data models for PDF text boxes, search results and lookup context.

mod metadata;
mod record;
mod text_box;

pub use metadata::{Identifier, PdfMetadata};
pub use record::{ArxivRecord, Origin, RawRecord, SearchResult, SearchResultBuilder, SourceType};
pub use text_box::{BoundingBox, CandidateQuery, TextBox};
