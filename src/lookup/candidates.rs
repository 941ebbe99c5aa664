//! Candidate filter and query plan.

use crate::config::{LookupConfig, ParsingConfig};
use crate::models::{CandidateQuery, PdfMetadata, TextBox};
use crate::utils::truncate_words;

/// Selects text boxes shaped like a title or author line.
///
/// A box is kept when it has at most `max_lines` lines and between
/// `min_words` and `max_words` words; its text is truncated to `max_chars`.
/// The filter borrows its input, so [`CandidateFilter::iter`] can be called
/// any number of times and always yields the same sequence.
#[derive(Debug, Clone, Copy)]
pub struct CandidateFilter<'a> {
    boxes: &'a [TextBox],
    parsing: &'a ParsingConfig,
}

impl<'a> CandidateFilter<'a> {
    pub fn new(boxes: &'a [TextBox], parsing: &'a ParsingConfig) -> Self {
        Self { boxes, parsing }
    }

    pub fn accepts(&self, text_box: &TextBox) -> bool {
        let words = text_box.word_count();
        text_box.line_count <= self.parsing.max_lines
            && words >= self.parsing.min_words
            && words <= self.parsing.max_words
    }

    /// Candidates in page and position order
    pub fn iter(&self) -> Candidates<'a> {
        Candidates {
            boxes: self.boxes.iter(),
            filter: *self,
        }
    }
}

impl<'a> IntoIterator for &CandidateFilter<'a> {
    type Item = CandidateQuery;
    type IntoIter = Candidates<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over the candidates of a [`CandidateFilter`]
#[derive(Debug, Clone)]
pub struct Candidates<'a> {
    boxes: std::slice::Iter<'a, TextBox>,
    filter: CandidateFilter<'a>,
}

impl Iterator for Candidates<'_> {
    type Item = CandidateQuery;

    fn next(&mut self) -> Option<Self::Item> {
        let filter = self.filter;
        self.boxes.by_ref().find(|b| filter.accepts(b)).map(|b| CandidateQuery {
            text: truncate_words(&b.text(), filter.parsing.max_chars),
            page: b.page,
            font_size: b.font_size,
        })
    }
}

/// Choose the query strings to dispatch.
///
/// With `largest_font_only`, only candidates set in the largest candidate
/// font (compared in whole points) are kept. Repeated strings are dropped and
/// at most `max_queries` remain (0 for no cap). When nothing survives, the
/// info-dictionary title is used instead.
pub fn plan_queries(
    filter: &CandidateFilter<'_>,
    metadata: &PdfMetadata,
    parsing: &ParsingConfig,
    lookup: &LookupConfig,
) -> Vec<String> {
    let candidates: Vec<CandidateQuery> = filter.iter().collect();
    tracing::debug!("{} candidate text boxes", candidates.len());

    let largest = candidates
        .iter()
        .map(|c| c.font_size.trunc())
        .fold(f32::MIN, f32::max);

    let mut queries: Vec<String> = Vec::new();
    for candidate in candidates {
        if parsing.largest_font_only && candidate.font_size.trunc() < largest {
            continue;
        }
        if !queries.contains(&candidate.text) {
            queries.push(candidate.text);
        }
    }

    if lookup.max_queries > 0 {
        queries.truncate(lookup.max_queries);
    }

    if queries.is_empty() {
        if let Some(title) = metadata.title.as_deref().filter(|t| !t.trim().is_empty()) {
            tracing::info!("No candidates in page text; using document title");
            queries.push(truncate_words(title.trim(), parsing.max_chars));
        }
    }

    queries
}
