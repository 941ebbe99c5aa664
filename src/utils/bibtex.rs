//! BibTeX entries: parsing, local formatting and output.
//!
//! Entries are built locally from a search result's raw record, or fetched
//! from the publisher through DOI content negotiation and re-parsed so both
//! paths share one output layout:
//!
//! ```text
//! @article{doe_2020_deep,
//!     title = {Deep Learning for NLP},
//!     author = {Jane Doe and John Smith},
//!     year = {2020},
//! }
//! ```

use serde_json::Value;
use std::fmt;

use crate::config::{ArxivBibtexStyle, LookupConfig};
use crate::models::{ArxivRecord, RawRecord, SearchResult};
use crate::sources::{BibliographySource, SourceError};
use crate::utils::clean_string_for_key;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Errors from parsing BibTeX text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BibtexError {
    #[error("No entry found in BibTeX text")]
    NoEntry,

    #[error("Malformed BibTeX entry: {0}")]
    Malformed(String),
}

/// A single `name = value` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
    /// Written without braces (numbers and month macros)
    pub bare: bool,
}

/// One BibTeX entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    pub entry_type: String,
    pub key: String,
    pub fields: Vec<Field>,
}

impl BibEntry {
    pub fn new(entry_type: &str, key: &str) -> Self {
        Self {
            entry_type: entry_type.to_lowercase(),
            key: key.to_string(),
            fields: Vec::new(),
        }
    }

    /// Set a braced field, replacing any previous value. Empty values are ignored.
    pub fn set(&mut self, name: &str, value: &str) {
        self.insert(name, value, false);
    }

    /// Set a field written without braces
    pub fn set_bare(&mut self, name: &str, value: &str) {
        self.insert(name, value, true);
    }

    fn insert(&mut self, name: &str, value: &str, bare: bool) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let name = name.trim();
        let field = Field {
            name: name.to_string(),
            value: value.to_string(),
            bare,
        };
        match self.fields.iter_mut().find(|f| f.name.eq_ignore_ascii_case(name)) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Field value; names compare case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    /// Parse the first entry in `text`.
    ///
    /// Accepts brace- or quote-delimited values, bare numbers and macros,
    /// nested braces, and a missing trailing comma.
    pub fn parse(text: &str) -> Result<Self, BibtexError> {
        let start = text.find('@').ok_or(BibtexError::NoEntry)?;
        let mut p = Parser {
            chars: text[start + 1..].chars().collect(),
            pos: 0,
        };

        let entry_type = p.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        if entry_type.is_empty() {
            return Err(BibtexError::Malformed("missing entry type".to_string()));
        }
        p.skip_ws();
        let close = match p.next() {
            Some('{') => '}',
            Some('(') => ')',
            _ => return Err(BibtexError::Malformed("expected '{' after entry type".to_string())),
        };

        p.skip_ws();
        let key = p.take_while(|c| c != ',' && c != close && !c.is_whitespace());
        let mut entry = BibEntry::new(&entry_type, &key);

        loop {
            p.skip_ws();
            match p.next() {
                Some(',') => {}
                Some(c) if c == close => return Ok(entry),
                None => return Err(BibtexError::Malformed("unterminated entry".to_string())),
                Some(c) => return Err(BibtexError::Malformed(format!("unexpected '{}'", c))),
            }

            p.skip_ws();
            if p.peek() == Some(close) {
                p.next();
                return Ok(entry);
            }

            let name = p.take_while(|c| c.is_ascii_alphanumeric() || "_-:.".contains(c));
            if name.is_empty() {
                return Err(BibtexError::Malformed("missing field name".to_string()));
            }
            p.skip_ws();
            if p.next() != Some('=') {
                return Err(BibtexError::Malformed(format!("expected '=' after {}", name)));
            }
            p.skip_ws();

            match p.peek() {
                Some('{') => {
                    p.next();
                    let value = p.delimited('{', '}')?;
                    entry.set(&name, &collapse(&value));
                }
                Some('"') => {
                    p.next();
                    let value = p.quoted()?;
                    entry.set(&name, &collapse(&value));
                }
                _ => {
                    let value = p.take_while(|c| c != ',' && c != close);
                    entry.set_bare(&name, value.trim());
                }
            }
        }
    }

    /// Fields ordered by `order`, then the rest in insertion order
    pub fn ordered_fields(&self, order: &[String]) -> Vec<&Field> {
        let mut fields: Vec<&Field> = order
            .iter()
            .filter_map(|name| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
            .collect();
        fields.extend(
            self.fields
                .iter()
                .filter(|f| !order.iter().any(|name| f.name.eq_ignore_ascii_case(name))),
        );
        fields
    }

    /// Four-space indent, one field per line, trailing comma
    pub fn format(&self, order: &[String]) -> String {
        let mut out = format!("@{}{{{},\n", self.entry_type, self.key);
        for field in self.ordered_fields(order) {
            if field.bare {
                out.push_str(&format!("    {} = {},\n", field.name, field.value));
            } else {
                out.push_str(&format!("    {} = {{{}}},\n", field.name, field.value));
            }
        }
        out.push('}');
        out
    }
}

impl fmt::Display for BibEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(&[]))
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek().filter(|c| pred(*c)) {
            out.push(c);
            self.pos += 1;
        }
        out
    }

    /// Body of a braced value; the opening brace is already consumed
    fn delimited(&mut self, open: char, close: char) -> Result<String, BibtexError> {
        let mut depth = 1;
        let mut out = String::new();
        while let Some(c) = self.next() {
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(out);
                }
            }
            out.push(c);
        }
        Err(BibtexError::Malformed("unbalanced braces".to_string()))
    }

    fn quoted(&mut self) -> Result<String, BibtexError> {
        let mut depth = 0;
        let mut out = String::new();
        while let Some(c) = self.next() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                '"' if depth == 0 => return Ok(out),
                _ => {}
            }
            out.push(c);
        }
        Err(BibtexError::Malformed("unterminated quoted value".to_string()))
    }
}

fn collapse(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Make free text safe inside a braced BibTeX value.
///
/// `&`, `%`, `#` and `_` are escaped outside `$...$` math, characters already
/// escaped are left alone, and braces without a partner are dropped.
pub fn escape_value(text: &str) -> String {
    let mut escaped: Vec<char> = Vec::with_capacity(text.len());
    let mut in_math = false;
    let mut prev_backslash = false;
    for c in text.chars() {
        if prev_backslash {
            escaped.push(c);
            prev_backslash = false;
            continue;
        }
        match c {
            '\\' => prev_backslash = true,
            '$' => in_math = !in_math,
            '&' | '%' | '#' | '_' if !in_math => escaped.push('\\'),
            _ => {}
        }
        escaped.push(c);
    }

    // Unmatched braces, by position
    let mut open: Vec<usize> = Vec::new();
    let mut unmatched: Vec<usize> = Vec::new();
    let mut prev_backslash = false;
    for (i, &c) in escaped.iter().enumerate() {
        match c {
            '{' if !prev_backslash => open.push(i),
            '}' if !prev_backslash => {
                if open.pop().is_none() {
                    unmatched.push(i);
                }
            }
            _ => {}
        }
        prev_backslash = c == '\\' && !prev_backslash;
    }
    unmatched.extend(open);

    escaped
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !unmatched.contains(i))
        .map(|(_, c)| c)
        .collect()
}

/// Citation key `lastname_year_firsttitleword`
pub fn citation_key(result: &SearchResult) -> String {
    let last_name = result
        .authors
        .first()
        .and_then(|a| a.split_whitespace().last())
        .unwrap_or_default();
    let title_word = result
        .title
        .split_whitespace()
        .map(clean_string_for_key)
        .find(|w| !w.is_empty())
        .unwrap_or_default();

    let parts: Vec<String> = [last_name, result.year.as_deref().unwrap_or_default(), title_word.as_str()]
        .iter()
        .map(|p| clean_string_for_key(p))
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        "unknown".to_string()
    } else {
        parts.join("_")
    }
}

fn crossref_entry_type(work_type: &str) -> &'static str {
    match work_type {
        "journal-article" => "article",
        "proceedings-article" => "inproceedings",
        "book-chapter" => "incollection",
        "book" | "monograph" | "edited-book" => "book",
        "dissertation" => "phdthesis",
        "report" => "techreport",
        _ => "misc",
    }
}

fn first_string(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::Array(values) => values.iter().find_map(|v| v.as_str()).map(str::to_string),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn issued_month(item: &Value) -> Option<usize> {
    ["issued", "published-print", "published-online", "published"]
        .iter()
        .find_map(|key| item.get(key)?.get("date-parts")?.get(0)?.get(1)?.as_u64())
        .map(|m| m as usize)
        .filter(|m| (1..=12).contains(m))
}

/// Entry for a Crossref `works` item
pub fn from_crossref(result: &SearchResult, item: &Value) -> BibEntry {
    let work_type = item.get("type").and_then(Value::as_str).unwrap_or_default();
    let entry_type = crossref_entry_type(work_type);
    let mut entry = BibEntry::new(entry_type, &citation_key(result));

    entry.set("title", &escape_value(&result.title));
    entry.set("author", &escape_value(&result.author_string()));
    if let Some(month) = issued_month(item) {
        entry.set_bare("month", MONTHS[month - 1]);
    }
    if let Some(year) = &result.year {
        entry.set("year", year);
    }

    if let Some(container) = first_string(item, "container-title") {
        match entry_type {
            "inproceedings" | "incollection" => entry.set("booktitle", &escape_value(&container)),
            "article" => entry.set("journal", &escape_value(&container)),
            _ => {}
        }
    }
    if let Some(publisher) = &result.publisher {
        entry.set("publisher", &escape_value(publisher));
    }
    if let Some(volume) = first_string(item, "volume") {
        entry.set("volume", &volume);
    }
    if let Some(issue) = first_string(item, "issue") {
        entry.set("number", &issue);
    }
    if let Some(pages) = first_string(item, "page") {
        entry.set("pages", &pages.replace('-', "--"));
    }
    if let Some(issn) = first_string(item, "ISSN") {
        entry.set("issn", &issn);
    }
    if let Some(doi) = &result.doi {
        entry.set("doi", doi);
    }
    if let Some(url) = &result.url {
        entry.set("url", url);
    }
    entry
}

/// Entry for an arXiv record, in the configured style
pub fn from_arxiv(result: &SearchResult, record: &ArxivRecord, style: ArxivBibtexStyle) -> BibEntry {
    let entry_type = match style {
        ArxivBibtexStyle::Misc => "misc",
        ArxivBibtexStyle::Article => "article",
    };
    let mut entry = BibEntry::new(entry_type, &citation_key(result));

    entry.set("title", &escape_value(&result.title));
    entry.set("author", &escape_value(&result.author_string()));
    if let Some(year) = &result.year {
        entry.set("year", year);
    }

    let id = record.entry_id.as_str();
    let category = record.primary_category.as_deref().filter(|c| !c.is_empty());
    match style {
        ArxivBibtexStyle::Article => match category {
            Some(cat) => entry.set("journaltitle", &format!("{{\\tt arXiv:{} [{}]}}", id, cat)),
            None => entry.set("journaltitle", &format!("{{\\tt arXiv:{}}}", id)),
        },
        ArxivBibtexStyle::Misc => {
            entry.set("eprint", &format!("{{{}}}", id));
            entry.set("archivePrefix", "{arXiv}");
            if let Some(cat) = category {
                entry.set("primaryClass", &format!("{{{}}}", cat));
            }
        }
    }
    if let Some(doi) = &result.doi {
        entry.set("doi", doi);
    }
    if let Some(url) = &result.url {
        entry.set("url", url);
    }
    entry
}

/// Entry built from the result's own record, without network access
pub fn local_entry(result: &SearchResult, style: ArxivBibtexStyle) -> BibEntry {
    match &result.raw {
        RawRecord::CrossRef(item) => from_crossref(result, item),
        RawRecord::Arxiv(record) => from_arxiv(result, record, style),
    }
}

/// Publisher entry for `doi`, re-parsed
pub async fn fetch_entry(source: &dyn BibliographySource, doi: &str) -> Result<BibEntry, SourceError> {
    let text = source.fetch_bibtex(doi).await?;
    BibEntry::parse(&text).map_err(|e| SourceError::Parse(e.to_string()))
}

/// Formatted entry for the selected result.
///
/// With `fetch_bibtex` on and a DOI present, the publisher's entry is fetched
/// through `source`; any failure there falls back to the local entry.
pub async fn entry_for(
    result: &SearchResult,
    source: Option<&dyn BibliographySource>,
    config: &LookupConfig,
) -> String {
    let order = config.field_order();
    let doi = result.doi.as_deref().filter(|d| !d.trim().is_empty());

    if let (true, Some(doi), Some(source)) = (config.fetch_bibtex, doi, source) {
        match fetch_entry(source, doi).await {
            Ok(entry) => return entry.format(&order),
            Err(e) => tracing::warn!("Could not fetch BibTeX for {}: {}; formatting locally", doi, e),
        }
    }

    local_entry(result, config.arxiv_bibtex_style).format(&order)
}
