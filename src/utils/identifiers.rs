//! DOI and arXiv identifier detection in free text and file names.

use regex::Regex;
use std::sync::OnceLock;

// https://www.crossref.org/blog/dois-and-matching-regular-expressions/
fn doi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(10\.\d{4,9}/[-._;()/:A-Z0-9]+)").expect("static regex"))
}

fn arxiv_new_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)arXiv:\s?(\d{4}\.\d{4,5})").expect("static regex"))
}

fn arxiv_old_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)arXiv:\s?([a-z][a-z\-]*(?:\.[A-Z]{2})?/\d{7})").expect("static regex"))
}

fn arxiv_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4}\.\d{4,5})").expect("static regex"))
}

/// First DOI in `text`, without trailing sentence punctuation
pub fn find_doi(text: &str) -> Option<String> {
    doi_re()
        .captures(text)
        .map(|c| c[1].trim_end_matches(['.', ',', ';']).to_string())
}

/// First `arXiv:`-prefixed identifier in `text`, new style before old style
pub fn find_arxiv_id(text: &str) -> Option<String> {
    arxiv_new_text_re()
        .captures(text)
        .or_else(|| arxiv_old_text_re().captures(text))
        .map(|c| c[1].to_string())
}

/// New-style arXiv ID anywhere in a file name or URL (`2301.12345.pdf`,
/// `https://arxiv.org/abs/2301.12345`)
pub fn find_arxiv_name(name: &str) -> Option<String> {
    arxiv_name_re().captures(name).map(|c| c[1].to_string())
}
