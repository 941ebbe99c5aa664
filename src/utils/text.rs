//! String normalization shared by candidate extraction, ranking and keys.

use regex::Regex;
use std::sync::OnceLock;

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Keep only printable ASCII (letters, digits, punctuation, space, newline)
/// and collapse every whitespace run to a single space.
pub fn normalize_box_text(text: &str) -> String {
    let ascii: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_punctuation() || *c == ' ' || *c == '\n')
        .collect();
    whitespace_re().replace_all(&ascii, " ").trim().to_string()
}

/// Lowercase, spaces to underscores, and drop anything that is not
/// `[a-z0-9_]`. Used for BibTeX keys.
pub fn clean_string_for_key(s: &str) -> String {
    s.to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// Lowercase and replace anything that is not `[a-z0-9 ]` with a space.
pub fn clean_string_for_query(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Lowercased alphanumeric words, for title comparison
pub fn normalize_title(title: &str) -> String {
    clean_string_for_query(title)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncate at a word boundary so the result has at most `max_chars` chars.
///
/// A single word longer than the limit is cut mid-word.
pub fn truncate_words(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let mut out = String::new();
    for word in text.split(' ') {
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + word.chars().count() > max_chars {
            break;
        }
        if extra == 1 {
            out.push(' ');
        }
        out.push_str(word);
    }

    if out.is_empty() {
        out = text.chars().take(max_chars).collect();
    }
    out
}
