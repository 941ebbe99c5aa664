//! Configuration management.
//!
//! Settings are read once at startup from an INI file with `[pdflu]` and
//! `[parsing]` sections, then overridden by `PDFLU_`-prefixed environment
//! variables (`PDFLU_PARSING__MAX_PAGES=3`). Unset keys fall back to the
//! defaults documented on each field.
//!
//! ```ini
//! [pdflu]
//! max_query_results = 10
//! polite_pool_email = someone@example.org
//! disp_query_results = 10
//! use_clipboard = false
//!
//! [parsing]
//! max_pages = 2
//! max_lines = 4
//! min_words = 2
//! max_words = 30
//! max_chars = 200
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Lookup, display and output settings
    #[serde(default)]
    pub pdflu: LookupConfig,

    /// PDF candidate filter settings
    #[serde(default)]
    pub parsing: ParsingConfig,
}

/// Output style for arXiv records that have no DOI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArxivBibtexStyle {
    /// `@misc` with `eprint`, `archivePrefix` and `primaryClass`
    #[default]
    Misc,
    /// `@article` with `journaltitle = {{\tt arXiv:ID [CAT]}}`
    Article,
}

/// `[pdflu]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Results requested from each service per query (default: 10)
    #[serde(default = "default_max_query_results")]
    pub max_query_results: usize,

    /// Contact email for the Crossref polite pool (default: empty)
    #[serde(default)]
    pub polite_pool_email: String,

    /// Results shown to the operator (default: 10)
    #[serde(default = "default_disp_query_results")]
    pub disp_query_results: usize,

    /// Mirror the entry to the clipboard (default: false)
    #[serde(default)]
    pub use_clipboard: bool,

    /// Candidate queries dispatched per document, 0 for no cap (default: 3)
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    #[serde(default)]
    pub arxiv_bibtex_style: ArxivBibtexStyle,

    /// Fetch entries for DOIs via content negotiation (default: true)
    #[serde(default = "default_true")]
    pub fetch_bibtex: bool,

    /// Lines of page 1 shown by the `s` selector command (default: 10)
    #[serde(default = "default_show_first_lines")]
    pub show_first_lines: usize,

    /// Comma-separated BibTeX field order
    #[serde(default = "default_field_order")]
    pub field_order: String,

    /// Retries per service request after the first attempt (default: 0)
    #[serde(default)]
    pub max_retries: u32,

    /// HTTP request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_query_results: default_max_query_results(),
            polite_pool_email: String::new(),
            disp_query_results: default_disp_query_results(),
            use_clipboard: false,
            max_queries: default_max_queries(),
            arxiv_bibtex_style: ArxivBibtexStyle::default(),
            fetch_bibtex: true,
            show_first_lines: default_show_first_lines(),
            field_order: default_field_order(),
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LookupConfig {
    /// Field order as a list
    pub fn field_order(&self) -> Vec<String> {
        self.field_order
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Polite pool email, if configured
    pub fn mailto(&self) -> Option<&str> {
        let email = self.polite_pool_email.trim();
        (!email.is_empty()).then_some(email)
    }
}

/// `[parsing]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// Pages of the PDF to parse (default: 2)
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Maximum lines in a candidate text box (default: 4)
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    /// Minimum words in a candidate text box (default: 2)
    #[serde(default = "default_min_words")]
    pub min_words: usize,

    /// Maximum words in a candidate text box (default: 30)
    #[serde(default = "default_max_words")]
    pub max_words: usize,

    /// Maximum characters in a query string (default: 200)
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Only query with candidates set in the largest font (default: true)
    #[serde(default = "default_true")]
    pub largest_font_only: bool,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_lines: default_max_lines(),
            min_words: default_min_words(),
            max_words: default_max_words(),
            max_chars: default_max_chars(),
            largest_font_only: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_query_results() -> usize {
    10
}

fn default_disp_query_results() -> usize {
    10
}

fn default_max_queries() -> usize {
    3
}

fn default_show_first_lines() -> usize {
    10
}

fn default_field_order() -> String {
    "title, author, month, year, booktitle, journaltitle, eventtitle, journal, publisher, \
     location, series, volume, number, pages, numpages, issn, doi, url, groups, keywords, \
     comment, file"
        .to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_pages() -> usize {
    2
}

fn default_max_lines() -> usize {
    4
}

fn default_min_words() -> usize {
    2
}

fn default_max_words() -> usize {
    30
}

fn default_max_chars() -> usize {
    200
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Config path is not a file: {0}")]
    NotAFile(PathBuf),

    #[error("Invalid configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Default config location: `$XDG_CONFIG_HOME/pdflu/pdflu.conf`
pub fn default_config_path() -> Option<PathBuf> {
    let base = if cfg!(unix) {
        std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
    } else {
        dirs::config_dir()
    };
    base.map(|dir| dir.join("pdflu").join("pdflu.conf"))
}

/// Load configuration from `path`, or from the default location when `None`.
///
/// An explicit path must exist; a missing default file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    match path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            if !path.is_file() {
                return Err(ConfigError::NotAFile(path.to_path_buf()));
            }
            builder = builder
                .add_source(config::File::from(path).format(config::FileFormat::Ini));
        }
        None => {
            if let Some(default_path) = default_config_path() {
                tracing::debug!("Looking for config file at {}", default_path.display());
                builder = builder.add_source(
                    config::File::from(default_path.as_path())
                        .format(config::FileFormat::Ini)
                        .required(false),
                );
            }
        }
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix("PDFLU")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pdflu.max_query_results, 10);
        assert_eq!(config.pdflu.disp_query_results, 10);
        assert!(!config.pdflu.use_clipboard);
        assert_eq!(config.parsing.max_pages, 2);
        assert_eq!(config.parsing.max_lines, 4);
        assert_eq!(config.parsing.min_words, 2);
        assert_eq!(config.parsing.max_words, 30);
        assert_eq!(config.parsing.max_chars, 200);
        assert!(config.pdflu.mailto().is_none());
    }

    #[test]
    fn test_config_file_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pdflu.conf");

        let ini_content = r#"
[pdflu]
max_query_results = 5
polite_pool_email = someone@example.org
disp_query_results = 3
use_clipboard = true
arxiv_bibtex_style = article

[parsing]
max_pages = 1
max_words = 20
"#;

        let mut file = File::create(&path).unwrap();
        file.write_all(ini_content.as_bytes()).unwrap();

        let config = load_config(Some(&path)).unwrap();

        assert_eq!(config.pdflu.max_query_results, 5);
        assert_eq!(config.pdflu.mailto(), Some("someone@example.org"));
        assert_eq!(config.pdflu.disp_query_results, 3);
        assert!(config.pdflu.use_clipboard);
        assert_eq!(config.pdflu.arxiv_bibtex_style, ArxivBibtexStyle::Article);
        assert_eq!(config.parsing.max_pages, 1);
        assert_eq!(config.parsing.max_words, 20);
        // Unspecified keys keep their defaults
        assert_eq!(config.parsing.min_words, 2);
        assert_eq!(config.parsing.max_chars, 200);
        assert_eq!(config.pdflu.max_queries, 3);
    }

    #[test]
    fn test_config_file_nonexistent() {
        let path = PathBuf::from("/nonexistent/pdflu.conf");
        let result = load_config(Some(&path));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_config_path_is_directory() {
        let dir = tempdir().unwrap();
        let result = load_config(Some(dir.path()));
        assert!(matches!(result, Err(ConfigError::NotAFile(_))));
    }

    #[test]
    fn test_field_order() {
        let config = LookupConfig {
            field_order: "title, Author,,year".to_string(),
            ..Default::default()
        };
        assert_eq!(config.field_order(), vec!["title", "author", "year"]);
    }
}
