//! Integration tests for pdflu
//!
//! These tests drive the lookup pipeline end to end: generated PDFs go in,
//! ranked results and BibTeX entries come out. Sources are mocks or the real
//! adapters pointed at local mock HTTP servers.

use pdflu::config::{Config, LookupConfig, ParsingConfig};
use pdflu::lookup::{run_lookup, LookupError, LookupInput};
use pdflu::models::{Identifier, Origin, SearchResult, SourceType};
use pdflu::pdf::fixture::{PdfBuilder, TextLine};
use pdflu::sources::mock::make_result;
use pdflu::sources::{ArxivSource, BibliographySource, CrossRefSource, MockSource};
use pdflu::utils::entry_for;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A two-page paper: large title, author line, a 50-word abstract paragraph
fn write_paper(dir: &TempDir, name: &str, extra: Vec<TextLine>) -> PathBuf {
    let path = dir.path().join(name);
    let abstract_text = vec!["word"; 50].join(" ");

    let mut first_page = vec![
        TextLine::new(24, 72, 720, "Deep Learning for NLP"),
        TextLine::new(12, 72, 680, "Jane Doe and John Smith"),
        TextLine::new(10, 72, 600, &abstract_text),
    ];
    first_page.extend(extra);

    PdfBuilder::new()
        .page(first_page)
        .page(vec![TextLine::new(10, 72, 720, "Introduction section text")])
        .save(&path)
        .unwrap();
    path
}

fn sources(crossref: MockSource, arxiv: MockSource) -> (Arc<MockSource>, Arc<MockSource>, Vec<Arc<dyn BibliographySource>>) {
    let crossref = Arc::new(crossref);
    let arxiv = Arc::new(arxiv);
    let list: Vec<Arc<dyn BibliographySource>> = vec![crossref.clone(), arxiv.clone()];
    (crossref, arxiv, list)
}

fn titles(results: &[SearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.title.as_str()).collect()
}

fn pdf_input(path: &Path) -> LookupInput {
    LookupInput::Pdf(path.to_path_buf())
}

#[tokio::test]
async fn test_title_box_is_queried_and_abstract_is_not() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_paper(&dir, "paper.pdf", vec![]);

    let (crossref, arxiv, list) = sources(
        MockSource::new(SourceType::CrossRef)
            .with_results(vec![make_result(SourceType::CrossRef, "Deep Learning for NLP", Some("10.1/abc"))]),
        MockSource::new(SourceType::Arxiv),
    );

    let outcome = run_lookup(&pdf_input(&path), &Config::default(), list).await.unwrap();

    assert_eq!(outcome.queries, vec!["Deep Learning for NLP"]);
    assert_eq!(crossref.queries(), vec!["Deep Learning for NLP"]);
    assert_eq!(arxiv.queries(), vec!["Deep Learning for NLP"]);
    assert_eq!(titles(&outcome.results), vec!["Deep Learning for NLP"]);
}

#[tokio::test]
async fn test_all_candidates_when_not_restricted_to_largest_font() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_paper(&dir, "paper.pdf", vec![]);

    let config = Config {
        parsing: ParsingConfig {
            largest_font_only: false,
            ..ParsingConfig::default()
        },
        pdflu: LookupConfig {
            max_queries: 0,
            ..LookupConfig::default()
        },
    };
    let (crossref, _, list) = sources(
        MockSource::new(SourceType::CrossRef)
            .with_results(vec![make_result(SourceType::CrossRef, "Hit", Some("10.1/hit"))]),
        MockSource::new(SourceType::Arxiv),
    );

    let outcome = run_lookup(&pdf_input(&path), &config, list).await.unwrap();

    // The 50-word abstract exceeds max_words on every page read
    assert_eq!(
        outcome.queries,
        vec!["Deep Learning for NLP", "Jane Doe and John Smith", "Introduction section text"]
    );
    assert_eq!(crossref.queries().len(), 3);
    for query in &outcome.queries {
        assert!(query.chars().count() <= config.parsing.max_chars);
    }
}

#[tokio::test]
async fn test_same_doi_from_both_services_keeps_crossref() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_paper(&dir, "paper.pdf", vec![]);

    let mut preprint = make_result(SourceType::Arxiv, "Deep learning for NLP (preprint)", Some("2001.00001"));
    preprint.doi = Some("10.1/abc".to_string());

    let (_, _, list) = sources(
        MockSource::new(SourceType::CrossRef)
            .with_results(vec![make_result(SourceType::CrossRef, "Deep Learning for NLP", Some("10.1/abc"))]),
        MockSource::new(SourceType::Arxiv).with_results(vec![preprint]),
    );

    let outcome = run_lookup(&pdf_input(&path), &Config::default(), list).await.unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].source, SourceType::CrossRef);
    assert_eq!(outcome.results[0].title, "Deep Learning for NLP");
}

#[tokio::test]
async fn test_no_results_from_either_service() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_paper(&dir, "paper.pdf", vec![]);

    let (_, _, list) = sources(MockSource::new(SourceType::CrossRef), MockSource::new(SourceType::Arxiv));

    let err = run_lookup(&pdf_input(&path), &Config::default(), list).await.unwrap_err();
    assert!(matches!(err, LookupError::NoResults));
    assert_eq!(err.exit_code(), 6);
    assert_eq!(err.to_string(), "No results found");
}

#[tokio::test]
async fn test_display_count_truncates_in_rank_order() {
    let many: Vec<SearchResult> = (0..10)
        .map(|i| make_result(SourceType::CrossRef, &format!("Paper {}", i), Some(&format!("10.1/{}", i))))
        .collect();
    let (_, _, list) = sources(
        MockSource::new(SourceType::CrossRef).with_results(many),
        MockSource::new(SourceType::Arxiv),
    );
    let config = Config {
        pdflu: LookupConfig {
            disp_query_results: 3,
            ..LookupConfig::default()
        },
        ..Config::default()
    };

    let outcome = run_lookup(&LookupInput::Text("papers".to_string()), &config, list)
        .await
        .unwrap();
    assert_eq!(titles(&outcome.results), vec!["Paper 0", "Paper 1", "Paper 2"]);
}

#[tokio::test]
async fn test_partial_failure_degrades_gracefully() {
    let (_, _, list) = sources(
        MockSource::new(SourceType::CrossRef).failing("connection refused"),
        MockSource::new(SourceType::Arxiv)
            .with_results(vec![make_result(SourceType::Arxiv, "Preprint", Some("2001.00001"))]),
    );

    let outcome = run_lookup(&LookupInput::Text("preprint".to_string()), &Config::default(), list)
        .await
        .unwrap();
    assert_eq!(titles(&outcome.results), vec!["Preprint"]);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].source, SourceType::CrossRef);
}

#[tokio::test]
async fn test_both_services_failing() {
    let (_, _, list) = sources(
        MockSource::new(SourceType::CrossRef).failing("timeout"),
        MockSource::new(SourceType::Arxiv).failing("timeout"),
    );

    let err = run_lookup(&LookupInput::Text("anything".to_string()), &Config::default(), list)
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::AllSourcesFailed(_)));
    assert_eq!(err.exit_code(), 5);
}

#[tokio::test]
async fn test_document_doi_is_looked_up_and_ranked_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_paper(
        &dir,
        "paper.pdf",
        vec![TextLine::new(8, 72, 100, "doi: 10.5555/target.2020")],
    );

    let target = make_result(SourceType::CrossRef, "The Target Paper", Some("10.5555/target.2020"));
    let (_, _, list) = sources(
        MockSource::new(SourceType::CrossRef)
            .with_results(vec![make_result(SourceType::CrossRef, "Unrelated Match", Some("10.1/other"))])
            .with_lookup(Identifier::doi("10.5555/TARGET.2020"), target),
        MockSource::new(SourceType::Arxiv),
    );

    let outcome = run_lookup(&pdf_input(&path), &Config::default(), list).await.unwrap();
    assert_eq!(outcome.metadata.doi.as_deref(), Some("10.5555/target.2020"));
    assert_eq!(titles(&outcome.results), vec!["The Target Paper", "Unrelated Match"]);
    assert_eq!(outcome.results[0].origin, Origin::IdentifierLookup);
}

#[tokio::test]
async fn test_published_version_replaces_looked_up_preprint() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_paper(
        &dir,
        "paper.pdf",
        vec![TextLine::new(8, 72, 100, "arXiv:2001.00001v2 [cs.CL] 3 Feb 2020")],
    );

    let mut preprint = make_result(SourceType::Arxiv, "Deep learning for NLP (preprint)", Some("2001.00001"));
    preprint.doi = Some("10.1/abc".to_string());

    let (_, _, list) = sources(
        MockSource::new(SourceType::CrossRef).with_results(vec![
            make_result(SourceType::CrossRef, "Unrelated Match", Some("10.1/other")),
            make_result(SourceType::CrossRef, "Deep Learning for NLP", Some("10.1/abc")),
        ]),
        MockSource::new(SourceType::Arxiv).with_lookup(Identifier::arxiv("2001.00001"), preprint),
    );

    let outcome = run_lookup(&pdf_input(&path), &Config::default(), list).await.unwrap();
    assert_eq!(outcome.metadata.arxiv_id.as_deref(), Some("2001.00001"));
    assert_eq!(titles(&outcome.results), vec!["Deep Learning for NLP", "Unrelated Match"]);
    assert_eq!(outcome.results[0].source, SourceType::CrossRef);
}

#[tokio::test]
async fn test_pdf_without_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blank.pdf");
    PdfBuilder::new()
        .page(vec![TextLine::new(12, 72, 720, "Lonely")])
        .save(&path)
        .unwrap();

    let (crossref, _, list) = sources(MockSource::new(SourceType::CrossRef), MockSource::new(SourceType::Arxiv));

    let err = run_lookup(&pdf_input(&path), &Config::default(), list).await.unwrap_err();
    assert!(matches!(err, LookupError::NoCandidates(_)));
    assert_eq!(err.exit_code(), 4);
    assert!(crossref.queries().is_empty());
}

#[tokio::test]
async fn test_document_title_used_when_no_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("titled.pdf");
    PdfBuilder::new()
        .page(vec![TextLine::new(12, 72, 720, "Lonely")])
        .info("Title", "A Title From The Info Dictionary")
        .save(&path)
        .unwrap();

    let (crossref, _, list) = sources(
        MockSource::new(SourceType::CrossRef)
            .with_results(vec![make_result(SourceType::CrossRef, "Found", Some("10.1/found"))]),
        MockSource::new(SourceType::Arxiv),
    );

    run_lookup(&pdf_input(&path), &Config::default(), list).await.unwrap();
    assert_eq!(crossref.queries(), vec!["A Title From The Info Dictionary"]);
}

#[tokio::test]
async fn test_unparseable_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.pdf");
    std::fs::write(&path, b"%PDF-1.5\nnot really a pdf").unwrap();

    let (_, _, list) = sources(MockSource::new(SourceType::CrossRef), MockSource::new(SourceType::Arxiv));
    let err = run_lookup(&pdf_input(&path), &Config::default(), list).await.unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_selected_result_to_bibtex() {
    let (crossref, _, list) = sources(
        MockSource::new(SourceType::CrossRef)
            .with_results(vec![make_result(SourceType::CrossRef, "Deep Learning for NLP", Some("10.1/abc"))])
            .with_bibtex("10.1/abc", "@article{Doe_2020, author={Jane Doe}, title={Deep Learning for NLP}, year={2020}, DOI={10.1/abc}}"),
        MockSource::new(SourceType::Arxiv),
    );

    let outcome = run_lookup(&LookupInput::Text("deep learning".to_string()), &Config::default(), list)
        .await
        .unwrap();
    let entry = entry_for(&outcome.results[0], Some(&*crossref as &dyn BibliographySource), &LookupConfig::default()).await;

    assert_eq!(
        entry,
        "@article{Doe_2020,\n    title = {Deep Learning for NLP},\n    author = {Jane Doe},\n    year = {2020},\n    DOI = {10.1/abc},\n}"
    );
}

#[tokio::test]
async fn test_real_adapters_against_mock_servers() {
    let mut crossref_server = mockito::Server::new_async().await;
    let mut arxiv_server = mockito::Server::new_async().await;

    let crossref_body = serde_json::json!({
        "status": "ok",
        "message": {"items": [{
            "DOI": "10.1234/test",
            "type": "journal-article",
            "title": ["Test Paper Title"],
            "author": [{"given": "Jane", "family": "Doe"}],
            "publisher": "ACME",
            "issued": {"date-parts": [[2023, 1]]},
        }]}
    });
    crossref_server
        .mock("GET", "/works")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(crossref_body.to_string())
        .create_async()
        .await;

    let feed = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>arXiv Query Results</title>
  <id>http://arxiv.org/api/abc</id>
  <updated>2023-01-16T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/2301.12345v2</id>
    <updated>2023-02-01T10:00:00Z</updated>
    <published>2023-01-15T10:00:00Z</published>
    <title>Test Paper Title</title>
    <summary>Abstract</summary>
    <author><name>Jane Doe</name></author>
    <link title="doi" href="http://dx.doi.org/10.1234/Test" rel="related"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2302.00001v1</id>
    <updated>2023-02-01T10:00:00Z</updated>
    <published>2023-02-01T10:00:00Z</published>
    <title>Another Preprint</title>
    <summary>Abstract</summary>
    <author><name>John Smith</name></author>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;
    arxiv_server
        .mock("GET", "/api/query")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/atom+xml")
        .with_body(feed)
        .create_async()
        .await;

    let crossref = CrossRefSource::new(None, Duration::from_secs(5))
        .unwrap()
        .with_base_urls(&crossref_server.url(), &crossref_server.url());
    let arxiv = ArxivSource::new(Duration::from_secs(5))
        .unwrap()
        .with_api_url(&format!("{}/api/query", arxiv_server.url()));
    let list: Vec<Arc<dyn BibliographySource>> = vec![Arc::new(crossref), Arc::new(arxiv)];

    let outcome = run_lookup(&LookupInput::Text("test paper title".to_string()), &Config::default(), list)
        .await
        .unwrap();

    // The arXiv copy shares the DOI with the Crossref record
    assert_eq!(titles(&outcome.results), vec!["Test Paper Title", "Another Preprint"]);
    assert_eq!(outcome.results[0].source, SourceType::CrossRef);
    assert_eq!(outcome.results[1].arxiv_id.as_deref(), Some("2302.00001"));

    let offline = LookupConfig {
        fetch_bibtex: false,
        ..LookupConfig::default()
    };
    let entry = entry_for(&outcome.results[1], None, &offline).await;
    assert!(entry.starts_with("@misc{smith_2023_another,\n"));
    assert!(entry.contains("    eprint = {{2302.00001v1}},\n"));
    assert!(entry.contains("    primaryClass = {{cs.CL}},\n"));
}
