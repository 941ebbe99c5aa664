//! Deduplication and ranking of results pooled across sources.

use std::collections::{HashMap, HashSet};

use crate::models::{Identifier, SearchResult};
use crate::utils::normalize_title;

/// Keys under which a result may collide with another
fn identifiers(result: &SearchResult) -> Vec<Identifier> {
    let mut ids = Vec::new();
    if let Some(doi) = result.doi.as_deref().filter(|d| !d.trim().is_empty()) {
        ids.push(Identifier::doi(doi));
    }
    if let Some(id) = result.arxiv_id.as_deref().filter(|id| !id.trim().is_empty()) {
        ids.push(Identifier::arxiv(id));
    }
    ids
}

fn title_key(result: &SearchResult) -> (String, Option<String>) {
    (normalize_title(&result.title), result.year.clone())
}

/// Find duplicate results
///
/// Two results are duplicates when they share a DOI or arXiv ID, or, for a
/// result with no identifier, when normalized title and year both match.
/// Returns groups of indices (first occurrence first) with more than one member.
pub fn find_duplicates(results: &[SearchResult]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut owner: Vec<usize> = Vec::with_capacity(results.len());

    for (i, result) in results.iter().enumerate() {
        let ids = identifiers(result);
        let key = title_key(result);

        let earlier = (0..i).find(|&j| {
            let other = &results[j];
            let other_ids = identifiers(other);
            if ids.iter().any(|id| other_ids.contains(id)) {
                return true;
            }
            ids.is_empty() && !key.0.is_empty() && title_key(other) == key
        });

        match earlier {
            Some(j) => {
                let root = owner[j];
                owner.push(root);
                match groups.iter_mut().find(|g| g[0] == root) {
                    Some(group) => group.push(i),
                    None => groups.push(vec![root, i]),
                }
            }
            None => owner.push(i),
        }
    }

    groups
}

/// Collapse each duplicate group into one survivor.
///
/// The survivor is the member from the highest-priority source (earliest on
/// ties) and takes the place of the group's first member. It is paired with
/// whether any member of its group matched `context`.
fn collapse(results: Vec<SearchResult>, context: &[Identifier]) -> Vec<(SearchResult, bool)> {
    let groups = find_duplicates(&results);
    let matched: Vec<bool> = results.iter().map(|r| matches_context(r, context)).collect();

    // root index -> (survivor index, group matched)
    let mut survivors: HashMap<usize, (usize, bool)> = HashMap::new();
    let mut absorbed: HashSet<usize> = HashSet::new();
    for group in &groups {
        let best = group
            .iter()
            .copied()
            .min_by_key(|&i| results[i].source.priority())
            .unwrap_or(group[0]);
        let any_matched = group.iter().any(|&i| matched[i]);
        survivors.insert(group[0], (best, any_matched));
        absorbed.extend(group.iter().skip(1).copied());
    }

    if !absorbed.is_empty() {
        tracing::debug!("Removed {} duplicate results", absorbed.len());
    }

    let mut slots: Vec<Option<SearchResult>> = results.into_iter().map(Some).collect();
    let mut collapsed = Vec::with_capacity(slots.len() - absorbed.len());
    for i in 0..slots.len() {
        if absorbed.contains(&i) {
            continue;
        }
        let (index, is_match) = survivors.get(&i).copied().unwrap_or((i, matched[i]));
        if let Some(result) = slots[index].take() {
            collapsed.push((result, is_match));
        }
    }
    collapsed
}

/// Whether a result carries one of the identifiers found in the document
pub fn matches_context(result: &SearchResult, context: &[Identifier]) -> bool {
    identifiers(result).iter().any(|id| context.contains(id))
}

/// Deduplicate, rank and truncate to `limit` results for display.
///
/// Of each duplicate group the Crossref record is kept over the arXiv one.
/// Ranking puts identifier matches to the document first (a survivor
/// matches when any record it absorbed did), then Crossref before arXiv,
/// then discovery order (the sort is stable).
pub fn merge_results(results: Vec<SearchResult>, context: &[Identifier], limit: usize) -> Vec<SearchResult> {
    let mut collapsed = collapse(results, context);
    collapsed.sort_by_key(|(r, is_match)| (!*is_match, r.source.priority()));
    collapsed.into_iter().take(limit).map(|(r, _)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use crate::sources::mock::make_result;

    fn merge_results_all(results: Vec<SearchResult>) -> Vec<SearchResult> {
        merge_results(results, &[], usize::MAX)
    }

    fn titles(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn test_same_doi_across_sources_keeps_crossref() {
        let crossref = make_result(SourceType::CrossRef, "Deep Learning for NLP", Some("10.1/abc"));
        let mut arxiv = make_result(SourceType::Arxiv, "Deep learning for NLP (preprint)", Some("2001.00001"));
        arxiv.doi = Some("10.1/ABC".to_string());

        let merged = merge_results_all(vec![crossref, arxiv]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, SourceType::CrossRef);
        assert_eq!(merged[0].title, "Deep Learning for NLP");
    }

    #[test]
    fn test_crossref_kept_when_preprint_seen_first() {
        let mut preprint = make_result(SourceType::Arxiv, "Preprint copy", Some("2001.00001"));
        preprint.doi = Some("10.1/abc".to_string());
        let published = make_result(SourceType::CrossRef, "Published version", Some("10.1/abc"));
        let other = make_result(SourceType::Arxiv, "Other preprint", Some("2001.00009"));

        let merged = merge_results_all(vec![preprint.clone(), other.clone(), published.clone()]);
        assert_eq!(titles(&merged), vec!["Published version", "Other preprint"]);

        // The arXiv ID matched only the absorbed preprint, yet the survivor ranks first
        let context = vec![Identifier::arxiv("2001.00001")];
        let shown = merge_results(vec![other, preprint, published], &context, 10);
        assert_eq!(titles(&shown), vec!["Published version", "Other preprint"]);
        assert_eq!(shown[0].source, SourceType::CrossRef);
    }

    #[test]
    fn test_shared_arxiv_id_is_duplicate() {
        let mut with_doi = make_result(SourceType::Arxiv, "A", Some("2001.00001"));
        with_doi.doi = Some("10.1/a".to_string());
        let without_doi = make_result(SourceType::Arxiv, "A", Some("2001.00001v2"));

        assert_eq!(find_duplicates(&[with_doi, without_doi]), vec![vec![0, 1]]);
    }

    #[test]
    fn test_title_and_year_without_identifier() {
        let a = make_result(SourceType::CrossRef, "Deep Learning: for NLP", None);
        let b = make_result(SourceType::Arxiv, "deep learning for nlp", None);
        let mut c = make_result(SourceType::Arxiv, "Deep Learning for NLP", None);
        c.year = Some("2021".to_string());

        let merged = merge_results_all(vec![a, b, c]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].year.as_deref(), Some("2021"));
    }

    #[test]
    fn test_distinct_identifiers_are_kept() {
        let a = make_result(SourceType::CrossRef, "Same Title", Some("10.1/a"));
        let b = make_result(SourceType::CrossRef, "Same Title", Some("10.1/b"));
        assert!(find_duplicates(&[a, b]).is_empty());
    }

    #[test]
    fn test_rank_order() {
        let results = vec![
            make_result(SourceType::Arxiv, "arxiv first", Some("2001.00001")),
            make_result(SourceType::CrossRef, "crossref one", Some("10.1/one")),
            make_result(SourceType::Arxiv, "arxiv match", Some("2001.00002")),
            make_result(SourceType::CrossRef, "crossref two", Some("10.1/two")),
        ];
        let context = vec![Identifier::arxiv("2001.00002")];

        let ranked = merge_results(results, &context, 10);
        assert_eq!(
            titles(&ranked),
            vec!["arxiv match", "crossref one", "crossref two", "arxiv first"]
        );
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let results: Vec<SearchResult> = (0..6)
            .map(|i| {
                let source = if i % 2 == 0 { SourceType::Arxiv } else { SourceType::CrossRef };
                make_result(source, &format!("title {}", i), None)
            })
            .collect();

        let first = merge_results(results.clone(), &[], 10);
        let second = merge_results(results, &[], 10);
        assert_eq!(titles(&first), titles(&second));
        assert_eq!(titles(&first), vec!["title 1", "title 3", "title 5", "title 0", "title 2", "title 4"]);
    }

    #[test]
    fn test_merge_truncates_to_display_limit() {
        let results: Vec<SearchResult> = (0..10)
            .map(|i| make_result(SourceType::CrossRef, &format!("paper {}", i), Some(&format!("10.1/{}", i))))
            .collect();

        let shown = merge_results(results, &[], 3);
        assert_eq!(titles(&shown), vec!["paper 0", "paper 1", "paper 2"]);
    }
}
