use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::score::SENTINEL_SCORE;
use crate::tables::ScoredTerm;

/// Highest scoring terms of one category
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryReport<'a> {
    pub category: &'a str,
    pub terms: Vec<&'a ScoredTerm>,
}

/// Ranks terms within each category, best first.
///
/// Categories come back sorted by name; ties on score are broken by term.
/// With `include_sentinel == false` exclusive terms are left out of the
/// ranking, since their sentinel would otherwise crowd out every real score.
pub fn top_terms_per_category(
    scores: &[ScoredTerm],
    n: usize,
    include_sentinel: bool,
) -> Vec<CategoryReport<'_>> {
    let mut by_category: BTreeMap<&str, Vec<&ScoredTerm>> = BTreeMap::new();
    for scored in scores {
        if !include_sentinel && scored.score == SENTINEL_SCORE {
            continue;
        }
        by_category
            .entry(scored.category.as_str())
            .or_default()
            .push(scored);
    }

    by_category
        .into_iter()
        .map(|(category, mut terms)| {
            terms.sort_by(|l, r| {
                r.score
                    .partial_cmp(&l.score)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| l.term.cmp(&r.term))
            });
            terms.truncate(n);
            CategoryReport { category, terms }
        })
        .collect()
}
