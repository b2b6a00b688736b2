//! Log-likelihood association between a term and a category.
//!
//! For a term occurring `a` times in a category of length `b`, `c` times in
//! a corpus of length `n`:
//!
//! ```text
//! E1    = c/n * b
//! E2    = c/n * (n - b)
//! score = 2 * (a * ln(a/E1) + (c-a) * ln((c-a)/E2))
//! ```
//!
//! Pairs where the formula would divide by zero or take the log of a
//! non-positive number get [`SENTINEL_SCORE`] instead. The most common case
//! is a term that never occurs outside the category (`a == c`).

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::debug;

use crate::errors::PipelineResult;
use crate::metrics::PipelineMetrics;
use crate::tables::{Aggregates, ScoredTerm};

/// Score of a term that is maximally specific to its category
pub const SENTINEL_SCORE: f64 = 99999.0;

/// Association score of a (term, category) pair.
///
/// * `a` - occurrences of the term in the category
/// * `b` - total term occurrences in the category
/// * `c` - occurrences of the term in the whole corpus
/// * `n` - total term occurrences in the whole corpus
pub fn association_score(a: u64, b: u64, c: u64, n: u64) -> f64 {
    // Checked before any arithmetic so ln never sees a non-positive argument
    if a == 0 || a >= c || b == 0 || b >= n {
        return SENTINEL_SCORE;
    }

    let (a, b, c, n) = (a as f64, b as f64, c as f64, n as f64);
    let e1 = c / n * b;
    let e2 = c / n * (n - b);
    if e1 <= 0.0 || e2 <= 0.0 {
        return SENTINEL_SCORE;
    }

    let other = c - a;
    let t1 = a * (a / e1).ln();
    let t2 = other * (other / e2).ln();
    2.0 * (t1 + t2)
}

/// Scores every (term, category) pair of the aggregates on `threads` workers.
///
/// Work is split across all pairs, not just across categories, so a corpus
/// with few large categories still keeps the whole pool busy. Result order is
/// unspecified.
pub fn score_all(
    aggregates: &Aggregates,
    threads: usize,
    metrics: &PipelineMetrics,
) -> PipelineResult<Vec<ScoredTerm>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("charwords-score-{}", i))
        .build()?;

    let n = aggregates.corpus_length;
    let scored: Vec<ScoredTerm> = pool.install(|| {
        aggregates
            .category_table
            .par_iter()
            .flat_map(|(category, terms)| {
                let b = aggregates.category_length.get(category).copied().unwrap_or(0);
                terms.par_iter().map(move |(term, &a)| {
                    let c = aggregates.term_table.get(term).copied().unwrap_or(0);
                    ScoredTerm {
                        term: term.clone(),
                        category: category.clone(),
                        count: a,
                        score: association_score(a, b, c, n),
                    }
                })
            })
            .collect()
    });

    let sentinels = scored.iter().filter(|s| s.score == SENTINEL_SCORE).count();
    metrics.record_scored(scored.len() as u64, sentinels as u64);
    debug!("Scored {} pairs, {} sentinels", scored.len(), sentinels);
    Ok(scored)
}
