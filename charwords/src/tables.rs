use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{PipelineError, PipelineResult};

/// `term -> occurrences`
pub type TermCounts = HashMap<String, u64>;

/// `category -> term -> occurrences`
pub type CategoryTermCounts = HashMap<String, TermCounts>;

/// Term statistics of one document, tagged with its category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTerms {
    pub category: String,
    pub terms: TermCounts,
}

/// Total number of terms in one document, tagged with its category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLength {
    pub category: String,
    pub total: u64,
}

/// What one reducer accumulated over the categories of its bucket
#[derive(Debug, Clone, Default)]
pub struct PartialTable {
    /// Bucket owned by the reducer that produced this table
    pub bucket: usize,
    pub categories: CategoryTermCounts,
    pub terms: TermCounts,
}

impl PartialTable {
    pub fn new(bucket: usize) -> Self {
        Self {
            bucket,
            ..Self::default()
        }
    }

    /// Folds one document into the table
    pub fn add_document(&mut self, doc: DocumentTerms) {
        let table = self.categories.entry(doc.category).or_default();
        for (term, count) in doc.terms {
            *self.terms.entry(term.clone()).or_insert(0) += count;
            *table.entry(term).or_insert(0) += count;
        }
    }
}

/// Corpus and per-category lengths, built by the length aggregator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthTable {
    pub corpus_length: u64,
    pub category_length: HashMap<String, u64>,
    pub documents: u64,
}

impl LengthTable {
    pub fn add_document(&mut self, doc: DocumentLength) {
        self.corpus_length += doc.total;
        self.documents += 1;
        *self.category_length.entry(doc.category).or_insert(0) += doc.total;
    }
}

/// Global tables every score is computed from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregates {
    pub term_table: TermCounts,
    pub category_table: CategoryTermCounts,
    pub corpus_length: u64,
    pub category_length: HashMap<String, u64>,
    pub documents: u64,
}

impl Aggregates {
    /// Number of (term, category) pairs that will be scored
    pub fn pair_count(&self) -> usize {
        self.category_table.values().map(HashMap::len).sum()
    }

    /// Verifies the totals agree across the three tables.
    ///
    /// Checks `sum(category_length) == corpus_length`, that every category
    /// table sums to its category length, and that per-term sums over
    /// categories equal the global term table.
    pub fn check_invariants(&self) -> PipelineResult<()> {
        let category_sum: u64 = self.category_length.values().sum();
        if category_sum != self.corpus_length {
            return Err(PipelineError::invariant_violation(format!(
                "category lengths sum to {} but corpus length is {}",
                category_sum, self.corpus_length
            )));
        }

        let mut term_sums: TermCounts = HashMap::with_capacity(self.term_table.len());
        for (category, terms) in &self.category_table {
            let table_total: u64 = terms.values().sum();
            let length = self.category_length.get(category).copied().unwrap_or(0);
            if table_total != length {
                return Err(PipelineError::invariant_violation(format!(
                    "category {:?} has {} term occurrences but length {}",
                    category, table_total, length
                )));
            }
            for (term, count) in terms {
                *term_sums.entry(term.clone()).or_insert(0) += count;
            }
        }

        if term_sums.len() != self.term_table.len() {
            return Err(PipelineError::invariant_violation(format!(
                "{} distinct terms in category tables, {} in term table",
                term_sums.len(),
                self.term_table.len()
            )));
        }
        for (term, total) in &self.term_table {
            let summed = term_sums.get(term).copied().unwrap_or(0);
            if summed != *total {
                return Err(PipelineError::invariant_violation(format!(
                    "term {:?} counted {} times globally but {} across categories",
                    term, total, summed
                )));
            }
        }
        Ok(())
    }
}

/// One scored (term, category) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTerm {
    pub term: String,
    pub category: String,
    pub count: u64,
    pub score: f64,
}
