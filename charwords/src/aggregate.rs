use crossbeam_channel::Receiver;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::errors::{PipelineError, PipelineResult};
use crate::reducer::StageOutput;
use crate::router::CategoryRouter;
use crate::tables::{Aggregates, LengthTable, PartialTable};

/// Merges reducer outputs into the global tables.
///
/// Term tables are summed key-wise. Category tables are unioned, which is
/// only correct because reducers own disjoint categories, so ownership is
/// checked on the way in instead of being assumed.
#[derive(Debug)]
pub struct GlobalAggregator {
    router: CategoryRouter,
    aggregates: Aggregates,
    owners: HashMap<String, usize>,
    partials: usize,
    lengths_seen: bool,
}

impl GlobalAggregator {
    pub fn new(router: CategoryRouter) -> Self {
        Self {
            router,
            aggregates: Aggregates::default(),
            owners: HashMap::new(),
            partials: 0,
            lengths_seen: false,
        }
    }

    /// Folds one reducer's table in
    pub fn merge_partial(&mut self, partial: PartialTable) -> PipelineResult<()> {
        let bucket = partial.bucket;
        for (category, terms) in partial.categories {
            let owner = self.router.bucket_of(&category);
            if owner != bucket {
                return Err(PipelineError::partition_violation(category, owner, bucket));
            }
            match self.owners.entry(category) {
                Entry::Occupied(e) => {
                    return Err(PipelineError::partition_violation(
                        e.key().clone(),
                        *e.get(),
                        bucket,
                    ));
                }
                Entry::Vacant(e) => {
                    self.aggregates
                        .category_table
                        .insert(e.key().clone(), terms);
                    e.insert(bucket);
                }
            }
        }

        let term_table = &mut self.aggregates.term_table;
        if term_table.is_empty() {
            *term_table = partial.terms;
        } else {
            for (term, count) in partial.terms {
                *term_table.entry(term).or_insert(0) += count;
            }
        }
        self.partials += 1;
        Ok(())
    }

    pub fn merge_lengths(&mut self, lengths: LengthTable) {
        self.aggregates.corpus_length += lengths.corpus_length;
        self.aggregates.documents += lengths.documents;
        for (category, length) in lengths.category_length {
            *self
                .aggregates
                .category_length
                .entry(category)
                .or_insert(0) += length;
        }
        self.lengths_seen = true;
    }

    /// Number of partial tables merged so far
    pub fn partials(&self) -> usize {
        self.partials
    }

    /// Returns the global tables once every expected producer reported
    pub fn finish(self, expected_partials: usize) -> PipelineResult<Aggregates> {
        if self.partials != expected_partials || !self.lengths_seen {
            return Err(PipelineError::invariant_violation(format!(
                "expected {} partial tables and one length table, got {} and {}",
                expected_partials,
                self.partials,
                u8::from(self.lengths_seen)
            )));
        }
        self.aggregates.check_invariants()?;
        Ok(self.aggregates)
    }
}

/// Global aggregation stage.
///
/// `outputs` has one sender per reducer plus one for the length aggregator;
/// it disconnects only after all of them finished, which is the barrier
/// this stage waits on.
pub(crate) fn merge_stage(
    outputs: Receiver<StageOutput>,
    router: CategoryRouter,
    cancel: CancelSignal,
) -> PipelineResult<Aggregates> {
    let mut aggregator = GlobalAggregator::new(router);
    let mut first_error = None;
    for output in outputs.iter() {
        if first_error.is_some() {
            // Keep draining so no producer blocks on the hand-off
            continue;
        }
        match output {
            StageOutput::Partial(partial) => {
                debug!("Merging partial table of reducer {}", partial.bucket);
                if let Err(e) = aggregator.merge_partial(partial) {
                    first_error = Some(e);
                }
            }
            StageOutput::Lengths(lengths) => aggregator.merge_lengths(lengths),
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    let aggregates = aggregator.finish(router.buckets())?;
    debug!(
        "Merged {} categories, {} terms, corpus length {}",
        aggregates.category_table.len(),
        aggregates.term_table.len(),
        aggregates.corpus_length
    );
    Ok(aggregates)
}
