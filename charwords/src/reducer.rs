use crossbeam_channel::{select, Receiver, Sender};
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::metrics::PipelineMetrics;
use crate::tables::{DocumentLength, DocumentTerms, LengthTable, PartialTable};

/// What the accumulators hand to the global aggregator when they finish
#[derive(Debug)]
pub(crate) enum StageOutput {
    Partial(PartialTable),
    Lengths(LengthTable),
}

/// Sends `output` unless cancellation fires first
fn emit(output: StageOutput, tx: &Sender<StageOutput>, cancel: &CancelSignal) -> bool {
    select! {
        send(tx, output) -> res => res.is_ok(),
        recv(cancel.receiver()) -> _ => false,
    }
}

/// Reducer for one bucket.
///
/// Owns its tables outright; only documents of categories routed to
/// `bucket` ever arrive on `docs`. Emits the partial table when every
/// counter has dropped its sender, and nothing when cancelled.
pub(crate) fn reduce_stage(
    bucket: usize,
    docs: Receiver<DocumentTerms>,
    out: Sender<StageOutput>,
    cancel: CancelSignal,
    metrics: PipelineMetrics,
) {
    let mut table = PartialTable::new(bucket);
    let mut received = 0u64;
    loop {
        select! {
            recv(docs) -> msg => match msg {
                Ok(doc) => {
                    table.add_document(doc);
                    metrics.record_reduced();
                    received += 1;
                }
                Err(_) => break,
            },
            recv(cancel.receiver()) -> _ => {
                debug!("Reducer {} cancelled after {} documents", bucket, received);
                return;
            }
        }
    }

    debug!(
        "Reducer {} finished: {} documents, {} categories, {} terms",
        bucket,
        received,
        table.categories.len(),
        table.terms.len()
    );
    emit(StageOutput::Partial(table), &out, &cancel);
}

/// Single consumer of every document length record
pub(crate) fn length_stage(
    lengths: Receiver<DocumentLength>,
    out: Sender<StageOutput>,
    cancel: CancelSignal,
) {
    let mut table = LengthTable::default();
    loop {
        select! {
            recv(lengths) -> msg => match msg {
                Ok(doc) => table.add_document(doc),
                Err(_) => break,
            },
            recv(cancel.receiver()) -> _ => {
                debug!("Length aggregator cancelled after {} documents", table.documents);
                return;
            }
        }
    }

    debug!(
        "Length aggregator finished: {} documents, corpus length {}",
        table.documents, table.corpus_length
    );
    emit(StageOutput::Lengths(table), &out, &cancel);
}
