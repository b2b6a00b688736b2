//! Stage wiring, shutdown and error funnelling for one run.
//!
//! ```text
//! scanner ─paths─▶ counters ×W ─┬─docs (by bucket)─▶ reducers ×W ─┐
//!                               └─lengths─────────▶ length agg. ──┴─▶ merge ─▶ scorers ×W
//! ```
//!
//! Scoring starts only once aggregation has returned, and it has no hand-offs
//! to block on, so cancellation covers the aggregation stages alone.
//!
//! Every queue is bounded and every blocking send or receive also waits on
//! the cancellation signal. Each stage owns its accumulators; data moves only
//! as whole records or whole tables. A queue closes when its last sender is
//! dropped, so "all N producers finished" needs no extra bookkeeping.
//!
//! Fatal errors travel on an unbounded channel to the coordinating thread.
//! The first one fires cancellation; the coordinator then waits until every
//! stage has exited and returns that error alone.

use crossbeam_channel::{bounded, unbounded};
use std::path::PathBuf;
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::aggregate::merge_stage;
use crate::cancel::cancellation;
use crate::category::{policy_for, CategoryPolicy};
use crate::config::AnalysisConfig;
use crate::counter::{CounterStage, FileCounter};
use crate::errors::{PipelineError, PipelineResult};
use crate::metrics::{PipelineMetrics, PipelineStats};
use crate::reducer::{length_stage, reduce_stage, StageOutput};
use crate::router::CategoryRouter;
use crate::scanner::{scan_stage, Scanner};
use crate::score::score_all;
use crate::tables::{Aggregates, DocumentLength, DocumentTerms, ScoredTerm};

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct Analysis {
    pub aggregates: Aggregates,
    pub scores: Vec<ScoredTerm>,
    pub stats: PipelineStats,
    pub elapsed: Duration,
}

/// A configured characteristic-word run
pub struct Pipeline {
    config: AnalysisConfig,
    policy: Box<dyn CategoryPolicy>,
    metrics: PipelineMetrics,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

fn spawn_stage<'scope, 'env, F, T>(
    scope: &'scope Scope<'scope, 'env>,
    name: String,
    f: F,
) -> PipelineResult<ScopedJoinHandle<'scope, T>>
where
    F: FnOnce() -> T + Send + 'scope,
    T: Send + 'scope,
{
    Ok(thread::Builder::new().name(name).spawn_scoped(scope, f)?)
}

impl Pipeline {
    /// Creates a pipeline using the category policy selected in `config`
    pub fn new(config: AnalysisConfig) -> Self {
        let policy = policy_for(config.category_mode);
        Self {
            config,
            policy,
            metrics: PipelineMetrics::new(),
        }
    }

    /// Replaces the category policy
    pub fn with_category_policy<P>(mut self, policy: P) -> Self
    where
        P: CategoryPolicy + 'static,
    {
        self.policy = Box::new(policy);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Counters shared by every run of this pipeline
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Scans the configured root and aggregates it
    pub fn aggregate(&self) -> PipelineResult<Aggregates> {
        self.aggregate_from(Scanner::from_config(&self.config))
    }

    /// Aggregates the documents yielded by `source`.
    ///
    /// An `Err` item from the source is treated as a traversal failure: it
    /// ends the scan and aborts the run.
    pub fn aggregate_from<I>(&self, source: I) -> PipelineResult<Aggregates>
    where
        I: IntoIterator<Item = PipelineResult<PathBuf>> + Send,
    {
        let workers = self.config.thread_count.get();
        let capacity = self.config.channel_capacity.max(1);
        let router = CategoryRouter::new(workers);
        let counter = FileCounter::new(self.config.encoding_mode);
        let read_failure_policy = self.config.read_failure_policy;
        let policy: &dyn CategoryPolicy = self.policy.as_ref();

        debug!(
            "Starting aggregation with {} workers per stage, queue capacity {}",
            workers, capacity
        );

        thread::scope(|s| {
            // Declared inside the scope so an early return fires it before
            // the scope waits on the stages already started
            let (mut trigger, cancel) = cancellation();
            let (err_tx, err_rx) = unbounded::<PipelineError>();
            let (path_tx, path_rx) = bounded::<PathBuf>(capacity);
            let (len_tx, len_rx) = bounded::<DocumentLength>(capacity);
            let (doc_txs, doc_rxs): (Vec<_>, Vec<_>) = (0..workers)
                .map(|_| bounded::<DocumentTerms>(capacity))
                .unzip();
            // One slot per producer, so finishing never waits on the merger
            let (out_tx, out_rx) = bounded::<StageOutput>(workers + 1);

            let mut stages: Vec<(&'static str, ScopedJoinHandle<'_, ()>)> =
                Vec::with_capacity(3 * workers + 2);

            let (errors, signal, metrics) = (err_tx.clone(), cancel.clone(), self.metrics.clone());
            stages.push((
                "scanner",
                spawn_stage(s, "charwords-scan".to_string(), move || {
                    scan_stage(source, path_tx, errors, signal, metrics)
                })?,
            ));

            for worker in 0..workers {
                let stage = CounterStage {
                    worker,
                    counter,
                    policy,
                    router,
                    read_failure_policy,
                    paths: path_rx.clone(),
                    lengths: len_tx.clone(),
                    reducers: doc_txs.clone(),
                    errors: err_tx.clone(),
                    cancel: cancel.clone(),
                    metrics: self.metrics.clone(),
                };
                stages.push((
                    "counter",
                    spawn_stage(s, format!("charwords-count-{}", worker), move || stage.run())?,
                ));
            }
            // Only counters may hold these now, so the downstream queues
            // close exactly when the last counter exits
            drop(path_rx);
            drop(len_tx);
            drop(doc_txs);
            drop(err_tx);

            for (bucket, docs) in doc_rxs.into_iter().enumerate() {
                let (out, signal, metrics) = (out_tx.clone(), cancel.clone(), self.metrics.clone());
                stages.push((
                    "reducer",
                    spawn_stage(s, format!("charwords-reduce-{}", bucket), move || {
                        reduce_stage(bucket, docs, out, signal, metrics)
                    })?,
                ));
            }

            let (out, signal) = (out_tx.clone(), cancel.clone());
            stages.push((
                "length",
                spawn_stage(s, "charwords-length".to_string(), move || {
                    length_stage(len_rx, out, signal)
                })?,
            ));
            drop(out_tx);

            let signal = cancel.clone();
            let merger = spawn_stage(s, "charwords-merge".to_string(), move || {
                merge_stage(out_rx, router, signal)
            })?;

            // Ends once the scanner and every counter have exited
            let mut first_error = None;
            for err in err_rx.iter() {
                if first_error.is_none() {
                    warn!("Aborting run: {}", err);
                    trigger.fire();
                    first_error = Some(err);
                } else {
                    debug!("Suppressed follow-up error: {}", err);
                }
            }

            let mut panicked = None;
            for (stage, handle) in stages {
                if handle.join().is_err() {
                    trigger.fire();
                    panicked.get_or_insert(stage);
                }
            }
            let merged = merger.join();
            trigger.fire();

            if let Some(err) = first_error {
                return Err(err);
            }
            if let Some(stage) = panicked {
                return Err(PipelineError::WorkerPanicked(stage));
            }
            merged.map_err(|_| PipelineError::WorkerPanicked("merge"))?
        })
    }

    /// Scans, aggregates and scores the configured corpus
    pub fn run(&self) -> PipelineResult<Analysis> {
        self.run_from(Scanner::from_config(&self.config))
    }

    /// Aggregates and scores the documents yielded by `source`
    pub fn run_from<I>(&self, source: I) -> PipelineResult<Analysis>
    where
        I: IntoIterator<Item = PipelineResult<PathBuf>> + Send,
    {
        let start = Instant::now();
        info!("Analyzing corpus at {}", self.config.root_path.display());

        let aggregates = self.aggregate_from(source)?;
        info!(
            "Aggregated {} documents: {} categories, {} distinct terms, corpus length {}",
            aggregates.documents,
            aggregates.category_table.len(),
            aggregates.term_table.len(),
            aggregates.corpus_length
        );

        let scores = score_all(&aggregates, self.config.thread_count.get(), &self.metrics)?;

        let elapsed = start.elapsed();
        info!(
            "Scored {} pairs in {}",
            scores.len(),
            humantime::format_duration(elapsed)
        );
        self.metrics.log_stats();

        Ok(Analysis {
            aggregates,
            scores,
            stats: self.metrics.get_stats(),
            elapsed,
        })
    }
}
