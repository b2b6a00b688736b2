use crossbeam_channel::{select, Sender};
use glob::Pattern;
use ignore::{Walk, WalkBuilder};
use std::path::PathBuf;
use tracing::{debug, trace};

use crate::cancel::CancelSignal;
use crate::config::AnalysisConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::filters::{compile_ignore_patterns, should_include_file};
use crate::metrics::PipelineMetrics;

/// Lazily enumerates the segmented files under a corpus root.
///
/// Nothing touches the filesystem until the scanner is iterated. Iteration
/// yields eligible regular files in file-name order; the first traversal
/// error is yielded once and ends the sequence.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    extension: String,
    ignore_patterns: Vec<Pattern>,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            ignore_patterns: Vec::new(),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(&config.root_path, &config.file_extension)
            .with_ignore_patterns(&config.ignore_patterns)
    }

    pub fn with_ignore_patterns(mut self, patterns: &[String]) -> Self {
        self.ignore_patterns = compile_ignore_patterns(patterns);
        self
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

impl IntoIterator for Scanner {
    type Item = PipelineResult<PathBuf>;
    type IntoIter = ScanIter;

    fn into_iter(self) -> ScanIter {
        let walk = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();
        ScanIter {
            walk,
            scanner: self,
            finished: false,
        }
    }
}

/// Iterator returned by [`Scanner::into_iter`]
pub struct ScanIter {
    walk: Walk,
    scanner: Scanner,
    finished: bool,
}

impl Iterator for ScanIter {
    type Item = PipelineResult<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.walk.next() {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(PipelineError::traversal(&self.scanner.root, e)));
                }
                Some(Ok(entry)) => {
                    // Symlinks, directories, sockets and the like are skipped
                    if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                        continue;
                    }
                    let path = entry.path();
                    if should_include_file(
                        path,
                        &self.scanner.extension,
                        &self.scanner.ignore_patterns,
                    ) {
                        return Some(Ok(entry.into_path()));
                    }
                    trace!("Skipping {}", path.display());
                }
            }
        }
    }
}

/// Scanner stage: forwards paths from `source` until it is exhausted,
/// it fails, or cancellation fires.
///
/// Dropping `paths` on return is what tells the counters the stream ended.
pub(crate) fn scan_stage<I>(
    source: I,
    paths: Sender<PathBuf>,
    errors: Sender<PipelineError>,
    cancel: CancelSignal,
    metrics: PipelineMetrics,
) where
    I: IntoIterator<Item = PipelineResult<PathBuf>>,
{
    let mut sent = 0u64;
    for item in source {
        let path = match item {
            Ok(path) => path,
            Err(e) => {
                debug!("Scanner stopping after {} paths: {}", sent, e);
                let _ = errors.send(e);
                return;
            }
        };
        metrics.record_file_scanned();
        select! {
            send(paths, path) -> res => {
                if res.is_err() {
                    // Every counter is gone
                    return;
                }
                sent += 1;
            }
            recv(cancel.receiver()) -> _ => {
                debug!("Scanner cancelled after {} paths", sent);
                return;
            }
        }
    }
    debug!("Scanner finished: {} paths", sent);
}
