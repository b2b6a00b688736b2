use crossbeam_channel::{select, Receiver, Sender};
use memmap2::Mmap;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::cancel::CancelSignal;
use crate::category::CategoryPolicy;
use crate::config::{EncodingMode, ReadFailurePolicy};
use crate::errors::{PipelineError, PipelineResult};
use crate::metrics::PipelineMetrics;
use crate::router::CategoryRouter;
use crate::tables::{DocumentLength, DocumentTerms, TermCounts};

// Files at or above this size are memory mapped instead of read
pub(crate) const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// Term occurrences of one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentCounts {
    pub terms: TermCounts,
    pub total: u64,
}

/// Counts whitespace-delimited terms in already segmented text.
///
/// CRLF line endings are normalized to LF before lines are split.
pub fn count_terms(content: &str) -> DocumentCounts {
    let normalized: Cow<'_, str> = if content.contains("\r\n") {
        Cow::Owned(content.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(content)
    };

    let mut terms: TermCounts = HashMap::new();
    let mut total = 0u64;
    for line in normalized.split('\n') {
        for term in line.split_whitespace() {
            *terms.entry(term.to_owned()).or_insert(0) += 1;
            total += 1;
        }
    }
    DocumentCounts { terms, total }
}

/// Decodes document bytes according to the encoding mode
fn decode_bytes<'a>(
    bytes: &'a [u8],
    path: &Path,
    encoding_mode: EncodingMode,
) -> PipelineResult<Cow<'a, str>> {
    match encoding_mode {
        EncodingMode::FailFast => match std::str::from_utf8(bytes) {
            Ok(valid) => Ok(Cow::Borrowed(valid)),
            // Rebuild as FromUtf8Error to keep the offending bytes in the error
            Err(_) => match String::from_utf8(bytes.to_vec()) {
                Ok(valid) => Ok(Cow::Owned(valid)),
                Err(e) => Err(PipelineError::encoding(path, e)),
            },
        },
        EncodingMode::Lossy => {
            let cow = String::from_utf8_lossy(bytes);
            if let Cow::Owned(_) = cow {
                warn!("Invalid UTF-8 replaced in file: {}", path.display());
            }
            Ok(cow)
        }
    }
}

/// Reads and counts one document
#[derive(Debug, Clone, Copy)]
pub struct FileCounter {
    encoding_mode: EncodingMode,
}

impl FileCounter {
    pub fn new(encoding_mode: EncodingMode) -> Self {
        Self { encoding_mode }
    }

    /// Counts a document, returning its counts and its size in bytes
    pub fn count_file(&self, path: &Path) -> PipelineResult<(DocumentCounts, u64)> {
        trace!("Counting file: {}", path.display());
        let mut file = File::open(path).map_err(|e| PipelineError::file_read(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| PipelineError::file_read(path, e))?
            .len();

        let counts = if size >= LARGE_FILE_THRESHOLD {
            // SAFETY: the corpus is read-only for the duration of the run
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| PipelineError::file_read(path, e))?;
            count_terms(&decode_bytes(&mmap, path, self.encoding_mode)?)
        } else {
            let mut bytes = Vec::with_capacity(size as usize);
            file.read_to_end(&mut bytes)
                .map_err(|e| PipelineError::file_read(path, e))?;
            count_terms(&decode_bytes(&bytes, path, self.encoding_mode)?)
        };
        Ok((counts, size))
    }
}

/// Per-worker wiring of the counter stage
pub(crate) struct CounterStage<'a> {
    pub worker: usize,
    pub counter: FileCounter,
    pub policy: &'a dyn CategoryPolicy,
    pub router: CategoryRouter,
    pub read_failure_policy: ReadFailurePolicy,
    pub paths: Receiver<PathBuf>,
    pub lengths: Sender<DocumentLength>,
    pub reducers: Vec<Sender<DocumentTerms>>,
    pub errors: Sender<PipelineError>,
    pub cancel: CancelSignal,
    pub metrics: PipelineMetrics,
}

impl CounterStage<'_> {
    /// Consumes paths until the scanner closes the queue or cancellation fires
    pub fn run(self) {
        let mut documents = 0u64;
        loop {
            let path = select! {
                recv(self.paths) -> msg => match msg {
                    Ok(path) => path,
                    Err(_) => break,
                },
                recv(self.cancel.receiver()) -> _ => {
                    debug!("Counter {} cancelled after {} documents", self.worker, documents);
                    return;
                }
            };

            let (counts, bytes) = match self.counter.count_file(&path) {
                Ok(counted) => counted,
                Err(e) if self.read_failure_policy == ReadFailurePolicy::Skip && e.is_per_file() => {
                    warn!("Skipping unreadable document: {}", e);
                    self.metrics.record_file_skipped();
                    continue;
                }
                Err(e) => {
                    let _ = self.errors.send(e);
                    return;
                }
            };

            self.metrics.record_file_counted(bytes, counts.total);
            let category = self.policy.category_of(&path);
            let bucket = self.router.bucket_of(&category);
            trace!(
                "{} -> category {:?}, bucket {}, {} terms",
                path.display(),
                category,
                bucket,
                counts.total
            );

            let length = DocumentLength {
                category: category.clone(),
                total: counts.total,
            };
            let doc = DocumentTerms {
                category,
                terms: counts.terms,
            };
            if !self.hand_off(&self.lengths, length) || !self.hand_off(&self.reducers[bucket], doc)
            {
                debug!("Counter {} stopping after {} documents", self.worker, documents);
                return;
            }
            documents += 1;
        }
        debug!("Counter {} finished: {} documents", self.worker, documents);
    }

    /// Sends `msg` unless cancellation fires first; false means stop
    fn hand_off<T>(&self, tx: &Sender<T>, msg: T) -> bool {
        select! {
            send(tx, msg) -> res => res.is_ok(),
            recv(self.cancel.receiver()) -> _ => false,
        }
    }
}
