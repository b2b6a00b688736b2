/// Error types for the characteristic-word pipeline.
///
/// Every fatal condition a stage can hit is one variant of [`PipelineError`].
/// Stages never panic on bad input; they send the error to the pipeline
/// coordinator, which raises cancellation and hands exactly one error back to
/// the caller once every stage has shut down.
///
/// Scoring degeneracies (a term exclusive to one category, zero expectations)
/// are not errors: they are resolved in place with the sentinel score.
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while aggregating or scoring a corpus
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Traversal of {root} failed: {source}")]
    Traversal {
        root: PathBuf,
        #[source]
        source: ignore::Error,
    },
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid UTF-8 in file {path}: {source}")]
    Encoding {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("Category {category:?} reported by reducers {first} and {second}")]
    PartitionViolation {
        category: String,
        first: usize,
        second: usize,
    },
    #[error("Aggregate invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Pipeline cancelled")]
    Cancelled,
    #[error("Worker thread panicked in stage {0}")]
    WorkerPanicked(&'static str),
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    pub fn traversal(root: impl Into<PathBuf>, source: ignore::Error) -> Self {
        Self::Traversal {
            root: root.into(),
            source,
        }
    }

    pub fn file_read(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn encoding(path: impl AsRef<Path>, source: std::string::FromUtf8Error) -> Self {
        Self::Encoding {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn partition_violation(category: impl Into<String>, first: usize, second: usize) -> Self {
        Self::PartitionViolation {
            category: category.into(),
            first,
            second,
        }
    }

    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the error was raised while reading a single input file.
    ///
    /// These are the only errors the `skip` read-failure policy may swallow.
    pub fn is_per_file(&self) -> bool {
        matches!(self, Self::FileRead { .. } | Self::Encoding { .. })
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}
