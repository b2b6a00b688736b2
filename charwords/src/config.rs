use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::PipelineResult;

/// Configuration for one characteristic-word run.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.charwords.yaml` in the current directory
/// 3. Global `$HOME/.config/charwords/config.yaml`
///
/// # Configuration Format
///
/// ```yaml
/// # Corpus root
/// root_path: "corpus"
///
/// # Extension of the pre-segmented files
/// file_extension: "seg"
///
/// # Patterns to ignore (glob syntax)
/// ignore_patterns:
///   - "**/drafts/**"
///
/// # Workers per stage (default: CPU cores)
/// thread_count: 8
///
/// # Bounded hand-off queue size between stages
/// channel_capacity: 64
///
/// # How a file path maps to a category (path, parent, stem)
/// category_mode: "parent"
///
/// # What to do with unreadable files (fail_fast, skip)
/// read_failure_policy: "fail_fast"
///
/// # How to decode invalid UTF-8 (fail_fast, lossy)
/// encoding_mode: "fail_fast"
///
/// # Output format (tsv, json)
/// output_format: "tsv"
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
///
/// Command-line arguments take precedence over file values, see
/// [`AnalysisConfig::merge_with_cli`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Root directory of the corpus
    pub root_path: PathBuf,

    /// Extension of eligible segmented files, without the dot
    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    /// Patterns to ignore (supports glob syntax)
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Number of workers in each parallel stage
    #[serde(default = "default_thread_count")]
    pub thread_count: NonZeroUsize,

    /// Capacity of the bounded queues between stages
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default)]
    pub category_mode: CategoryMode,

    #[serde(default)]
    pub read_failure_policy: ReadFailurePolicy,

    #[serde(default)]
    pub encoding_mode: EncodingMode,

    #[serde(default)]
    pub output_format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Stock policies for deriving a category label from a document path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryMode {
    /// The full path is the category, one category per document
    #[default]
    Path,
    /// Name of the directory containing the document
    Parent,
    /// File name without its extension
    Stem,
}

/// What a counter does when a document cannot be read or decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFailurePolicy {
    /// Abort the whole run
    #[default]
    FailFast,
    /// Log a warning, count the file as skipped and continue
    Skip,
}

/// How to handle invalid UTF-8 in input documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMode {
    #[default]
    FailFast,
    /// Replace invalid sequences with U+FFFD
    Lossy,
}

/// Serialization of the scored records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// `term<TAB>category<TAB>count<TAB>score`, one record per line
    #[default]
    Tsv,
    Json,
}

fn default_file_extension() -> String {
    "seg".to_string()
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_channel_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

impl AnalysisConfig {
    /// Creates a configuration with default values for the given corpus root
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            file_extension: default_file_extension(),
            ignore_patterns: Vec::new(),
            thread_count: default_thread_count(),
            channel_capacity: default_channel_capacity(),
            category_mode: CategoryMode::default(),
            read_failure_policy: ReadFailurePolicy::default(),
            encoding_mode: EncodingMode::default(),
            output_format: OutputFormat::default(),
            log_level: default_log_level(),
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> PipelineResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus a specific file.
    ///
    /// Values are not validated here: command line overrides may still
    /// replace them, so call [`AnalysisConfig::validate`] after
    /// [`AnalysisConfig::merge_with_cli`].
    pub fn load_from(config_path: Option<&Path>) -> PipelineResult<Self> {
        let mut builder = ConfigBuilder::builder()
            .set_default("root_path", ".")?;

        let config_files = [
            dirs::config_dir().map(|p| p.join("charwords/config.yaml")),
            Some(PathBuf::from(".charwords.yaml")),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicitly requested file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Rejects values the pipeline cannot run with
    pub fn validate(&self) -> PipelineResult<()> {
        if self.channel_capacity == 0 {
            return Err(crate::PipelineError::config_error(
                "channel_capacity must be at least 1",
            ));
        }
        if self.file_extension.is_empty() || self.file_extension.starts_with('.') {
            return Err(crate::PipelineError::config_error(format!(
                "file_extension must be a bare extension, got {:?}",
                self.file_extension
            )));
        }
        Ok(())
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli: CliOverrides) -> Self {
        if let Some(root) = cli.root_path {
            self.root_path = root;
        }
        if let Some(ext) = cli.file_extension {
            self.file_extension = ext;
        }
        if !cli.ignore_patterns.is_empty() {
            self.ignore_patterns = cli.ignore_patterns;
        }
        if let Some(threads) = cli.thread_count {
            self.thread_count = threads;
        }
        if let Some(mode) = cli.category_mode {
            self.category_mode = mode;
        }
        if cli.skip_unreadable {
            self.read_failure_policy = ReadFailurePolicy::Skip;
        }
        if cli.lossy {
            self.encoding_mode = EncodingMode::Lossy;
        }
        if let Some(format) = cli.output_format {
            self.output_format = format;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        self
    }
}

/// Values given on the command line; `None`/`false` leaves the file value alone
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_path: Option<PathBuf>,
    pub file_extension: Option<String>,
    pub ignore_patterns: Vec<String>,
    pub thread_count: Option<NonZeroUsize>,
    pub category_mode: Option<CategoryMode>,
    pub skip_unreadable: bool,
    pub lossy: bool,
    pub output_format: Option<OutputFormat>,
    pub log_level: Option<String>,
}
