pub mod aggregate;
pub mod cancel;
pub mod category;
pub mod config;
pub mod counter;
pub mod errors;
pub mod filters;
pub mod metrics;
pub mod pipeline;
mod reducer;
pub mod report;
pub mod router;
pub mod scanner;
pub mod score;
pub mod tables;
pub mod writer;

pub use category::CategoryPolicy;
pub use config::{AnalysisConfig, CliOverrides};
pub use errors::{PipelineError, PipelineResult};
pub use metrics::{PipelineMetrics, PipelineStats};
pub use pipeline::{Analysis, Pipeline};
pub use report::{top_terms_per_category, CategoryReport};
pub use score::{association_score, SENTINEL_SCORE};
pub use tables::{Aggregates, ScoredTerm};
pub use writer::ResultWriter;
