use charwords::{
    config::{CategoryMode, OutputFormat},
    report::CategoryReport,
    top_terms_per_category, AnalysisConfig, CliOverrides, Pipeline, PipelineError,
    ResultWriter, ScoredTerm, SENTINEL_SCORE,
};
use clap::Parser;
use colored::Colorize;
use std::{io, num::NonZeroUsize, path::PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, PipelineError>;

/// Finds the words that characterize each category of a segmented corpus
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Corpus root directory
    root: Option<PathBuf>,

    /// Extension of segmented files, without the dot
    #[arg(short = 'e', long)]
    extension: Option<String>,

    /// Patterns to ignore (glob format)
    #[arg(short, long)]
    ignore: Vec<String>,

    /// Workers per pipeline stage
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// How documents map to categories (path|parent|stem)
    #[arg(short = 'c', long, value_parser = ["path", "parent", "stem"])]
    category: Option<String>,

    /// Write records to this file instead of stdout
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Record format (tsv|json)
    #[arg(long, value_parser = ["tsv", "json"])]
    format: Option<String>,

    /// Skip unreadable or undecodable files instead of aborting
    #[arg(long)]
    skip_unreadable: bool,

    /// Replace invalid UTF-8 instead of failing
    #[arg(long)]
    lossy: bool,

    /// Print the N highest scoring terms of each category
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error), RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            root_path: self.root.clone(),
            file_extension: self.extension.clone(),
            ignore_patterns: self.ignore.clone(),
            thread_count: self.threads,
            category_mode: self.category.as_deref().map(|mode| match mode {
                "parent" => CategoryMode::Parent,
                "stem" => CategoryMode::Stem,
                _ => CategoryMode::Path,
            }),
            skip_unreadable: self.skip_unreadable,
            lossy: self.lossy,
            output_format: self.format.as_deref().map(|format| match format {
                "json" => OutputFormat::Json,
                _ => OutputFormat::Tsv,
            }),
            log_level: self.log_level.clone(),
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A second initialization only happens in tests; keep the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = AnalysisConfig::load_from(cli.config.as_deref())?.merge_with_cli(cli.overrides());
    config.validate()?;
    init_logging(&config.log_level);
    debug!("Effective configuration: {:?}", config);

    let writer = ResultWriter::new(config.output_format);
    let analysis = Pipeline::new(config).run()?;

    match (&cli.output, cli.top) {
        (Some(path), _) => writer.write_file(&analysis.scores, path)?,
        // The report replaces the records on stdout
        (None, Some(_)) => {}
        (None, None) => writer.write_to(&analysis.scores, io::stdout().lock())?,
    }

    if let Some(n) = cli.top {
        print_report(&top_terms_per_category(&analysis.scores, n, false));
        let exclusive = analysis
            .scores
            .iter()
            .filter(|s| s.score == SENTINEL_SCORE)
            .count();
        println!(
            "\n{} categories, {} scored pairs, {} exclusive to one category ({})",
            analysis.aggregates.category_table.len(),
            analysis.scores.len(),
            exclusive,
            humantime::format_duration(analysis.elapsed)
        );
    }

    Ok(())
}

fn print_report(report: &[CategoryReport<'_>]) {
    for (i, category) in report.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", category.category.blue().bold());
        for scored in &category.terms {
            print_term(scored);
        }
    }
}

fn print_term(scored: &ScoredTerm) {
    println!(
        "  {} {:>8} {}",
        format!("{:<24}", scored.term).green(),
        scored.count,
        format!("{:.6}", scored.score).yellow()
    );
}
