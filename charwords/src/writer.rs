use std::borrow::Cow;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::OutputFormat;
use crate::errors::PipelineResult;
use crate::tables::ScoredTerm;

#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// Fractional digits of the score column
pub const SCORE_PRECISION: usize = 6;

/// Serializes scored pairs, all at once.
///
/// The whole output is rendered in memory before anything is written, so a
/// failure never leaves a partial record behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultWriter {
    format: OutputFormat,
}

impl ResultWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Renders the records in the configured format
    pub fn render(&self, scores: &[ScoredTerm]) -> PipelineResult<String> {
        match self.format {
            OutputFormat::Tsv => Ok(render_tsv(scores)),
            OutputFormat::Json => {
                let mut out = serde_json::to_string_pretty(scores)?;
                out.push_str(LINE_ENDING);
                Ok(out)
            }
        }
    }

    /// Writes every record to `out` with a single write
    pub fn write_to<W: Write>(&self, scores: &[ScoredTerm], mut out: W) -> PipelineResult<()> {
        let rendered = self.render(scores)?;
        out.write_all(rendered.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Writes every record to `path`.
    ///
    /// Records go to a temporary file next to `path` which replaces it only
    /// once fully written.
    pub fn write_file(&self, scores: &[ScoredTerm], path: &Path) -> PipelineResult<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        self.write_to(scores, tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        debug!("Wrote {} records to {}", scores.len(), path.display());
        Ok(())
    }
}

/// Escapes a text field so a record always has exactly four columns.
///
/// Backslash, tab, CR and LF become `\\`, `\t`, `\r` and `\n`.
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if !field.contains(|c: char| matches!(c, '\\' | '\t' | '\n' | '\r')) {
        return Cow::Borrowed(field);
    }
    let mut escaped = String::with_capacity(field.len() + 8);
    for c in field.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

fn render_tsv(scores: &[ScoredTerm]) -> String {
    let mut out = String::with_capacity(scores.len() * 32);
    for s in scores {
        // Writing into a String cannot fail
        let _ = write!(
            out,
            "{}\t{}\t{}\t{:.prec$}{}",
            escape_field(&s.term),
            escape_field(&s.category),
            s.count,
            s.score,
            LINE_ENDING,
            prec = SCORE_PRECISION
        );
    }
    out
}
