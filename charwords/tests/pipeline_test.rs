use anyhow::Result;
use charwords::category::ParentDirCategory;
use charwords::config::{CategoryMode, EncodingMode, ReadFailurePolicy};
use charwords::counter::count_terms;
use charwords::router::CategoryRouter;
use charwords::scanner::Scanner;
use charwords::{
    AnalysisConfig, CategoryPolicy, Pipeline, PipelineError, ResultWriter, SENTINEL_SCORE,
};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

/// Routes pipeline logs through the test harness; filter with RUST_LOG
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(root: &Path, threads: usize) -> AnalysisConfig {
    let mut config = AnalysisConfig::new(root);
    config.thread_count = NonZeroUsize::new(threads).unwrap();
    config.channel_capacity = 4;
    config
}

fn write_doc(root: &Path, rel: &str, content: &str) -> Result<PathBuf> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, content)?;
    Ok(path)
}

fn example_corpus() -> Result<TempDir> {
    let dir = tempdir()?;
    write_doc(dir.path(), "A/one.seg", "x y x\n")?;
    write_doc(dir.path(), "A/two.seg", "y y\n")?;
    write_doc(dir.path(), "B/one.seg", "x x z\n")?;
    Ok(dir)
}

/// Small deterministic generator so the corpus is the same on every run
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn generated_corpus(docs: usize) -> Result<TempDir> {
    let dir = tempdir()?;
    let mut rng = Lcg(42);
    for i in 0..docs {
        let category = format!("cat{}", rng.next() % 13);
        let mut content = String::new();
        for line in 0..(rng.next() % 6) {
            for _ in 0..(rng.next() % 12) {
                content.push_str(&format!("w{} ", rng.next() % 60));
            }
            content.push_str(if line % 2 == 0 { "\n" } else { "\r\n" });
        }
        write_doc(dir.path(), &format!("{}/doc_{}.seg", category, i), &content)?;
    }
    Ok(dir)
}

#[test]
fn test_end_to_end_example() -> Result<()> {
    let dir = example_corpus()?;
    let mut config = config(dir.path(), 3);
    config.category_mode = CategoryMode::Parent;

    let analysis = Pipeline::new(config).run()?;
    let aggregates = &analysis.aggregates;

    assert_eq!(aggregates.corpus_length, 8);
    assert_eq!(aggregates.documents, 3);
    assert_eq!(aggregates.category_length["A"], 5);
    assert_eq!(aggregates.category_length["B"], 3);
    assert_eq!(aggregates.term_table["x"], 4);
    assert_eq!(aggregates.term_table["y"], 3);
    assert_eq!(aggregates.term_table["z"], 1);
    assert_eq!(aggregates.category_table["A"]["x"], 2);
    assert_eq!(aggregates.category_table["A"]["y"], 3);
    assert_eq!(aggregates.category_table["B"]["x"], 2);
    assert_eq!(aggregates.category_table["B"]["z"], 1);

    let scores: HashMap<(&str, &str), f64> = analysis
        .scores
        .iter()
        .map(|s| ((s.term.as_str(), s.category.as_str()), s.score))
        .collect();
    assert_eq!(scores.len(), 4);
    assert_eq!(scores[&("y", "A")], SENTINEL_SCORE);
    assert_eq!(scores[&("z", "B")], SENTINEL_SCORE);

    let closed_form = |a: f64, b: f64, c: f64, n: f64| {
        let e1 = c / n * b;
        let e2 = c / n * (n - b);
        2.0 * (a * (a / e1).ln() + (c - a) * ((c - a) / e2).ln())
    };
    assert!((scores[&("x", "A")] - closed_form(2.0, 5.0, 4.0, 8.0)).abs() < 1e-6);
    assert!((scores[&("x", "B")] - closed_form(2.0, 3.0, 4.0, 8.0)).abs() < 1e-6);

    let stats = analysis.stats;
    assert_eq!(stats.files_scanned, 3);
    assert_eq!(stats.files_counted, 3);
    assert_eq!(stats.pairs_scored, 4);
    assert_eq!(stats.sentinel_scores, 2);
    Ok(())
}

#[test]
fn test_closure_category_policy() -> Result<()> {
    let dir = example_corpus()?;
    let pipeline = Pipeline::new(config(dir.path(), 2)).with_category_policy(|path: &Path| {
        let parent = path.parent().and_then(Path::file_name);
        format!("group-{}", parent.unwrap_or_default().to_string_lossy())
    });

    let aggregates = pipeline.aggregate()?;
    let categories: Vec<&String> = aggregates.category_table.keys().collect();
    assert_eq!(categories.len(), 2);
    assert_eq!(aggregates.category_length["group-A"], 5);
    Ok(())
}

#[test]
fn test_aggregates_match_serial_count() -> Result<()> {
    let dir = generated_corpus(300)?;

    // Serial reference
    let mut term_table: HashMap<String, u64> = HashMap::new();
    let mut category_length: HashMap<String, u64> = HashMap::new();
    let mut corpus_length = 0;
    for path in Scanner::new(dir.path(), "seg") {
        let path = path?;
        let counts = count_terms(&fs::read_to_string(&path)?);
        let category = ParentDirCategory.category_of(&path);
        *category_length.entry(category).or_insert(0) += counts.total;
        corpus_length += counts.total;
        for (term, count) in counts.terms {
            *term_table.entry(term).or_insert(0) += count;
        }
    }

    for threads in [1, 2, 4, 7] {
        let mut config = config(dir.path(), threads);
        config.category_mode = CategoryMode::Parent;
        let aggregates = Pipeline::new(config).aggregate()?;

        assert_eq!(aggregates.documents, 300, "threads={}", threads);
        assert_eq!(aggregates.corpus_length, corpus_length);
        assert_eq!(aggregates.term_table, term_table);
        assert_eq!(aggregates.category_length, category_length);
        assert_eq!(
            aggregates.category_length.values().sum::<u64>(),
            aggregates.corpus_length
        );

        // Column sums of the category table give the term table back
        let mut column_sums: HashMap<&str, u64> = HashMap::new();
        for terms in aggregates.category_table.values() {
            for (term, count) in terms {
                *column_sums.entry(term.as_str()).or_insert(0) += count;
            }
        }
        assert_eq!(column_sums.len(), aggregates.term_table.len());
        for (term, count) in &aggregates.term_table {
            assert_eq!(column_sums[term.as_str()], *count, "term {}", term);
        }
    }
    Ok(())
}

#[test]
fn test_each_category_has_one_owner() -> Result<()> {
    let dir = generated_corpus(120)?;
    let mut config = config(dir.path(), 5);
    config.category_mode = CategoryMode::Parent;
    let aggregates = Pipeline::new(config).aggregate()?;

    // Categories spread over several reducers and none went missing on merge
    let router = CategoryRouter::new(5);
    let mut owners: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for category in aggregates.category_table.keys() {
        owners
            .entry(router.bucket_of(category))
            .or_default()
            .push(category);
    }
    assert!(owners.len() > 1);
    let mut tabled: Vec<&String> = aggregates.category_table.keys().collect();
    let mut measured: Vec<&String> = aggregates.category_length.keys().collect();
    tabled.sort();
    measured.sort();
    assert_eq!(tabled, measured);
    Ok(())
}

#[test]
fn test_sentinel_for_exclusive_terms() -> Result<()> {
    let dir = generated_corpus(80)?;
    let mut config = config(dir.path(), 3);
    config.category_mode = CategoryMode::Parent;
    let analysis = Pipeline::new(config).run()?;

    assert_eq!(analysis.scores.len(), analysis.aggregates.pair_count());
    for scored in &analysis.scores {
        let c = analysis.aggregates.term_table[&scored.term];
        if c == scored.count {
            assert_eq!(scored.score, SENTINEL_SCORE, "{:?}", scored);
        }
    }
    Ok(())
}

#[test]
fn test_scan_filter() -> Result<()> {
    let dir = tempdir()?;
    write_doc(dir.path(), "a.seg", "kept\n")?;
    write_doc(dir.path(), "nested/deeper/b.SEG", "kept too\n")?;
    write_doc(dir.path(), "c.txt", "dropped\n")?;
    write_doc(dir.path(), "seg", "dropped\n")?;
    write_doc(dir.path(), "drafts/d.seg", "dropped\n")?;
    fs::create_dir_all(dir.path().join("folder.seg"))?;

    #[cfg(unix)]
    std::os::unix::fs::symlink(dir.path().join("a.seg"), dir.path().join("link.seg"))?;

    let mut config = config(dir.path(), 2);
    config.ignore_patterns = vec!["**/drafts/**".to_string()];
    let aggregates = Pipeline::new(config).aggregate()?;

    assert_eq!(aggregates.documents, 2);
    assert_eq!(aggregates.corpus_length, 3);
    assert!(!aggregates.term_table.contains_key("dropped"));
    Ok(())
}

#[test]
fn test_invalid_utf8_policies() -> Result<()> {
    let dir = tempdir()?;
    write_doc(dir.path(), "good.seg", "a b\n")?;
    fs::write(dir.path().join("bad.seg"), [b'c', b' ', 0xff, 0xfe, b'\n'])?;

    let err = Pipeline::new(config(dir.path(), 2)).aggregate().unwrap_err();
    assert!(matches!(err, PipelineError::Encoding { .. }), "{:?}", err);

    let mut skipping = config(dir.path(), 2);
    skipping.read_failure_policy = ReadFailurePolicy::Skip;
    let pipeline = Pipeline::new(skipping);
    let aggregates = pipeline.aggregate()?;
    assert_eq!(aggregates.documents, 1);
    assert_eq!(pipeline.metrics().get_stats().files_skipped, 1);

    let mut lossy = config(dir.path(), 2);
    lossy.encoding_mode = EncodingMode::Lossy;
    let aggregates = Pipeline::new(lossy).aggregate()?;
    assert_eq!(aggregates.documents, 2);
    assert_eq!(aggregates.term_table["c"], 1);
    Ok(())
}

#[test]
fn test_many_read_failures_report_one_error() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let source: Vec<_> = (0..500)
        .map(|i| Ok(dir.path().join(format!("missing_{}.seg", i))))
        .collect();

    let err = Pipeline::new(config(dir.path(), 4))
        .aggregate_from(source)
        .unwrap_err();
    assert!(matches!(err, PipelineError::FileRead { .. }), "{:?}", err);
    Ok(())
}

#[test]
fn test_traversal_error_cancels_run() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let doc = write_doc(dir.path(), "doc.seg", "alpha beta gamma\n")?;
    let root = dir.path().to_path_buf();

    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let source = (0..200_000).map(move |i| {
            if i == 2_000 {
                let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
                Err(PipelineError::traversal(&root, ignore::Error::from(io)))
            } else {
                Ok(doc.clone())
            }
        });
        let result = Pipeline::new(config(dir.path(), 4)).aggregate_from(source);
        let _ = tx.send(result);
    });

    let result = rx
        .recv_timeout(Duration::from_secs(30))
        .expect("pipeline did not shut down after a traversal error");
    handle.join().expect("pipeline thread panicked");

    match result {
        Err(PipelineError::Traversal { .. }) => Ok(()),
        other => panic!("expected a single traversal error, got {:?}", other),
    }
}

#[test]
fn test_empty_documents_still_count() -> Result<()> {
    let dir = tempdir()?;
    write_doc(dir.path(), "A/empty.seg", "")?;
    write_doc(dir.path(), "A/blank.seg", "\n\r\n  \n")?;
    write_doc(dir.path(), "B/words.seg", "q\n")?;

    let mut config = config(dir.path(), 2);
    config.category_mode = CategoryMode::Parent;
    let aggregates = Pipeline::new(config).aggregate()?;

    assert_eq!(aggregates.documents, 3);
    assert_eq!(aggregates.category_length["A"], 0);
    assert_eq!(aggregates.corpus_length, 1);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_tsv_records_survive_tabs_in_paths() -> Result<()> {
    let dir = tempdir()?;
    write_doc(dir.path(), "a\tb.seg", "x\n")?;
    write_doc(dir.path(), "c.seg", "x\n")?;

    let analysis = Pipeline::new(config(dir.path(), 2)).run()?;
    let rendered = ResultWriter::default().render(&analysis.scores)?;

    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        assert_eq!(line.split('\t').count(), 4, "{:?}", line);
    }
    assert!(rendered.contains("a\\tb.seg"));
    Ok(())
}
