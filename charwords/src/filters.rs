/// Path filters applied by the scanner.
///
/// A corpus file is eligible when it carries the segmented-file extension
/// and matches none of the configured glob ignore patterns. Both checks are
/// pure functions of the path so they can run on the scanner thread without
/// touching the filesystem.
use glob::Pattern;
use std::path::Path;
use tracing::warn;

/// Checks if a file carries the expected extension (ASCII case-insensitive)
pub fn has_valid_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Compiles ignore patterns once; invalid patterns are logged and dropped
pub fn compile_ignore_patterns(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|pattern| match Pattern::new(pattern) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Ignoring invalid ignore pattern {:?}: {}", pattern, e);
                None
            }
        })
        .collect()
}

/// Checks if a path matches any of the compiled ignore patterns
pub fn should_ignore(path: &Path, ignore_patterns: &[Pattern]) -> bool {
    if ignore_patterns.is_empty() {
        return false;
    }
    // Patterns are written with forward slashes on every platform
    let normalized_path = path.to_string_lossy().replace('\\', "/");
    ignore_patterns.iter().any(|p| p.matches(&normalized_path))
}

/// Determines if a file should be fed to the counters
pub fn should_include_file(path: &Path, extension: &str, ignore_patterns: &[Pattern]) -> bool {
    has_valid_extension(path, extension) && !should_ignore(path, ignore_patterns)
}
