//! Mapping from a document path to its category label.
//!
//! The pipeline treats the policy as an opaque pure function. Closures work
//! directly; the stock policies below cover the common corpus layouts.

use std::ffi::OsStr;
use std::path::Path;

use crate::config::CategoryMode;

/// Derives the category label of a document
pub trait CategoryPolicy: Send + Sync {
    fn category_of(&self, path: &Path) -> String;
}

impl<F> CategoryPolicy for F
where
    F: Fn(&Path) -> String + Send + Sync,
{
    fn category_of(&self, path: &Path) -> String {
        self(path)
    }
}

/// Text label for a path or path component.
///
/// UTF-8 input is returned unchanged. On Unix, bytes that are not valid UTF-8
/// are written as `\xNN` instead of being replaced, so two names differing
/// only in those bytes keep distinct labels. A UTF-8 name that literally
/// contains such an escape can still coincide with one. Other platforms fall
/// back to the lossy conversion.
pub fn os_label(name: &OsStr) -> String {
    if let Some(text) = name.to_str() {
        return text.to_owned();
    }
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        escape_invalid_utf8(name.as_bytes())
    }
    #[cfg(not(unix))]
    {
        name.to_string_lossy().into_owned()
    }
}

#[cfg(unix)]
fn escape_invalid_utf8(mut bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut label = String::with_capacity(bytes.len() + 8);
    loop {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                label.push_str(text);
                return label;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                label.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let invalid = e.error_len().unwrap_or(rest.len());
                for byte in &rest[..invalid] {
                    // Writing into a String cannot fail
                    let _ = write!(label, "\\x{:02x}", byte);
                }
                bytes = &rest[invalid..];
            }
        }
    }
}

/// Every document is its own category, labeled by its full path
#[derive(Debug, Clone, Copy, Default)]
pub struct PathCategory;

impl CategoryPolicy for PathCategory {
    fn category_of(&self, path: &Path) -> String {
        os_label(path.as_os_str())
    }
}

/// Documents are grouped by the name of the directory holding them
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentDirCategory;

impl CategoryPolicy for ParentDirCategory {
    fn category_of(&self, path: &Path) -> String {
        path.parent()
            .and_then(Path::file_name)
            .map(os_label)
            .unwrap_or_default()
    }
}

/// Documents are labeled by their file name minus the extension
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStemCategory;

impl CategoryPolicy for FileStemCategory {
    fn category_of(&self, path: &Path) -> String {
        path.file_stem()
            .map(os_label)
            .unwrap_or_default()
    }
}

/// Builds the stock policy selected in the configuration
pub fn policy_for(mode: CategoryMode) -> Box<dyn CategoryPolicy> {
    match mode {
        CategoryMode::Path => Box::new(PathCategory),
        CategoryMode::Parent => Box::new(ParentDirCategory),
        CategoryMode::Stem => Box::new(FileStemCategory),
    }
}
