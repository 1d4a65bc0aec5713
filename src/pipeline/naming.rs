//! Split a storage path into base name and extension.
//!
//! Only the last path segment is inspected, so dots in folder names never
//! leak into the extension. A file name with exactly two dots yields a
//! compound extension made of the last two segments (`backup.tar.gz` →
//! `tar.gz`); every other name splits at its last dot.

use crate::storage::split_path;

/// A source path broken into the parts the watcher routes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceName {
    /// Path without the extension, e.g. `/To Convert/report`.
    pub stem_path: String,
    /// Possibly compound; empty when the name has no dot.
    pub extension: String,
    /// Last segment of `stem_path`, e.g. `report`.
    pub file_base_name: String,
    /// Last segment of the path exactly as listed, e.g. `report.docx`.
    pub file_name: String,
}

impl SourceName {
    pub fn parse(path: &str) -> Self {
        let (folder, file) = split_path(path);
        let segments: Vec<&str> = file.split('.').collect();

        let (base, extension) = match segments.as_slice() {
            [only] => (only.to_string(), String::new()),
            [base, first, second] => (base.to_string(), format!("{first}.{second}")),
            _ => match file.rsplit_once('.') {
                Some((base, ext)) => (base.to_string(), ext.to_string()),
                None => (file.to_string(), String::new()),
            },
        };

        Self {
            stem_path: format!("{folder}/{base}"),
            extension,
            file_base_name: base,
            file_name: file.to_string(),
        }
    }
}
