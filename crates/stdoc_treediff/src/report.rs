//! Structured diff report types.

use std::fmt;
use std::fs::FileType;
use std::path::PathBuf;

use serde::Serialize;

/// What kind of filesystem entry lives at a relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Symlink => "symlink",
        }
    }
}

impl From<FileType> for EntryKind {
    fn from(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How two entries at the same relative path differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mismatch {
    /// Both sides are UTF-8 text; carries a unified diff (reference is `-`, generated is `+`).
    Text { unified_diff: String },
    /// At least one side is not UTF-8.
    Binary { reference_len: u64, generated_len: u64 },
    /// Both sides are symlinks pointing at different targets.
    SymlinkTarget { reference: PathBuf, generated: PathBuf },
    /// The entry kinds differ (e.g. file in the reference, directory in the generated tree).
    TypeConflict { reference: EntryKind, generated: EntryKind },
}

/// Classification of a single discrepancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscrepancyKind {
    MissingInGenerated { entry: EntryKind },
    MissingInReference { entry: EntryKind },
    ContentMismatch { mismatch: Mismatch },
    /// The generated root itself is absent. Always the only entry in its report.
    GeneratedTreeMissing,
}

/// A path-level difference between the reference and generated trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    /// Path relative to the tree roots, `/`-separated. Empty for [`DiscrepancyKind::GeneratedTreeMissing`].
    pub path: String,
    #[serde(flatten)]
    pub kind: DiscrepancyKind,
}

impl Discrepancy {
    pub fn is_content_mismatch(&self) -> bool {
        matches!(self.kind, DiscrepancyKind::ContentMismatch { .. })
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiscrepancyKind::MissingInGenerated { entry } => {
                write!(f, "missing in generated: {} ({entry})", self.path)
            }
            DiscrepancyKind::MissingInReference { entry } => {
                write!(f, "missing in reference: {} ({entry})", self.path)
            }
            DiscrepancyKind::GeneratedTreeMissing => f.write_str("generated tree missing"),
            DiscrepancyKind::ContentMismatch { mismatch } => match mismatch {
                Mismatch::Text { unified_diff } => {
                    writeln!(f, "content mismatch: {}", self.path)?;
                    f.write_str(unified_diff.trim_end_matches('\n'))
                }
                Mismatch::Binary {
                    reference_len,
                    generated_len,
                } => write!(
                    f,
                    "binary content mismatch: {} (reference {reference_len} bytes, generated {generated_len} bytes)",
                    self.path
                ),
                Mismatch::SymlinkTarget { reference, generated } => write!(
                    f,
                    "symlink target mismatch: {} (reference -> {}, generated -> {})",
                    self.path,
                    reference.display(),
                    generated.display()
                ),
                Mismatch::TypeConflict { reference, generated } => write!(
                    f,
                    "type conflict: {} (reference is a {reference}, generated is a {generated})",
                    self.path
                ),
            },
        }
    }
}

/// Result of comparing one reference tree against one generated tree.
///
/// An empty report means the trees are identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub entries: Vec<Discrepancy>,
}

impl DiffReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn generated_tree_missing() -> Self {
        Self {
            entries: vec![Discrepancy {
                path: String::new(),
                kind: DiscrepancyKind::GeneratedTreeMissing,
            }],
        }
    }

    pub(crate) fn push(&mut self, path: String, kind: DiscrepancyKind) {
        self.entries.push(Discrepancy { path, kind });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Discrepancy> {
        self.entries.iter()
    }

    /// Look up the entry for a relative path.
    pub fn get(&self, path: &str) -> Option<&Discrepancy> {
        self.entries.iter().find(|d| d.path == path)
    }
}

impl<'a> IntoIterator for &'a DiffReport {
    type Item = &'a Discrepancy;
    type IntoIter = std::slice::Iter<'a, Discrepancy>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> DiffReport {
        let mut report = DiffReport::new();
        report.push(
            "assets".to_string(),
            DiscrepancyKind::ContentMismatch {
                mismatch: Mismatch::TypeConflict {
                    reference: EntryKind::Directory,
                    generated: EntryKind::File,
                },
            },
        );
        report.push(
            "en/old.html".to_string(),
            DiscrepancyKind::MissingInGenerated { entry: EntryKind::File },
        );
        report.push(
            "logo.png".to_string(),
            DiscrepancyKind::ContentMismatch {
                mismatch: Mismatch::Binary {
                    reference_len: 120,
                    generated_len: 98,
                },
            },
        );
        report.push(
            "static".to_string(),
            DiscrepancyKind::MissingInReference {
                entry: EntryKind::Directory,
            },
        );
        report
    }

    #[test]
    fn test_empty_report_renders_nothing() {
        let report = DiffReport::new();
        assert!(report.is_empty());
        assert_eq!(report.to_string(), "");
    }

    #[test]
    fn test_report_display() {
        insta::assert_snapshot!(sample_report().to_string(), @r"
        type conflict: assets (reference is a directory, generated is a file)
        missing in generated: en/old.html (file)
        binary content mismatch: logo.png (reference 120 bytes, generated 98 bytes)
        missing in reference: static (directory)
        ");
    }

    #[test]
    fn test_text_mismatch_display_includes_diff_body() {
        let mut report = DiffReport::new();
        report.push(
            "index.html".to_string(),
            DiscrepancyKind::ContentMismatch {
                mismatch: Mismatch::Text {
                    unified_diff: "@@ -1 +1 @@\n-a\n+b\n".to_string(),
                },
            },
        );
        assert_eq!(report.to_string(), "content mismatch: index.html\n@@ -1 +1 @@\n-a\n+b");
    }

    #[test]
    fn test_generated_tree_missing_is_single_entry() {
        let report = DiffReport::generated_tree_missing();
        assert_eq!(report.len(), 1);
        assert_eq!(report.to_string(), "generated tree missing");
    }

    #[test]
    fn test_serialized_shape() {
        let report = sample_report();
        let value = serde_json::to_value(&report).unwrap();
        let entries = value["entries"].as_array().unwrap();
        assert_eq!(entries[0]["path"], "assets");
        assert_eq!(entries[0]["kind"], "content_mismatch");
        assert_eq!(entries[0]["mismatch"]["type"], "type_conflict");
        assert_eq!(entries[1]["kind"], "missing_in_generated");
        assert_eq!(entries[1]["entry"], "file");
    }

    #[test]
    fn test_get_by_path() {
        let report = sample_report();
        assert!(report.get("logo.png").is_some_and(Discrepancy::is_content_mismatch));
        assert!(report.get("missing").is_none());
    }
}
