//! Reference-vs-generated tree comparison.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::TreeDiffError;
use crate::report::{DiffReport, DiscrepancyKind, EntryKind, Mismatch};
use crate::text::unified_diff;
use crate::walk::{display_path, list_tree};

/// Compare the tree under `reference_root` with the tree under `generated_root`.
///
/// Read-only: neither tree is modified. A missing generated root is reported as a single
/// [`DiscrepancyKind::GeneratedTreeMissing`] entry; a missing reference root is an error because there is
/// nothing to compare against.
pub fn diff_trees(reference_root: &Path, generated_root: &Path) -> Result<DiffReport, TreeDiffError> {
    if !reference_root.is_dir() {
        return Err(TreeDiffError::ReferenceMissing(reference_root.to_path_buf()));
    }
    if !generated_root.is_dir() {
        debug!(generated = %generated_root.display(), "generated tree is absent");
        return Ok(DiffReport::generated_tree_missing());
    }

    let reference = list_tree(reference_root)?;
    let generated = list_tree(generated_root)?;
    let paths: BTreeSet<&PathBuf> = reference.keys().chain(generated.keys()).collect();

    let mut report = DiffReport::new();
    // Directory reported as a whole; its descendants sort right after it and are skipped.
    let mut subsumed: Option<&Path> = None;

    for relative in paths {
        if subsumed.is_some_and(|dir| relative.starts_with(dir)) {
            continue;
        }
        subsumed = None;

        let path = display_path(relative);
        match (reference.get(relative).copied(), generated.get(relative).copied()) {
            (Some(entry), None) => {
                if entry == EntryKind::Directory {
                    subsumed = Some(relative.as_path());
                }
                report.push(path, DiscrepancyKind::MissingInGenerated { entry });
            }
            (None, Some(entry)) => {
                if entry == EntryKind::Directory {
                    subsumed = Some(relative.as_path());
                }
                report.push(path, DiscrepancyKind::MissingInReference { entry });
            }
            (Some(r), Some(g)) if r != g => {
                if r == EntryKind::Directory || g == EntryKind::Directory {
                    subsumed = Some(relative.as_path());
                }
                report.push(
                    path,
                    DiscrepancyKind::ContentMismatch {
                        mismatch: Mismatch::TypeConflict {
                            reference: r,
                            generated: g,
                        },
                    },
                );
            }
            (Some(EntryKind::File), Some(EntryKind::File)) => {
                let mismatch =
                    compare_files(&path, &reference_root.join(relative), &generated_root.join(relative))?;
                if let Some(mismatch) = mismatch {
                    report.push(path, DiscrepancyKind::ContentMismatch { mismatch });
                }
            }
            (Some(EntryKind::Symlink), Some(EntryKind::Symlink)) => {
                let mismatch = compare_links(&reference_root.join(relative), &generated_root.join(relative))?;
                if let Some(mismatch) = mismatch {
                    report.push(path, DiscrepancyKind::ContentMismatch { mismatch });
                }
            }
            // Directories on both sides: their children are visited next.
            _ => {}
        }
    }

    debug!(
        reference = %reference_root.display(),
        discrepancies = report.len(),
        "tree comparison finished"
    );
    Ok(report)
}

fn read(path: &Path) -> Result<Vec<u8>, TreeDiffError> {
    fs::read(path).map_err(|source| TreeDiffError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn compare_files(display: &str, reference: &Path, generated: &Path) -> Result<Option<Mismatch>, TreeDiffError> {
    let expected = read(reference)?;
    let actual = read(generated)?;
    if expected == actual {
        return Ok(None);
    }

    let mismatch = match (std::str::from_utf8(&expected), std::str::from_utf8(&actual)) {
        (Ok(expected), Ok(actual)) => Mismatch::Text {
            unified_diff: unified_diff(display, expected, actual),
        },
        _ => Mismatch::Binary {
            reference_len: expected.len() as u64,
            generated_len: actual.len() as u64,
        },
    };
    Ok(Some(mismatch))
}

fn compare_links(reference: &Path, generated: &Path) -> Result<Option<Mismatch>, TreeDiffError> {
    let read_link = |path: &Path| {
        fs::read_link(path).map_err(|source| TreeDiffError::Read {
            path: path.to_path_buf(),
            source,
        })
    };
    let expected = read_link(reference)?;
    let actual = read_link(generated)?;
    if expected == actual {
        Ok(None)
    } else {
        Ok(Some(Mismatch::SymlinkTarget {
            reference: expected,
            generated: actual,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Trees {
        _dir: TempDir,
        reference: PathBuf,
        generated: PathBuf,
    }

    impl Trees {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let reference = dir.path().join("reference");
            let generated = dir.path().join("generated");
            fs::create_dir_all(&reference).unwrap();
            fs::create_dir_all(&generated).unwrap();
            Self {
                _dir: dir,
                reference,
                generated,
            }
        }

        fn write(root: &Path, relative: &str, contents: &[u8]) {
            let path = root.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        fn both(&self, relative: &str, contents: &str) {
            Self::write(&self.reference, relative, contents.as_bytes());
            Self::write(&self.generated, relative, contents.as_bytes());
        }

        fn diff(&self) -> DiffReport {
            diff_trees(&self.reference, &self.generated).unwrap()
        }
    }

    #[test]
    fn test_identical_trees_produce_empty_report() {
        let trees = Trees::new();
        trees.both("index.html", "hello");
        trees.both("en/guide/intro.html", "<p>intro</p>\n");
        trees.both("static/style.css", "body {}\n");

        assert!(trees.diff().is_empty());
    }

    #[test]
    fn test_single_changed_file() {
        let trees = Trees::new();
        trees.both("a.html", "same\n");
        Trees::write(&trees.reference, "index.html", b"hello");
        Trees::write(&trees.generated, "index.html", b"hello!");

        let report = trees.diff();
        assert_eq!(report.len(), 1);
        let entry = &report.entries[0];
        assert_eq!(entry.path, "index.html");
        let DiscrepancyKind::ContentMismatch {
            mismatch: Mismatch::Text { unified_diff },
        } = &entry.kind
        else {
            panic!("expected a text mismatch, got {:?}", entry.kind);
        };
        assert!(unified_diff.contains("-hello"));
        assert!(unified_diff.contains("+hello!"));
    }

    #[test]
    fn test_file_only_in_reference() {
        let trees = Trees::new();
        trees.both("keep.html", "k");
        Trees::write(&trees.reference, "index.html", b"hello");

        let report = trees.diff();
        assert_eq!(report.len(), 1);
        assert_eq!(report.entries[0].path, "index.html");
        assert_eq!(
            report.entries[0].kind,
            DiscrepancyKind::MissingInGenerated { entry: EntryKind::File }
        );
    }

    #[test]
    fn test_file_only_in_generated() {
        let trees = Trees::new();
        Trees::write(&trees.generated, "extra.html", b"stale");

        let report = trees.diff();
        assert_eq!(report.len(), 1);
        assert_eq!(
            report.entries[0].kind,
            DiscrepancyKind::MissingInReference { entry: EntryKind::File }
        );
    }

    #[test]
    fn test_missing_directory_is_reported_once() {
        let trees = Trees::new();
        Trees::write(&trees.reference, "fr/index.html", b"bonjour");
        Trees::write(&trees.reference, "fr/guide/a.html", b"a");
        trees.both("index.html", "hello");

        let report = trees.diff();
        assert_eq!(report.len(), 1);
        assert_eq!(report.entries[0].path, "fr");
        assert_eq!(
            report.entries[0].kind,
            DiscrepancyKind::MissingInGenerated {
                entry: EntryKind::Directory
            }
        );
    }

    #[test]
    fn test_type_conflict() {
        let trees = Trees::new();
        Trees::write(&trees.reference, "static/logo.svg", b"<svg/>");
        Trees::write(&trees.generated, "static", b"not a dir");
        trees.both("z.html", "z");

        let report = trees.diff();
        assert_eq!(report.len(), 1);
        assert_eq!(report.entries[0].path, "static");
        assert_eq!(
            report.entries[0].kind,
            DiscrepancyKind::ContentMismatch {
                mismatch: Mismatch::TypeConflict {
                    reference: EntryKind::Directory,
                    generated: EntryKind::File,
                }
            }
        );
    }

    #[test]
    fn test_binary_mismatch() {
        let trees = Trees::new();
        Trees::write(&trees.reference, "logo.png", &[0x89, 0x50, 0xff, 0x00]);
        Trees::write(&trees.generated, "logo.png", &[0x89, 0x50, 0xfe]);

        let report = trees.diff();
        assert_eq!(
            report.entries[0].kind,
            DiscrepancyKind::ContentMismatch {
                mismatch: Mismatch::Binary {
                    reference_len: 4,
                    generated_len: 3,
                }
            }
        );
    }

    #[test]
    fn test_whitespace_differences_count() {
        let trees = Trees::new();
        Trees::write(&trees.reference, "index.html", b"hello\n");
        Trees::write(&trees.generated, "index.html", b"hello \r\n");

        let report = trees.diff();
        assert_eq!(report.len(), 1);
        assert!(report.entries[0].is_content_mismatch());
    }

    #[test]
    fn test_entries_are_ordered_by_path() {
        let trees = Trees::new();
        Trees::write(&trees.reference, "b.html", b"b");
        Trees::write(&trees.generated, "a.html", b"a");
        Trees::write(&trees.reference, "c/d.html", b"1");
        Trees::write(&trees.generated, "c/d.html", b"2");
        Trees::write(&trees.generated, "c.txt", b"c");

        let report = trees.diff();
        let paths: Vec<&str> = report.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a.html", "b.html", "c/d.html", "c.txt"]);
    }

    #[test]
    fn test_generated_root_missing() {
        let trees = Trees::new();
        Trees::write(&trees.reference, "index.html", b"hello");
        fs::remove_dir_all(&trees.generated).unwrap();

        let report = trees.diff();
        assert_eq!(report.len(), 1);
        assert_eq!(report.entries[0].kind, DiscrepancyKind::GeneratedTreeMissing);
    }

    #[test]
    fn test_reference_root_missing_is_an_error() {
        let trees = Trees::new();
        fs::remove_dir_all(&trees.reference).unwrap();

        let err = diff_trees(&trees.reference, &trees.generated).unwrap_err();
        assert!(matches!(err, TreeDiffError::ReferenceMissing(_)));
    }

    #[test]
    fn test_comparison_does_not_modify_trees() {
        let trees = Trees::new();
        Trees::write(&trees.reference, "index.html", b"hello");
        Trees::write(&trees.generated, "other.html", b"x");

        let before_ref = list_tree(&trees.reference).unwrap();
        let before_gen = list_tree(&trees.generated).unwrap();
        trees.diff();
        assert_eq!(list_tree(&trees.reference).unwrap(), before_ref);
        assert_eq!(list_tree(&trees.generated).unwrap(), before_gen);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_targets_are_compared() {
        use std::os::unix::fs::symlink;

        let trees = Trees::new();
        symlink("a.html", trees.reference.join("latest")).unwrap();
        symlink("b.html", trees.generated.join("latest")).unwrap();

        let report = trees.diff();
        assert_eq!(report.len(), 1);
        assert_eq!(
            report.entries[0].kind,
            DiscrepancyKind::ContentMismatch {
                mismatch: Mismatch::SymlinkTarget {
                    reference: PathBuf::from("a.html"),
                    generated: PathBuf::from("b.html"),
                }
            }
        );
    }
}
