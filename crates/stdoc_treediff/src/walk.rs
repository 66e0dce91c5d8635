//! Tree enumeration.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::TreeDiffError;
use crate::report::EntryKind;

/// Every entry below `root` keyed by its path relative to `root`.
///
/// `PathBuf` ordering is component-wise, so a directory's descendants sort directly after it.
pub(crate) type Listing = BTreeMap<PathBuf, EntryKind>;

pub(crate) fn list_tree(root: &Path) -> Result<Listing, TreeDiffError> {
    let mut listing = Listing::new();

    for entry in WalkDir::new(root).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|source| TreeDiffError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        listing.insert(relative.to_path_buf(), EntryKind::from(entry.file_type()));
    }

    Ok(listing)
}

/// Render a relative path with `/` separators regardless of platform.
pub(crate) fn display_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
