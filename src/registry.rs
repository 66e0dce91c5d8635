//! Bundle registry
//!
//! A bundle is a named fixture directory: generator inputs plus a committed reference output tree. The
//! registry is the ordered, deduplicated list of bundles known to the harness. It is built once from
//! configuration and never changes during a run.

use std::path::{Component, Path, PathBuf};

use crate::error::HarnessError;

/// Names of the two output subtrees inside every bundle root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Committed, authoritative expected output (read-only to the harness)
    pub reference: String,
    /// Output written by the generator on each run (disposable)
    pub generated: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            reference: "reference".to_string(),
            generated: "generated".to_string(),
        }
    }
}

/// A named fixture directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub name: String,
    pub root: PathBuf,
}

impl Bundle {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn reference_dir(&self, layout: &Layout) -> PathBuf {
        self.root.join(&layout.reference)
    }

    pub fn generated_dir(&self, layout: &Layout) -> PathBuf {
        self.root.join(&layout.generated)
    }
}

/// Ordered, deduplicated set of bundles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleRegistry {
    bundles: Vec<Bundle>,
}

impl BundleRegistry {
    /// Build a registry of bundles living at `<base>/<name>`.
    ///
    /// Duplicate names are dropped, keeping the first occurrence.
    pub fn new<I, S>(base: &Path, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut bundles: Vec<Bundle> = Vec::new();
        for name in names {
            let name = name.into();
            if bundles.iter().any(|b| b.name == name) {
                tracing::warn!(bundle = %name, "duplicate bundle name in registry, ignoring");
                continue;
            }
            let root = base.join(&name);
            bundles.push(Bundle { name, root });
        }
        Self { bundles }
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Bundle> {
        self.bundles.iter().find(|b| b.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bundles.iter().map(|b| b.name.as_str())
    }

    /// Restrict to the named bundles, in registry order.
    ///
    /// An empty selection means every bundle. Naming a bundle the registry does not know is a
    /// misconfiguration.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Bundle>, HarnessError> {
        if names.is_empty() {
            return Ok(self.bundles.clone());
        }

        for name in names {
            let name = name.as_ref();
            if self.get(name).is_none() {
                return Err(HarnessError::UnknownBundle {
                    name: name.to_string(),
                    known: self.names().collect::<Vec<_>>().join(", "),
                });
            }
        }

        Ok(self
            .bundles
            .iter()
            .filter(|b| names.iter().any(|n| n.as_ref() == b.name))
            .cloned()
            .collect())
    }
}

/// A bundle name or layout entry must be exactly one plain path component.
pub(crate) fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
