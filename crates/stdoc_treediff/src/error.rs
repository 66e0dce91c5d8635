//! Errors raised while reading the trees under comparison.
//!
//! Discrepancies are data, not errors: anything that ends up here means the comparison itself could not
//! be carried out.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeDiffError {
    #[error("reference tree '{}' does not exist or is not a directory", .0.display())]
    ReferenceMissing(PathBuf),

    #[error("failed to walk '{}': {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
