//! Run-level errors
//!
//! These abort the whole run before (or instead of) evaluating bundles: there is no point generating
//! output when the configuration is wrong or there is nothing to compare against. Per-bundle failures
//! are not errors at this level; they become that bundle's failure record.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown bundle '{name}'")]
    #[diagnostic(
        code(stdoc_golden::unknown_bundle),
        help("bundles in the registry: {known}")
    )]
    UnknownBundle { name: String, known: String },

    #[error("bundle '{bundle}': directory '{}' does not exist", path.display())]
    #[diagnostic(
        code(stdoc_golden::bundle_root_missing),
        help("add the bundle directory or remove it from the manifest")
    )]
    BundleRootMissing { bundle: String, path: PathBuf },

    #[error("bundle '{bundle}': reference tree '{}' does not exist", path.display())]
    #[diagnostic(
        code(stdoc_golden::reference_tree_missing),
        help("commit the expected output under the reference directory before running the harness")
    )]
    ReferenceTreeMissing { bundle: String, path: PathBuf },
}
