#![forbid(unsafe_code)]
//! Directory tree comparison for golden-file regression tests.
//!
//! This crate compares a committed *reference* tree against a freshly *generated* tree and produces a
//! [`DiffReport`]: an ordered list of path-level discrepancies. It never writes to either tree.
//!
//! ## Comparison rules
//!
//! - A path present only under the reference root is reported as [`DiscrepancyKind::MissingInGenerated`].
//! - A path present only under the generated root is reported as [`DiscrepancyKind::MissingInReference`].
//! - Directories present on both sides are recursed into and never produce an entry themselves.
//! - Files present on both sides are compared byte for byte. Text files carry a unified diff; other files
//!   carry a size summary.
//! - A file/directory/symlink kind conflict at the same path is a [`Mismatch::TypeConflict`].
//! - When a directory exists on one side only, a single entry is reported for it; its contents are not
//!   listed individually.
//!
//! Entries are ordered by relative path (component-wise), so reports are stable across runs.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! let report = stdoc_treediff::diff_trees(Path::new("bundle/reference"), Path::new("bundle/generated"))?;
//! if !report.is_empty() {
//!     eprintln!("{report}");
//! }
//! # Ok::<(), stdoc_treediff::TreeDiffError>(())
//! ```

mod compare;
mod error;
mod report;
mod text;
mod walk;

pub use compare::diff_trees;
pub use error::TreeDiffError;
pub use report::{DiffReport, Discrepancy, DiscrepancyKind, EntryKind, Mismatch};
pub use text::{DEFAULT_CONTEXT_LINES, unified_diff};
