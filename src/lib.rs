#![forbid(unsafe_code)]
//! Golden-file regression harness for the stdoc documentation generator
//!
//! Each bundle is a directory holding a committed `reference/` tree. The harness runs the generator against the
//! bundle, then compares the freshly written `generated/` tree with the reference byte for byte and reports every
//! difference. The tree comparison itself lives in the `stdoc_treediff` crate.
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Per-bundle failures** never abort a run. They are recorded in that bundle's [`harness::BundleOutcome`];
//!   only run-level misconfiguration surfaces as [`HarnessError`].

pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod harness;
pub mod registry;
pub mod report;
pub mod version;

pub use config::{ConfigError, ConfigOverrides, HarnessConfig};
pub use error::HarnessError;
pub use generator::{CommandGenerator, GenerateError, GenerateOutcome, Generator, GeneratorCommand};
pub use harness::{BundleOutcome, BundleRecord, FailureClass, Harness, RunResult};
pub use registry::{Bundle, BundleRegistry, Layout};
pub use report::{ConsoleReporter, JsonReporter, Reporter};
pub use stdoc_treediff::{DiffReport, Discrepancy, DiscrepancyKind, diff_trees};
