//! Harness version information.
//!
//! The value comes from Cargo metadata at compile time. The CLI `--version` flag and the JSON report both read it
//! from here.

/// The harness version string (for example, `0.1.0`).
pub const STDOC_GOLDEN_VERSION: &str = env!("CARGO_PKG_VERSION");
