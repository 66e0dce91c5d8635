//! CLI module for the stdoc golden-file harness
//!
//! ## Commands
//!
//! - `stdoc-golden [BUNDLE]...` - Regenerate and compare all (or the named) bundles
//! - `stdoc-golden list` - Show the bundle registry with resolved roots
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::ConfigOverrides;
use crate::version::STDOC_GOLDEN_VERSION;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    /// At least one bundle's generated tree differs from its reference
    pub const MISMATCH: ExitCode = ExitCode(1);
    /// At least one generator failed, timed out, or could not be started
    pub const GENERATOR_FAILURE: ExitCode = ExitCode(3);
    /// The run could not start: bad manifest, unknown bundle, missing reference tree
    pub const CONFIG: ExitCode = ExitCode(4);
    /// Interrupted (128 + SIGINT)
    pub const CANCELLED: ExitCode = ExitCode(130);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a run-level configuration error (exit code 4).
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::CONFIG)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Golden-file regression harness for the stdoc documentation generator
#[derive(Parser, Debug)]
#[command(name = "stdoc-golden")]
#[command(version = STDOC_GOLDEN_VERSION)]
#[command(about = "Regenerate documentation bundles and compare them with their reference trees", long_about = None)]
pub struct Cli {
    /// Bundle manifest
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "STDOC_GOLDEN_MANIFEST",
        default_value = "tests/bundles.toml"
    )]
    pub manifest: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered bundles in run order
    List,
}

/// Report format.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Per-bundle status lines and a summary
    #[default]
    Text,
    /// A single JSON document on stdout
    Json,
}

/// Options for the default (run) action.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Bundles to run (default: all, in registry order)
    #[arg(value_name = "BUNDLE")]
    pub bundles: Vec<String>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Evaluate up to N bundles at once
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Kill a generator after SECS seconds (0 disables the limit)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Keep existing generated trees instead of clearing them first
    #[arg(long)]
    pub no_clean: bool,

    /// Generator program, replacing the manifest's
    #[arg(long, value_name = "PROGRAM")]
    pub generator: Option<String>,

    /// Generator argument (repeatable); replaces the manifest's argument list
    #[arg(long = "generator-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub generator_args: Vec<String>,

    /// Extra generator environment variable (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Show generator output for passing bundles too
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            program: self.generator.clone(),
            args: self.generator_args.clone(),
            env: self.env.clone(),
            timeout_secs: self.timeout,
            no_clean: self.no_clean,
            jobs: self.jobs,
        }
    }
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Some(Command::List) => commands::list_bundles(&cli.manifest),
        None => commands::run_bundles(&cli.manifest, &cli.run),
    }
}

// ============================================================================
// Tests
// ============================================================================
