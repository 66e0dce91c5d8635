//! Run reporting
//!
//! The orchestrator hands every finished [`BundleRecord`] to a [`Reporter`]. Each callback receives a
//! complete record, so a reporter writes one bundle's block in a single call and output from different
//! bundles never interleaves.

use std::io::{self, Write};

use serde::Serialize;
use stdoc_treediff::Discrepancy;

use crate::harness::{BundleOutcome, BundleRecord, RunResult};
use crate::registry::Bundle;
use crate::version::STDOC_GOLDEN_VERSION;

/// Trait for reporting harness progress and results.
///
/// Implement this trait to customize the output format.
pub trait Reporter {
    /// Called once the bundle selection passed preflight
    fn on_run_start(&mut self, _bundles: &[Bundle]) {}

    /// Called for each bundle, in registry order
    fn on_bundle_complete(&mut self, record: &BundleRecord);

    /// Called after every bundle has been processed
    fn on_run_complete(&mut self, result: &RunResult);
}

// ============================================================================
// Console reporter
// ============================================================================

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Human-readable reporter: one status line per bundle, failure details, and a summary line.
pub struct ConsoleReporter<W: Write> {
    out: W,
    verbose: bool,
    color: bool,
    timing: bool,
}

impl ConsoleReporter<io::Stderr> {
    /// Report to standard error, with colour when it is a terminal.
    pub fn stderr(verbose: bool) -> Self {
        use std::io::IsTerminal;
        let color = io::stderr().is_terminal();
        ConsoleReporter::new(io::stderr(), verbose).with_color(color)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self {
            out,
            verbose,
            color: false,
            timing: true,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Include elapsed times in bundle and summary lines (default: on).
    pub fn with_timing(mut self, timing: bool) -> Self {
        self.timing = timing;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn emit(&mut self, block: &str) {
        // Diagnostics are best effort; a closed stream must not fail the run.
        let _ = self.out.write_all(block.as_bytes());
        let _ = self.out.flush();
    }
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("{count} {one}")
    } else {
        format!("{count} {many}")
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn on_run_start(&mut self, bundles: &[Bundle]) {
        let line = format!("running {}\n", plural(bundles.len(), "bundle", "bundles"));
        self.emit(&line);
    }

    fn on_bundle_complete(&mut self, record: &BundleRecord) {
        let status = match &record.outcome {
            BundleOutcome::Passed => self.paint(GREEN, "PASSED"),
            BundleOutcome::Cancelled => self.paint(YELLOW, "CANCELLED"),
            _ => self.paint(RED, "FAILED"),
        };
        let mut block = format!("{} ... {status}", record.bundle.name);
        if self.timing && !record.cancelled() {
            block.push_str(&format!(" ({}ms)", record.duration.as_millis()));
        }
        block.push('\n');

        let details = match &record.outcome {
            BundleOutcome::Passed | BundleOutcome::Cancelled => None,
            BundleOutcome::Mismatch(report) => Some(format!(
                "{}:\n{}",
                plural(report.len(), "discrepancy", "discrepancies"),
                indent(&report.to_string(), "  ")
            )),
            BundleOutcome::GeneratorError(err) => Some(match err.diagnostics() {
                Some(diagnostics) => format!("{err}\n{}", indent(diagnostics, "  | ")),
                None => err.to_string(),
            }),
            BundleOutcome::ComparisonError(err) => Some(format!("comparison failed: {err}")),
        };
        if let Some(details) = details {
            block.push_str(&indent(&details, "    "));
            block.push('\n');
        }

        if self.verbose {
            if let Some(output) = &record.generator_output {
                let diagnostics = output.diagnostics();
                if !diagnostics.is_empty() {
                    block.push_str(&indent(&diagnostics, "    | "));
                    block.push('\n');
                }
            }
        }

        self.emit(&block);
    }

    fn on_run_complete(&mut self, result: &RunResult) {
        let mut parts = Vec::new();
        if result.passed() > 0 {
            parts.push(self.paint(GREEN, &format!("{} passed", result.passed())));
        }
        if result.failed() > 0 {
            parts.push(self.paint(RED, &format!("{} failed", result.failed())));
        }
        if result.cancelled() > 0 {
            parts.push(self.paint(YELLOW, &format!("{} cancelled", result.cancelled())));
        }
        if parts.is_empty() {
            parts.push("no bundles".to_string());
        }

        let mut summary = format!("====== {}", parts.join(", "));
        if self.timing {
            summary.push_str(&format!(" in {:.2}s", result.duration.as_secs_f64()));
        }
        summary.push_str(" ======");
        let line = format!("\n{}\n", self.paint(BOLD, &summary));
        self.emit(&line);
    }
}

// ============================================================================
// JSON reporter
// ============================================================================

#[derive(Serialize)]
struct JsonRun<'a> {
    harness_version: &'a str,
    success: bool,
    passed: usize,
    failed: usize,
    cancelled: usize,
    duration_ms: u128,
    bundles: Vec<JsonBundle<'a>>,
}

#[derive(Serialize)]
struct JsonBundle<'a> {
    name: &'a str,
    root: String,
    status: &'static str,
    duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<String>,
    #[serde(skip_serializing_if = "no_discrepancies")]
    discrepancies: &'a [Discrepancy],
}

fn no_discrepancies(discrepancies: &&[Discrepancy]) -> bool {
    discrepancies.is_empty()
}

impl<'a> JsonBundle<'a> {
    fn from_record(record: &'a BundleRecord) -> Self {
        let (error, diagnostics, discrepancies): (_, _, &[Discrepancy]) = match &record.outcome {
            BundleOutcome::Mismatch(report) => (None, None, report.entries.as_slice()),
            BundleOutcome::GeneratorError(err) => {
                (Some(err.to_string()), err.diagnostics().map(str::to_string), &[])
            }
            BundleOutcome::ComparisonError(err) => (Some(err.to_string()), None, &[]),
            BundleOutcome::Passed | BundleOutcome::Cancelled => (None, None, &[]),
        };
        let diagnostics = diagnostics.or_else(|| {
            record
                .generator_output
                .as_ref()
                .map(|o| o.diagnostics())
                .filter(|d| !d.is_empty())
        });

        Self {
            name: &record.bundle.name,
            root: record.bundle.root.display().to_string(),
            status: record.status(),
            duration_ms: record.duration.as_millis(),
            error,
            diagnostics,
            discrepancies,
        }
    }
}

/// Machine-readable reporter: a single JSON document for the whole run, written when it completes.
pub struct JsonReporter<W: Write> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn on_bundle_complete(&mut self, _record: &BundleRecord) {}

    fn on_run_complete(&mut self, result: &RunResult) {
        let doc = JsonRun {
            harness_version: STDOC_GOLDEN_VERSION,
            success: result.is_success(),
            passed: result.passed(),
            failed: result.failed(),
            cancelled: result.cancelled(),
            duration_ms: result.duration.as_millis(),
            bundles: result.records.iter().map(JsonBundle::from_record).collect(),
        };
        match serde_json::to_string_pretty(&doc) {
            Ok(json) => {
                let _ = writeln!(self.out, "{json}");
                let _ = self.out.flush();
            }
            Err(err) => tracing::error!(error = %err, "failed to serialize run report"),
        }
    }
}
