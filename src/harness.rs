//! Harness orchestrator
//!
//! Drives every selected bundle through generate-then-diff and aggregates the outcomes into a single
//! [`RunResult`]. Per-bundle failures are recorded and reported, never raised: every bundle is evaluated
//! exactly once, and the decision about the process exit status is made after the full pass.
//!
//! ## Scheduling
//!
//! With `jobs == 1` bundles are evaluated one after another. With `jobs > 1` up to `jobs` bundles run at
//! once on the tokio runtime. Either way records reach the [`Reporter`] in registry order, one complete
//! record at a time.
//!
//! ## Cancellation
//!
//! Once the [`CancellationToken`] fires no new bundle is started, in-flight generators are killed, and the
//! affected bundles are recorded as cancelled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use stdoc_treediff::{DiffReport, TreeDiffError, diff_trees};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::HarnessError;
use crate::generator::{GenerateError, GenerateOutcome, Generator, clear_generated_tree};
use crate::registry::{Bundle, Layout};
use crate::report::Reporter;

// ============================================================================
// Results
// ============================================================================

/// How a single bundle's evaluation ended.
#[derive(Debug)]
pub enum BundleOutcome {
    /// Generated tree matches the reference tree
    Passed,
    /// Generated tree differs from the reference tree
    Mismatch(DiffReport),
    /// The generator could not be run or did not succeed; no diff was computed
    GeneratorError(GenerateError),
    /// The trees could not be read for comparison
    ComparisonError(TreeDiffError),
    /// Not evaluated (or interrupted) because the run was cancelled
    Cancelled,
}

/// Outcome of one bundle plus what was captured along the way.
#[derive(Debug)]
pub struct BundleRecord {
    pub bundle: Bundle,
    pub outcome: BundleOutcome,
    /// Captured output of a successful generator run
    pub generator_output: Option<GenerateOutcome>,
    pub duration: Duration,
}

impl BundleRecord {
    fn new(bundle: Bundle, outcome: BundleOutcome, started: Instant) -> Self {
        Self {
            bundle,
            outcome,
            generator_output: None,
            duration: started.elapsed(),
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self.outcome, BundleOutcome::Passed)
    }

    pub fn failed(&self) -> bool {
        matches!(
            self.outcome,
            BundleOutcome::Mismatch(_) | BundleOutcome::GeneratorError(_) | BundleOutcome::ComparisonError(_)
        )
    }

    pub fn cancelled(&self) -> bool {
        matches!(self.outcome, BundleOutcome::Cancelled)
    }

    /// Stable machine-readable status for reports.
    pub fn status(&self) -> &'static str {
        match &self.outcome {
            BundleOutcome::Passed => "passed",
            BundleOutcome::Mismatch(_) => "mismatch",
            BundleOutcome::GeneratorError(err) => err.kind(),
            BundleOutcome::ComparisonError(_) => "comparison_error",
            BundleOutcome::Cancelled => "cancelled",
        }
    }
}

/// The most severe kind of failure in a run, which decides the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureClass {
    /// At least one bundle's trees differ
    Mismatch,
    /// At least one generator failed, timed out, or could not be started
    Generator,
    /// The run was interrupted
    Cancelled,
}

/// Aggregate result of one harness invocation.
#[derive(Debug, Default)]
pub struct RunResult {
    /// One record per evaluated bundle, in registry order
    pub records: Vec<BundleRecord>,
    pub duration: Duration,
}

impl RunResult {
    pub fn passed(&self) -> usize {
        self.records.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.iter().filter(|r| r.failed()).count()
    }

    pub fn cancelled(&self) -> usize {
        self.records.iter().filter(|r| r.cancelled()).count()
    }

    /// True iff every bundle passed.
    pub fn is_success(&self) -> bool {
        self.records.iter().all(BundleRecord::passed)
    }

    pub fn failure_class(&self) -> Option<FailureClass> {
        self.records
            .iter()
            .filter_map(|r| match r.outcome {
                BundleOutcome::Passed => None,
                BundleOutcome::Mismatch(_) => Some(FailureClass::Mismatch),
                BundleOutcome::GeneratorError(_) | BundleOutcome::ComparisonError(_) => Some(FailureClass::Generator),
                BundleOutcome::Cancelled => Some(FailureClass::Cancelled),
            })
            .max()
    }

    pub fn record(&self, name: &str) -> Option<&BundleRecord> {
        self.records.iter().find(|r| r.bundle.name == name)
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Generate-then-diff driver over a set of bundles.
pub struct Harness<G> {
    generator: Arc<G>,
    layout: Layout,
    clean: bool,
    jobs: usize,
}

impl<G: Generator + 'static> Harness<G> {
    pub fn new(generator: G, layout: Layout) -> Self {
        Self {
            generator: Arc::new(generator),
            layout,
            clean: true,
            jobs: 1,
        }
    }

    /// Clear each bundle's generated tree before invoking the generator (default: on).
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Evaluate up to `jobs` bundles concurrently (default: 1).
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Check that every bundle has a root directory and a reference tree.
    pub fn preflight(&self, bundles: &[Bundle]) -> Result<(), HarnessError> {
        for bundle in bundles {
            if !bundle.root.is_dir() {
                return Err(HarnessError::BundleRootMissing {
                    bundle: bundle.name.clone(),
                    path: bundle.root.clone(),
                });
            }
            let reference = bundle.reference_dir(&self.layout);
            if !reference.is_dir() {
                return Err(HarnessError::ReferenceTreeMissing {
                    bundle: bundle.name.clone(),
                    path: reference,
                });
            }
        }
        Ok(())
    }

    /// Evaluate `bundles` and report each record as it completes.
    ///
    /// Returns an error only for run-level misconfiguration detected by [`Harness::preflight`].
    pub async fn run(
        &self,
        bundles: &[Bundle],
        reporter: &mut dyn Reporter,
        cancel: &CancellationToken,
    ) -> Result<RunResult, HarnessError> {
        self.preflight(bundles)?;

        let started = Instant::now();
        reporter.on_run_start(bundles);

        let records = if self.jobs <= 1 || bundles.len() <= 1 {
            self.run_sequential(bundles, reporter, cancel).await
        } else {
            self.run_parallel(bundles, reporter, cancel).await
        };

        let result = RunResult {
            records,
            duration: started.elapsed(),
        };
        info!(
            passed = result.passed(),
            failed = result.failed(),
            cancelled = result.cancelled(),
            "run finished"
        );
        reporter.on_run_complete(&result);
        Ok(result)
    }

    async fn run_sequential(
        &self,
        bundles: &[Bundle],
        reporter: &mut dyn Reporter,
        cancel: &CancellationToken,
    ) -> Vec<BundleRecord> {
        let mut records = Vec::with_capacity(bundles.len());
        for bundle in bundles {
            let record = evaluate(self.generator.as_ref(), &self.layout, self.clean, bundle.clone(), cancel).await;
            reporter.on_bundle_complete(&record);
            records.push(record);
        }
        records
    }

    async fn run_parallel(
        &self,
        bundles: &[Bundle],
        reporter: &mut dyn Reporter,
        cancel: &CancellationToken,
    ) -> Vec<BundleRecord> {
        let permits = Arc::new(Semaphore::new(self.jobs));
        let handles: Vec<_> = bundles
            .iter()
            .cloned()
            .map(|bundle| {
                let generator = Arc::clone(&self.generator);
                let layout = self.layout.clone();
                let permits = Arc::clone(&permits);
                let cancel = cancel.clone();
                let clean = self.clean;
                let fallback = bundle.clone();
                let handle = tokio::spawn(async move {
                    let started = Instant::now();
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return BundleRecord::new(bundle, BundleOutcome::Cancelled, started);
                    };
                    evaluate(generator.as_ref(), &layout, clean, bundle, &cancel).await
                });
                (fallback, handle)
            })
            .collect();

        let mut records = Vec::with_capacity(handles.len());
        for (bundle, handle) in handles {
            let record = match handle.await {
                Ok(record) => record,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => BundleRecord::new(bundle, BundleOutcome::Cancelled, Instant::now()),
            };
            reporter.on_bundle_complete(&record);
            records.push(record);
        }
        records
    }
}

/// Generate, then diff, a single bundle. Never fails: every problem becomes the record's outcome.
async fn evaluate<G: Generator>(
    generator: &G,
    layout: &Layout,
    clean: bool,
    bundle: Bundle,
    cancel: &CancellationToken,
) -> BundleRecord {
    let started = Instant::now();
    if cancel.is_cancelled() {
        return BundleRecord::new(bundle, BundleOutcome::Cancelled, started);
    }

    info!(bundle = %bundle.name, "generating");
    if clean {
        if let Err(err) = clear_generated_tree(&bundle, layout) {
            warn!(bundle = %bundle.name, error = %err, "could not clear generated tree");
            return BundleRecord::new(bundle, BundleOutcome::GeneratorError(err), started);
        }
    }

    let generated = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!(bundle = %bundle.name, "cancelled while generating");
            return BundleRecord::new(bundle, BundleOutcome::Cancelled, started);
        }
        result = generator.generate(&bundle) => result,
    };

    let output = match generated {
        Ok(output) => output,
        Err(err) => {
            warn!(bundle = %bundle.name, error = %err, "generator failed");
            return BundleRecord::new(bundle, BundleOutcome::GeneratorError(err), started);
        }
    };

    let reference = bundle.reference_dir(layout);
    let generated_dir = bundle.generated_dir(layout);
    let comparison = tokio::task::spawn_blocking(move || diff_trees(&reference, &generated_dir)).await;
    let outcome = match comparison {
        Ok(Ok(report)) if report.is_empty() => BundleOutcome::Passed,
        Ok(Ok(report)) => BundleOutcome::Mismatch(report),
        Ok(Err(err)) => BundleOutcome::ComparisonError(err),
        Err(err) => std::panic::resume_unwind(err.into_panic()),
    };

    let mut record = BundleRecord::new(bundle, outcome, started);
    record.generator_output = Some(output);
    record
}
